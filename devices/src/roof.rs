//! Roof actuator state machine.
//!
//! One motor line and two limit switches. The motor line energized
//! drives the roof open, de-energized drives it shut; the status is
//! never stored, it is recomputed from the switch and motor state on
//! every read.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RoofStatus {
    Closed,
    Closing,
    Opened,
    Opening,
    Error,
}

impl std::fmt::Display for RoofStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Roof motor and limit-switch board.
#[async_trait]
pub trait RoofActuator: Send + Sync {
    /// Energize the motor line (drives toward open).
    async fn energize(&self);
    /// De-energize the motor line (drives toward closed).
    async fn de_energize(&self);
    fn motor_energized(&self) -> bool;
    fn open_switch_active(&self) -> bool;
    fn closed_switch_active(&self) -> bool;
    /// Wait for the open limit switch, true when it tripped in time.
    async fn wait_open(&self, timeout: Duration) -> bool;
    /// Wait for the closed limit switch, true when it tripped in time.
    async fn wait_closed(&self, timeout: Duration) -> bool;
}

pub struct RoofControl {
    actuator: Arc<dyn RoofActuator>,
    timeout: Duration,
    /// Serializes the whole actuate-and-wait sequence; concurrent
    /// requests block here instead of racing the motor.
    lock: Mutex<()>,
    blocked: AtomicBool,
}

impl RoofControl {
    pub fn new(actuator: Arc<dyn RoofActuator>, timeout: Duration) -> Self {
        RoofControl {
            actuator,
            timeout,
            lock: Mutex::new(()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Drive the roof open. If the open switch never trips within the
    /// timeout the motion is considered blocked and the roof is driven
    /// back shut. Returns whether the roof is fully open.
    pub async fn open(&self) -> bool {
        let blocked = {
            let _guard = self.lock.lock().await;
            self.actuator.energize().await;
            let reached = self.actuator.wait_open(self.timeout).await;
            self.blocked.store(!reached, Ordering::SeqCst);
            !reached
        };

        if blocked {
            tracing::warn!("open limit switch never tripped, driving the roof back shut");
            self.close().await;
            return false;
        }
        true
    }

    /// Drive the roof shut. Returns whether the closed switch tripped
    /// within the timeout; a successful close clears the blocked flag.
    pub async fn close(&self) -> bool {
        let _guard = self.lock.lock().await;
        self.actuator.de_energize().await;
        let reached = self.actuator.wait_closed(self.timeout).await;
        self.blocked.store(!reached, Ordering::SeqCst);
        reached
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Recompute the status from the raw inputs. The branch order
    /// matters: contradictory switches or a blocked motion win over
    /// everything, a resting state needs the matching motor level, and
    /// an energized motor with no switch yet means the roof is still on
    /// its way open.
    pub fn get_status(&self) -> RoofStatus {
        let closed = self.actuator.closed_switch_active();
        let open = self.actuator.open_switch_active();
        let motor = self.actuator.motor_energized();

        if (closed && open) || self.is_blocked() {
            RoofStatus::Error
        } else if closed && !motor {
            RoofStatus::Closed
        } else if open && motor {
            RoofStatus::Opened
        } else if motor {
            RoofStatus::Opening
        } else {
            RoofStatus::Closing
        }
    }
}
