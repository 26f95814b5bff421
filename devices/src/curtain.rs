//! Wind-curtain state machines and the altitude-driven step targets.
//!
//! Two independent instances (east and west) wrap their own motor and
//! rotary encoder. A curtain only moves while enabled; disabling drives
//! it back to step zero and latches it shut until re-enabled.

use crate::telescope::{AltazimutalCoords, TelescopeStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::Mutex;

/// Declaration order matters: everything at or below `Opened` is at
/// rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CurtainStatus {
    Disabled,
    Enabled,
    Closed,
    Opened,
    Opening,
    Closing,
}

impl CurtainStatus {
    pub fn at_rest(self) -> bool {
        self <= CurtainStatus::Opened
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Orientation {
    East,
    West,
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::East => write!(f, "east"),
            Orientation::West => write!(f, "west"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Opening,
    Closing,
}

/// Curtain motor, encoder and travel limit switches.
#[async_trait]
pub trait CurtainActuator: Send + Sync {
    async fn drive(&self, direction: Direction);
    async fn stop(&self);
    /// Current encoder count.
    fn step(&self) -> u32;
    fn open_limit_active(&self) -> bool;
    fn closed_limit_active(&self) -> bool;
}

#[derive(Debug)]
struct Inner {
    step: u32,
    enabled: bool,
    moving: Option<Direction>,
}

pub struct CurtainControl {
    orientation: Orientation,
    actuator: Arc<dyn CurtainActuator>,
    max_steps: u32,
    tick: Duration,
    inner: StdRwLock<Inner>,
    /// One motion at a time per curtain; the two instances share nothing.
    motion: Mutex<()>,
}

impl CurtainControl {
    pub fn new(
        orientation: Orientation,
        actuator: Arc<dyn CurtainActuator>,
        max_steps: u32,
        tick: Duration,
    ) -> Self {
        CurtainControl {
            orientation,
            actuator,
            max_steps,
            tick,
            inner: StdRwLock::new(Inner {
                step: 0,
                enabled: false,
                moving: None,
            }),
            motion: Mutex::new(()),
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn step(&self) -> u32 {
        self.inner.read().unwrap().step
    }

    pub fn get_status(&self) -> CurtainStatus {
        let inner = self.inner.read().unwrap();
        if !inner.enabled {
            return CurtainStatus::Disabled;
        }
        match inner.moving {
            Some(Direction::Opening) => CurtainStatus::Opening,
            Some(Direction::Closing) => CurtainStatus::Closing,
            None if inner.step == 0 => CurtainStatus::Closed,
            None if inner.step >= self.max_steps => CurtainStatus::Opened,
            None => CurtainStatus::Enabled,
        }
    }

    pub fn enable(&self) {
        let mut inner = self.inner.write().unwrap();
        if !inner.enabled {
            tracing::info!(curtain = %self.orientation, "curtain enabled");
            inner.enabled = true;
        }
    }

    /// Drive back to step zero and latch the curtain shut. Further
    /// `move_to` calls are ignored until `enable`.
    pub async fn disable(&self) {
        if !self.inner.read().unwrap().enabled {
            return;
        }
        self.run_motion(0).await;
        let mut inner = self.inner.write().unwrap();
        inner.enabled = false;
        inner.step = 0;
        tracing::info!(curtain = %self.orientation, "curtain disabled");
    }

    /// Drive toward `target` steps, clamped to the configured maximum.
    /// Stops early when the travel limit switch for the direction trips.
    pub async fn move_to(&self, target: u32) {
        if !self.inner.read().unwrap().enabled {
            tracing::debug!(curtain = %self.orientation, "move ignored while disabled");
            return;
        }
        self.run_motion(target.min(self.max_steps)).await;
    }

    async fn run_motion(&self, target: u32) {
        let _guard = self.motion.lock().await;
        let start = self.inner.read().unwrap().step;
        if start == target {
            return;
        }
        let direction = if target > start {
            Direction::Opening
        } else {
            Direction::Closing
        };
        tracing::debug!(curtain = %self.orientation, start, target, "curtain moving");
        self.inner.write().unwrap().moving = Some(direction);
        self.actuator.drive(direction).await;

        loop {
            let step = self.actuator.step();
            let (done, resolved) = match direction {
                Direction::Opening if self.actuator.open_limit_active() => (true, self.max_steps),
                Direction::Closing if self.actuator.closed_limit_active() => (true, 0),
                Direction::Opening if step >= target => (true, target),
                Direction::Closing if step <= target => (true, target),
                _ => (false, step),
            };
            self.inner.write().unwrap().step = resolved.min(self.max_steps);
            if done {
                break;
            }
            tokio::time::sleep(self.tick).await;
        }

        self.actuator.stop().await;
        self.inner.write().unwrap().moving = None;
    }
}

/// Per-side altitude bounds and the shared step range.
#[derive(Debug, Clone, Deserialize)]
pub struct CurtainBounds {
    pub max_steps: u32,
    /// Telescope altitude at or below which both curtains stay shut.
    pub floor_alt: f64,
    pub park_east_alt: f64,
    pub max_east_alt: f64,
    pub park_west_alt: f64,
    pub max_west_alt: f64,
}

/// Step targets for both curtains; `None` means leave that side alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTargets {
    pub east: Option<u32>,
    pub west: Option<u32>,
}

/// Map the telescope pointing onto curtain openings.
///
/// A linear map from the altitude onto [0, max_steps] between each
/// side's parked and maximum altitude; the side the telescope looks away
/// from opens fully.
pub fn step_targets(
    aa: AltazimutalCoords,
    status: TelescopeStatus,
    bounds: &CurtainBounds,
) -> StepTargets {
    let max = bounds.max_steps;

    if matches!(status, TelescopeStatus::Lost | TelescopeStatus::Error) {
        return StepTargets {
            east: None,
            west: None,
        };
    }
    if aa.alt <= bounds.floor_alt {
        return StepTargets {
            east: Some(0),
            west: Some(0),
        };
    }

    let above_range = aa.alt >= bounds.max_east_alt && aa.alt >= bounds.max_west_alt;
    match status {
        TelescopeStatus::West if !above_range => {
            let per_step = (bounds.max_west_alt - bounds.park_west_alt) / f64::from(max);
            StepTargets {
                east: Some(max),
                west: Some(interpolate(aa.alt, bounds.park_west_alt, per_step, max)),
            }
        }
        TelescopeStatus::East if !above_range => {
            let per_step = (bounds.max_east_alt - bounds.park_east_alt) / f64::from(max);
            StepTargets {
                east: Some(interpolate(aa.alt, bounds.park_east_alt, per_step, max)),
                west: Some(max),
            }
        }
        // above the curtain range, or pointing outside the east/west zone
        _ => StepTargets {
            east: Some(max),
            west: Some(max),
        },
    }
}

fn interpolate(alt: f64, park_alt: f64, per_step: f64, max: u32) -> u32 {
    ((alt - park_alt) / per_step).round().clamp(0.0, f64::from(max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimCurtain;

    fn bounds() -> CurtainBounds {
        CurtainBounds {
            max_steps: 155,
            floor_alt: 15.0,
            park_east_alt: 10.0,
            max_east_alt: 50.0,
            park_west_alt: 10.0,
            max_west_alt: 50.0,
        }
    }

    fn aa(alt: f64, az: f64) -> AltazimutalCoords {
        AltazimutalCoords { alt, az }
    }

    #[test]
    fn targets_unset_when_telescope_is_lost() {
        for status in [TelescopeStatus::Lost, TelescopeStatus::Error] {
            let t = step_targets(aa(40.0, 260.0), status, &bounds());
            assert_eq!(t, StepTargets { east: None, west: None });
        }
    }

    #[test]
    fn targets_zero_below_the_floor() {
        let t = step_targets(aa(12.0, 260.0), TelescopeStatus::Secure, &bounds());
        assert_eq!(t, StepTargets { east: Some(0), west: Some(0) });
    }

    #[test]
    fn targets_full_above_range_or_out_of_zone() {
        let t = step_targets(aa(60.0, 260.0), TelescopeStatus::West, &bounds());
        assert_eq!(t, StepTargets { east: Some(155), west: Some(155) });

        let t = step_targets(aa(40.0, 200.0), TelescopeStatus::Southwest, &bounds());
        assert_eq!(t, StepTargets { east: Some(155), west: Some(155) });
    }

    #[test]
    fn west_pointing_interpolates_west_curtain() {
        // (40 - 10) / ((50 - 10) / 155) = 116.25 -> 116
        let t = step_targets(aa(40.0, 260.0), TelescopeStatus::West, &bounds());
        assert_eq!(t, StepTargets { east: Some(155), west: Some(116) });
    }

    #[test]
    fn east_pointing_mirrors() {
        let t = step_targets(aa(40.0, 100.0), TelescopeStatus::East, &bounds());
        assert_eq!(t, StepTargets { east: Some(116), west: Some(155) });
    }

    fn curtain(actuator: Arc<SimCurtain>) -> CurtainControl {
        CurtainControl::new(
            Orientation::East,
            actuator,
            155,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn move_ignored_while_disabled() {
        let actuator = SimCurtain::new("east", 155);
        let control = curtain(Arc::clone(&actuator));

        control.move_to(100).await;
        assert_eq!(control.step(), 0);
        assert_eq!(control.get_status(), CurtainStatus::Disabled);
    }

    #[tokio::test]
    async fn move_tracks_encoder_and_resolves_status() {
        let actuator = SimCurtain::new("east", 155);
        let control = curtain(Arc::clone(&actuator));
        control.enable();

        control.move_to(100).await;
        assert_eq!(control.step(), 100);
        assert_eq!(control.get_status(), CurtainStatus::Enabled);

        control.move_to(400).await; // clamped to max_steps
        assert_eq!(control.step(), 155);
        assert_eq!(control.get_status(), CurtainStatus::Opened);
    }

    #[tokio::test]
    async fn limit_switch_stops_motion_early() {
        let actuator = SimCurtain::new("east", 155);
        actuator.trip_open_limit_at(60);
        let control = curtain(Arc::clone(&actuator));
        control.enable();

        control.move_to(120).await;
        // the limit switch clamps the position to the open bound
        assert_eq!(control.step(), 155);
        assert_eq!(control.get_status(), CurtainStatus::Opened);
    }

    #[tokio::test]
    async fn disable_forces_step_zero() {
        let actuator = SimCurtain::new("east", 155);
        let control = curtain(Arc::clone(&actuator));
        control.enable();
        control.move_to(80).await;

        control.disable().await;
        assert_eq!(control.step(), 0);
        assert_eq!(control.get_status(), CurtainStatus::Disabled);

        control.move_to(50).await;
        assert_eq!(control.step(), 0);
    }
}
