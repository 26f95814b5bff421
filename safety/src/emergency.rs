//! Emergency closure sequencer.
//!
//! When the weather turns dangerous while the telescope is being
//! polled, the enclosure seals itself: park the mount, wait for it to
//! come down, latch both curtains, close the roof, then cut telescope
//! polling and power. The sequence runs detached from whatever request
//! observed the danger and never blocks its response.

use crate::context::SharedObservatory;
use skylid_devices::curtain::CurtainStatus;
use skylid_devices::switch::SwitchKey;
use skylid_devices::telescope::TelescopeStatus;
use skylid_devices::weather::WeatherStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct EmergencyCloser {
    obs: SharedObservatory,
    in_flight: AtomicBool,
    recheck: Duration,
}

impl EmergencyCloser {
    pub fn new(obs: SharedObservatory) -> Arc<Self> {
        Self::with_recheck(obs, Duration::from_secs(1))
    }

    pub fn with_recheck(obs: SharedObservatory, recheck: Duration) -> Arc<Self> {
        Arc::new(EmergencyCloser {
            obs,
            in_flight: AtomicBool::new(false),
            recheck,
        })
    }

    pub fn observatory(&self) -> &SharedObservatory {
        &self.obs
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Kick off the closure sequence if the given weather verdict calls
    /// for it. At most one sequence runs at a time; returns whether this
    /// call started it.
    pub fn maybe_trigger(self: &Arc<Self>, weather: WeatherStatus) -> bool {
        if weather != WeatherStatus::Danger || !self.obs.telescope.polling() {
            return false;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return false;
        }

        tracing::warn!("weather turned dangerous, sealing the enclosure");
        let closer = Arc::clone(self);
        tokio::spawn(async move {
            closer.run().await;
            closer.in_flight.store(false, Ordering::SeqCst);
            tracing::info!("emergency closure sequence finished");
        });
        true
    }

    /// The fixed shutdown order. Every stage is polled to completion
    /// before the next starts; none of the waits is bounded, so a stuck
    /// actuator stalls the sequence here.
    pub async fn run(&self) {
        let obs = &self.obs;

        obs.telescope.queue_park();
        self.wait_until(|| obs.telescope.snapshot().status <= TelescopeStatus::Secure)
            .await;
        tracing::info!("telescope is down, latching curtains");

        self.wait_until(|| obs.curtain_east.get_status().at_rest()).await;
        obs.curtain_east.disable().await;
        self.wait_until(|| obs.curtain_west.get_status().at_rest()).await;
        obs.curtain_west.disable().await;
        self.wait_until(|| {
            obs.curtain_east.get_status() == CurtainStatus::Disabled
                && obs.curtain_west.get_status() == CurtainStatus::Disabled
        })
        .await;
        tracing::info!("curtains latched, closing the roof");

        obs.roof.close().await;

        obs.telescope.polling_end().await;
        obs.switches.get(SwitchKey::TelescopePower).off().await;
    }

    async fn wait_until(&self, condition: impl Fn() -> bool) {
        while !condition() {
            tokio::time::sleep(self.recheck).await;
        }
    }
}
