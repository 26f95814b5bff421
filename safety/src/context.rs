//! Composition-root context shared by the interlock chains.
//!
//! The device singletons are constructed once at startup and owned here;
//! handlers receive the context explicitly instead of reaching for
//! process globals.

use skylid_devices::curtain::{CurtainBounds, CurtainControl, CurtainStatus};
use skylid_devices::roof::RoofControl;
use skylid_devices::switch::SwitchBank;
use skylid_devices::telescope::{TelescopeControl, TelescopeStatus};
use skylid_devices::weather::WeatherMonitor;
use std::sync::Arc;

pub struct Observatory {
    pub telescope: Arc<TelescopeControl>,
    pub roof: Arc<RoofControl>,
    pub curtain_east: Arc<CurtainControl>,
    pub curtain_west: Arc<CurtainControl>,
    pub weather: Arc<WeatherMonitor>,
    pub switches: Arc<SwitchBank>,
    pub curtain_bounds: CurtainBounds,
}

pub type SharedObservatory = Arc<Observatory>;

impl Observatory {
    /// The mount is safe to close the roof over: pointing at or below
    /// the secure altitude, with the poll worker alive to vouch for it.
    pub fn telescope_is_secure(&self) -> bool {
        self.telescope.snapshot().status <= TelescopeStatus::Secure && self.telescope.polling()
    }

    /// Both curtains are latched shut.
    pub fn curtains_are_secure(&self) -> bool {
        self.curtain_east.get_status() == CurtainStatus::Disabled
            && self.curtain_west.get_status() == CurtainStatus::Disabled
    }
}
