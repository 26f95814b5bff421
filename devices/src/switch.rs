//! Mains switch bank: telescope power, CCD power, flat-panel light and
//! dome light relays.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchStatus {
    Off,
    On,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwitchKey {
    TelescopePower,
    CcdPower,
    FlatLight,
    DomeLight,
}

impl SwitchKey {
    pub const ALL: [SwitchKey; 4] = [
        SwitchKey::TelescopePower,
        SwitchKey::CcdPower,
        SwitchKey::FlatLight,
        SwitchKey::DomeLight,
    ];
}

impl std::fmt::Display for SwitchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SwitchKey::TelescopePower => "telescope_power",
            SwitchKey::CcdPower => "ccd_power",
            SwitchKey::FlatLight => "flat_light",
            SwitchKey::DomeLight => "dome_light",
        };
        write!(f, "{}", name)
    }
}

/// Relay line behind one switch.
#[async_trait]
pub trait SwitchDriver: Send + Sync {
    async fn set(&self, on: bool);
    fn is_on(&self) -> bool;
}

pub struct SwitchControl {
    key: SwitchKey,
    driver: Arc<dyn SwitchDriver>,
    turned_on_at: StdRwLock<Option<DateTime<Utc>>>,
}

impl SwitchControl {
    pub fn new(key: SwitchKey, driver: Arc<dyn SwitchDriver>) -> Self {
        SwitchControl {
            key,
            driver,
            turned_on_at: StdRwLock::new(None),
        }
    }

    pub fn key(&self) -> SwitchKey {
        self.key
    }

    pub async fn on(&self) {
        self.driver.set(true).await;
        let mut at = self.turned_on_at.write().unwrap();
        if at.is_none() {
            *at = Some(Utc::now());
        }
        tracing::debug!(switch = %self.key, "switch on");
    }

    pub async fn off(&self) {
        self.driver.set(false).await;
        *self.turned_on_at.write().unwrap() = None;
        tracing::debug!(switch = %self.key, "switch off");
    }

    pub fn get_status(&self) -> SwitchStatus {
        if self.driver.is_on() {
            SwitchStatus::On
        } else {
            SwitchStatus::Off
        }
    }

    /// When the relay was last switched on; `None` while off.
    pub fn turned_on_at(&self) -> Option<DateTime<Utc>> {
        *self.turned_on_at.read().unwrap()
    }
}

pub struct SwitchBank {
    switches: HashMap<SwitchKey, Arc<SwitchControl>>,
}

impl SwitchBank {
    pub fn new(switches: impl IntoIterator<Item = Arc<SwitchControl>>) -> Self {
        SwitchBank {
            switches: switches.into_iter().map(|s| (s.key(), s)).collect(),
        }
    }

    pub fn get(&self, key: SwitchKey) -> &SwitchControl {
        &self.switches[&key]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSwitch;

    #[tokio::test]
    async fn on_records_the_instant_once() {
        let control = SwitchControl::new(SwitchKey::TelescopePower, SimSwitch::new("tele"));
        assert_eq!(control.get_status(), SwitchStatus::Off);
        assert!(control.turned_on_at().is_none());

        control.on().await;
        let first = control.turned_on_at().unwrap();
        control.on().await;
        assert_eq!(control.turned_on_at().unwrap(), first);

        control.off().await;
        assert_eq!(control.get_status(), SwitchStatus::Off);
        assert!(control.turned_on_at().is_none());
    }
}
