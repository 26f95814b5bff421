//! Server configuration.
//!
//! One TOML file describes the site, the device timings and the weather
//! thresholds. Values land in the typed bounds structs the device crates
//! consume; nothing re-reads configuration after startup.

use anyhow::Context;
use serde::Deserialize;
use skylid_devices::curtain::CurtainBounds;
use skylid_devices::telescope::{AltazimutalCoords, TelescopeBounds};
use skylid_devices::weather::WeatherThresholds;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub geography: GeographyConfig,
    pub telescope: TelescopeConfig,
    pub roof: RoofConfig,
    pub curtains: CurtainsConfig,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Seconds between background weather evaluations.
    #[serde(default = "default_weather_watch_secs")]
    pub weather_watch_secs: u64,
    /// Run against the simulator backends instead of hardware drivers.
    #[serde(default)]
    pub simulate: bool,
}

fn default_weather_watch_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeographyConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub height_m: f64,
    /// Reference equinox for equinox-aware mount drivers.
    pub equinox: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelescopeConfig {
    pub park_alt: f64,
    pub park_az: f64,
    pub flat_alt: f64,
    pub flat_az: f64,
    pub max_secure_alt: f64,
    pub az_ne: f64,
    pub az_se: f64,
    pub az_sw: f64,
    pub az_nw: f64,
    #[serde(default = "default_coord_decimals")]
    pub coord_decimals: u32,
    pub polling_interval_ms: u64,
}

fn default_coord_decimals() -> u32 {
    2
}

impl TelescopeConfig {
    pub fn bounds(&self) -> TelescopeBounds {
        TelescopeBounds {
            park: AltazimutalCoords {
                alt: self.park_alt,
                az: self.park_az,
            },
            flat: AltazimutalCoords {
                alt: self.flat_alt,
                az: self.flat_az,
            },
            max_secure_alt: self.max_secure_alt,
            az_ne: self.az_ne,
            az_se: self.az_se,
            az_sw: self.az_sw,
            az_nw: self.az_nw,
            coord_decimals: self.coord_decimals,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoofConfig {
    pub timeout_secs: u64,
}

impl RoofConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurtainsConfig {
    pub max_steps: u32,
    pub park_east_alt: f64,
    pub max_east_alt: f64,
    pub park_west_alt: f64,
    pub max_west_alt: f64,
    pub tick_ms: u64,
}

impl CurtainsConfig {
    /// The curtain floor is the telescope's secure altitude: below it
    /// both curtains stay shut.
    pub fn bounds(&self, floor_alt: f64) -> CurtainBounds {
        CurtainBounds {
            max_steps: self.max_steps,
            floor_alt,
            park_east_alt: self.park_east_alt,
            max_east_alt: self.max_east_alt,
            park_west_alt: self.park_west_alt,
            max_west_alt: self.max_west_alt,
        }
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    pub url: String,
    pub fallback_url: String,
    pub time_format: String,
    pub expiry_secs: u64,
    pub retry_secs: u64,
    pub thresholds: WeatherThresholds,
}

impl WeatherConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl Config {
    pub fn from_path(path: &Path) -> anyhow::Result<Config> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
