//! Builds the device singletons from configuration and wires the
//! composition root.

use crate::config::Config;
use anyhow::bail;
use skylid_devices::astro::Site;
use skylid_devices::curtain::{CurtainControl, Orientation};
use skylid_devices::roof::RoofControl;
use skylid_devices::sim::{SimCurtain, SimRoof, SimSwitch, SimTelescope};
use skylid_devices::switch::{SwitchBank, SwitchControl, SwitchKey};
use skylid_devices::telescope::TelescopeControl;
use skylid_devices::weather::{HttpWeatherFeed, WeatherMonitor};
use skylid_safety::emergency::EmergencyCloser;
use skylid_safety::weather_actions::WeatherActions;
use skylid_safety::{Observatory, SharedObservatory};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub fn build(config: &Config) -> anyhow::Result<(SharedObservatory, Arc<EmergencyCloser>)> {
    if !config.server.simulate {
        // Hardware boards register here once their drivers land; the
        // bench build only knows the simulators.
        bail!("no hardware backends in this build; set [server] simulate = true");
    }

    let site = Site {
        latitude_deg: config.geography.latitude,
        longitude_deg: config.geography.longitude,
        height_m: config.geography.height_m,
    };
    tracing::info!(
        lat = site.latitude_deg,
        lon = site.longitude_deg,
        equinox = %config.geography.equinox,
        "observer site configured"
    );

    let bounds = config.telescope.bounds();
    let telescope_driver = SimTelescope::new(bounds.park, bounds.flat);
    let telescope = TelescopeControl::new(
        telescope_driver,
        Arc::new(site),
        bounds,
        config.telescope.poll_interval(),
    );

    let roof = Arc::new(RoofControl::new(SimRoof::new(), config.roof.timeout()));

    let curtain_east = Arc::new(CurtainControl::new(
        Orientation::East,
        SimCurtain::new("east", config.curtains.max_steps),
        config.curtains.max_steps,
        config.curtains.tick(),
    ));
    let curtain_west = Arc::new(CurtainControl::new(
        Orientation::West,
        SimCurtain::new("west", config.curtains.max_steps),
        config.curtains.max_steps,
        config.curtains.tick(),
    ));

    let weather = Arc::new(WeatherMonitor::new(
        Arc::new(HttpWeatherFeed::new(
            config.weather.url.clone(),
            config.weather.time_format.clone(),
        )),
        Arc::new(HttpWeatherFeed::new(
            config.weather.fallback_url.clone(),
            config.weather.time_format.clone(),
        )),
        config.weather.thresholds.clone(),
        config.weather.expiry(),
        config.weather.retry_interval(),
    ));

    let switches = Arc::new(SwitchBank::new(SwitchKey::ALL.map(|key| {
        Arc::new(SwitchControl::new(key, SimSwitch::new(key.to_string())))
    })));

    let obs = Arc::new(Observatory {
        telescope,
        roof,
        curtain_east,
        curtain_west,
        weather,
        switches,
        curtain_bounds: config
            .curtains
            .bounds(config.telescope.max_secure_alt),
    });
    let closer = EmergencyCloser::new(Arc::clone(&obs));

    Ok((obs, closer))
}

/// Background weather watch: evaluates on an interval so the transition
/// to dangerous weather is noticed even between operator requests.
pub fn spawn_weather_watch(closer: Arc<EmergencyCloser>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let actions = WeatherActions::new(closer);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = actions.get_status().await;
            tracing::debug!(status = ?report.status, "weather watch tick");
        }
    })
}
