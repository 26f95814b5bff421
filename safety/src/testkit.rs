//! Shared fixtures for the interlock and sequencer tests: a complete
//! observatory wired to simulator backends with one common journal.

use crate::context::{Observatory, SharedObservatory};
use chrono::Utc;
use skylid_devices::astro::Site;
use skylid_devices::curtain::{CurtainBounds, CurtainControl, Orientation};
use skylid_devices::roof::RoofControl;
use skylid_devices::sim::{
    new_journal, OpsJournal, SimCurtain, SimRoof, SimSwitch, SimTelescope, StaticFeed,
};
use skylid_devices::switch::{SwitchBank, SwitchControl, SwitchKey};
use skylid_devices::telescope::{AltazimutalCoords, TelescopeBounds, TelescopeControl};
use skylid_devices::weather::{Band, MetricBands, WeatherMonitor, WeatherThresholds};
use std::sync::Arc;
use std::time::Duration;

pub struct SimObservatory {
    pub obs: SharedObservatory,
    pub telescope: Arc<SimTelescope>,
    pub roof: Arc<SimRoof>,
    pub east: Arc<SimCurtain>,
    pub west: Arc<SimCurtain>,
    pub feed: Arc<StaticFeed>,
    pub journal: OpsJournal,
}

pub fn aa(alt: f64, az: f64) -> AltazimutalCoords {
    AltazimutalCoords { alt, az }
}

fn bands(normal: (f64, f64), warning: (f64, f64), danger: (f64, f64)) -> MetricBands {
    MetricBands {
        normal: Band { lower: normal.0, upper: normal.1 },
        warning: Band { lower: warning.0, upper: warning.1 },
        danger: Band { lower: danger.0, upper: danger.1 },
    }
}

pub fn thresholds() -> WeatherThresholds {
    WeatherThresholds {
        wind_speed: bands((0.0, 15.0), (15.0, 30.0), (30.0, 100.0)),
        wind_gust: bands((0.0, 25.0), (25.0, 45.0), (45.0, 150.0)),
        temperature: bands((-10.0, 30.0), (30.0, 40.0), (40.0, 60.0)),
        humidity: bands((0.0, 75.0), (75.0, 90.0), (90.0, 100.0)),
        rain_rate: bands((0.0, 0.0), (0.0, 2.0), (2.0, 400.0)),
        barometer: bands((1005.0, 1050.0), (990.0, 1005.0), (900.0, 990.0)),
        barometer_trend: bands((-1.0, 10.0), (-3.0, -1.0), (-50.0, -3.0)),
    }
}

pub fn telescope_bounds() -> TelescopeBounds {
    TelescopeBounds {
        park: aa(0.0, 0.0),
        flat: aa(10.0, 180.0),
        max_secure_alt: 15.0,
        az_ne: 70.0,
        az_se: 140.0,
        az_sw: 230.0,
        az_nw: 290.0,
        coord_decimals: 2,
    }
}

pub fn curtain_bounds() -> CurtainBounds {
    CurtainBounds {
        max_steps: 155,
        floor_alt: 15.0,
        park_east_alt: 10.0,
        max_east_alt: 50.0,
        park_west_alt: 10.0,
        max_west_alt: 50.0,
    }
}

/// A full observatory on simulators: roof open, curtains disabled,
/// calm weather, telescope parked and not yet polling.
pub fn sim_observatory() -> SimObservatory {
    let journal = new_journal();

    let telescope_sim = SimTelescope::new(aa(0.0, 0.0), aa(10.0, 180.0));
    telescope_sim.set_journal(Arc::clone(&journal));
    let site = Site {
        latitude_deg: 45.0,
        longitude_deg: 11.0,
        height_m: 650.0,
    };
    let telescope = TelescopeControl::new(
        telescope_sim.clone(),
        Arc::new(site),
        telescope_bounds(),
        Duration::from_millis(5),
    );

    let roof_sim = SimRoof::opened();
    roof_sim.set_journal(Arc::clone(&journal));
    let roof = Arc::new(RoofControl::new(
        roof_sim.clone(),
        Duration::from_millis(100),
    ));

    let east_sim = SimCurtain::new("east", 155);
    east_sim.set_journal(Arc::clone(&journal));
    let west_sim = SimCurtain::new("west", 155);
    west_sim.set_journal(Arc::clone(&journal));
    let curtain_east = Arc::new(CurtainControl::new(
        Orientation::East,
        east_sim.clone(),
        155,
        Duration::from_millis(1),
    ));
    let curtain_west = Arc::new(CurtainControl::new(
        Orientation::West,
        west_sim.clone(),
        155,
        Duration::from_millis(1),
    ));

    let feed = StaticFeed::with_readings(&[("windSpeed", 5.0)], Utc::now());
    let weather = Arc::new(WeatherMonitor::new(
        feed.clone(),
        StaticFeed::failing(),
        thresholds(),
        Duration::from_secs(600),
        Duration::from_millis(0),
    ));

    let mut switches = Vec::new();
    for key in SwitchKey::ALL {
        let driver = SimSwitch::new(key.to_string());
        driver.set_journal(Arc::clone(&journal));
        switches.push(Arc::new(SwitchControl::new(key, driver)));
    }
    let switches = Arc::new(SwitchBank::new(switches));

    let obs = Arc::new(Observatory {
        telescope,
        roof,
        curtain_east,
        curtain_west,
        weather,
        switches,
        curtain_bounds: curtain_bounds(),
    });

    SimObservatory {
        obs,
        telescope: telescope_sim,
        roof: roof_sim,
        east: east_sim,
        west: west_sim,
        feed,
        journal,
    }
}

/// Force the shared feed into a dangerous reading.
pub fn make_weather_dangerous(fixture: &SimObservatory) {
    fixture
        .feed
        .set_readings(&[("windSpeed", 50.0), ("rainRate", 10.0)], Utc::now());
}

/// Position of the first matching journal entry.
pub fn journal_position(fixture: &SimObservatory, entry: &str) -> Option<usize> {
    fixture
        .journal
        .lock()
        .unwrap()
        .iter()
        .position(|op| op == entry)
}

pub fn clear_journal(fixture: &SimObservatory) {
    fixture.journal.lock().unwrap().clear();
}
