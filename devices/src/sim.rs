//! Simulator device backends.
//!
//! Stand-ins for the hardware boards, selected by configuration when the
//! enclosure runs on a bench and used throughout the tests. Every
//! simulator records its operations into a journal; tests share one
//! journal across devices to assert cross-device ordering.

use crate::curtain::{CurtainActuator, Direction};
use crate::error::{DeviceError, DeviceResult};
use crate::roof::RoofActuator;
use crate::switch::SwitchDriver;
use crate::telescope::{
    AltazimutalCoords, EquatorialCoords, TelescopeDriver, TelescopeReading, TelescopeSpeed,
};
use crate::weather::{FeedObservation, SensorReading, WeatherFeed};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

/// Shared operations journal.
pub type OpsJournal = Arc<StdMutex<Vec<String>>>;

pub fn new_journal() -> OpsJournal {
    Arc::new(StdMutex::new(Vec::new()))
}

fn record(journal: &StdMutex<OpsJournal>, entry: impl Into<String>) {
    journal.lock().unwrap().lock().unwrap().push(entry.into());
}

// ============================================================
// Telescope
// ============================================================

struct SimTelescopeInner {
    aa: AltazimutalCoords,
    eq: EquatorialCoords,
    speed: TelescopeSpeed,
}

/// Simulated mount. Park and flat commands jump straight to the
/// configured orientations.
pub struct SimTelescope {
    park: AltazimutalCoords,
    flat: AltazimutalCoords,
    inner: StdMutex<SimTelescopeInner>,
    fail_connect: AtomicBool,
    has_tracking_off: AtomicBool,
    journal: StdMutex<OpsJournal>,
}

impl SimTelescope {
    pub fn new(park: AltazimutalCoords, flat: AltazimutalCoords) -> Arc<Self> {
        Arc::new(SimTelescope {
            park,
            flat,
            inner: StdMutex::new(SimTelescopeInner {
                aa: park,
                eq: EquatorialCoords { ra: 0.0, dec: 0.0 },
                speed: TelescopeSpeed::Tracking,
            }),
            fail_connect: AtomicBool::new(false),
            has_tracking_off: AtomicBool::new(true),
            journal: StdMutex::new(new_journal()),
        })
    }

    pub fn set_journal(&self, journal: OpsJournal) {
        *self.journal.lock().unwrap() = journal;
    }

    pub fn journal_entries(&self) -> Vec<String> {
        self.journal.lock().unwrap().lock().unwrap().clone()
    }

    pub fn set_pointing(&self, aa: AltazimutalCoords) {
        self.inner.lock().unwrap().aa = aa;
    }

    pub fn set_speed_reading(&self, speed: TelescopeSpeed) {
        self.inner.lock().unwrap().speed = speed;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_has_tracking_off(&self, value: bool) {
        self.has_tracking_off.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl TelescopeDriver for SimTelescope {
    async fn connect(&self) -> DeviceResult<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            // a real link throttles reconnects with its own timeout
            tokio::time::sleep(Duration::from_millis(2)).await;
            return Err(DeviceError::connection_failed("mount", "simulated outage"));
        }
        record(&self.journal, "telescope.connect");
        Ok(())
    }

    async fn disconnect(&self) -> DeviceResult<()> {
        record(&self.journal, "telescope.disconnect");
        Ok(())
    }

    async fn sync(&self, eq: EquatorialCoords) -> DeviceResult<()> {
        self.inner.lock().unwrap().eq = eq;
        record(&self.journal, "telescope.sync");
        Ok(())
    }

    async fn set_speed(&self, speed: TelescopeSpeed) -> DeviceResult<()> {
        self.inner.lock().unwrap().speed = speed;
        record(&self.journal, "telescope.set_speed");
        Ok(())
    }

    async fn park(&self, speed: TelescopeSpeed) -> DeviceResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.aa = self.park;
        inner.speed = speed;
        record(&self.journal, "telescope.park");
        Ok(())
    }

    async fn flat(&self, speed: TelescopeSpeed) -> DeviceResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.aa = self.flat;
        inner.speed = speed;
        record(&self.journal, "telescope.flat");
        Ok(())
    }

    async fn retrieve(&self) -> DeviceResult<TelescopeReading> {
        let inner = self.inner.lock().unwrap();
        Ok(TelescopeReading {
            eq: inner.eq,
            aa: inner.aa,
            speed: inner.speed,
        })
    }

    fn has_tracking_off(&self) -> bool {
        self.has_tracking_off.load(Ordering::SeqCst)
    }
}

// ============================================================
// Roof
// ============================================================

struct SimRoofInner {
    motor: bool,
    open_switch: bool,
    closed_switch: bool,
}

/// Simulated roof board. Travel completes after a fixed delay unless the
/// roof is scripted to be stuck.
pub struct SimRoof {
    travel: Duration,
    stuck: AtomicBool,
    inner: StdMutex<SimRoofInner>,
    journal: StdMutex<OpsJournal>,
}

impl SimRoof {
    /// Start with the roof shut.
    pub fn new() -> Arc<Self> {
        Arc::new(SimRoof {
            travel: Duration::from_millis(5),
            stuck: AtomicBool::new(false),
            inner: StdMutex::new(SimRoofInner {
                motor: false,
                open_switch: false,
                closed_switch: true,
            }),
            journal: StdMutex::new(new_journal()),
        })
    }

    /// Start with the roof fully open (motor line held energized).
    pub fn opened() -> Arc<Self> {
        let roof = SimRoof::new();
        {
            let mut inner = roof.inner.lock().unwrap();
            inner.motor = true;
            inner.open_switch = true;
            inner.closed_switch = false;
        }
        roof
    }

    pub fn set_journal(&self, journal: OpsJournal) {
        *self.journal.lock().unwrap() = journal;
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.store(stuck, Ordering::SeqCst);
    }

    /// Force the roof into the resting closed state.
    pub fn force_closed(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.motor = false;
        inner.open_switch = false;
        inner.closed_switch = true;
    }

    /// Force the mid-travel state: motor energized, no switch tripped.
    pub fn force_moving(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.motor = true;
        inner.open_switch = false;
        inner.closed_switch = false;
    }
}

#[async_trait]
impl RoofActuator for SimRoof {
    async fn energize(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.motor = true;
        inner.closed_switch = false;
        record(&self.journal, "roof.open");
    }

    async fn de_energize(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.motor = false;
        inner.open_switch = false;
        record(&self.journal, "roof.close");
    }

    fn motor_energized(&self) -> bool {
        self.inner.lock().unwrap().motor
    }

    fn open_switch_active(&self) -> bool {
        self.inner.lock().unwrap().open_switch
    }

    fn closed_switch_active(&self) -> bool {
        self.inner.lock().unwrap().closed_switch
    }

    async fn wait_open(&self, _timeout: Duration) -> bool {
        if self.stuck.load(Ordering::SeqCst) {
            return false;
        }
        tokio::time::sleep(self.travel).await;
        self.inner.lock().unwrap().open_switch = true;
        true
    }

    async fn wait_closed(&self, _timeout: Duration) -> bool {
        if self.stuck.load(Ordering::SeqCst) {
            return false;
        }
        tokio::time::sleep(self.travel).await;
        self.inner.lock().unwrap().closed_switch = true;
        true
    }
}

// ============================================================
// Curtain
// ============================================================

struct SimCurtainInner {
    step: u32,
    direction: Option<Direction>,
}

/// Simulated curtain motor and encoder. The encoder advances a fixed
/// number of counts per read while the motor is driving.
pub struct SimCurtain {
    label: String,
    max_steps: u32,
    counts_per_read: u32,
    open_limit_at: AtomicU32,
    inner: StdMutex<SimCurtainInner>,
    journal: StdMutex<OpsJournal>,
}

impl SimCurtain {
    pub fn new(label: impl Into<String>, max_steps: u32) -> Arc<Self> {
        Arc::new(SimCurtain {
            label: label.into(),
            max_steps,
            counts_per_read: 20,
            open_limit_at: AtomicU32::new(max_steps),
            inner: StdMutex::new(SimCurtainInner {
                step: 0,
                direction: None,
            }),
            journal: StdMutex::new(new_journal()),
        })
    }

    pub fn set_journal(&self, journal: OpsJournal) {
        *self.journal.lock().unwrap() = journal;
    }

    /// Trip the open travel switch early, as a physical obstruction
    /// would.
    pub fn trip_open_limit_at(&self, step: u32) {
        self.open_limit_at.store(step, Ordering::SeqCst);
    }
}

#[async_trait]
impl CurtainActuator for SimCurtain {
    async fn drive(&self, direction: Direction) {
        self.inner.lock().unwrap().direction = Some(direction);
        record(&self.journal, format!("curtain.{}.drive", self.label));
    }

    async fn stop(&self) {
        self.inner.lock().unwrap().direction = None;
        record(&self.journal, format!("curtain.{}.stop", self.label));
    }

    fn step(&self) -> u32 {
        let mut inner = self.inner.lock().unwrap();
        match inner.direction {
            Some(Direction::Opening) => {
                inner.step = (inner.step + self.counts_per_read).min(self.max_steps);
            }
            Some(Direction::Closing) => {
                inner.step = inner.step.saturating_sub(self.counts_per_read);
            }
            None => {}
        }
        inner.step
    }

    fn open_limit_active(&self) -> bool {
        self.inner.lock().unwrap().step >= self.open_limit_at.load(Ordering::SeqCst)
    }

    fn closed_limit_active(&self) -> bool {
        self.inner.lock().unwrap().step == 0
    }
}

// ============================================================
// Switches
// ============================================================

/// Simulated mains relay.
pub struct SimSwitch {
    label: String,
    on: AtomicBool,
    journal: StdMutex<OpsJournal>,
}

impl SimSwitch {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(SimSwitch {
            label: label.into(),
            on: AtomicBool::new(false),
            journal: StdMutex::new(new_journal()),
        })
    }

    pub fn set_journal(&self, journal: OpsJournal) {
        *self.journal.lock().unwrap() = journal;
    }
}

#[async_trait]
impl SwitchDriver for SimSwitch {
    async fn set(&self, on: bool) {
        self.on.store(on, Ordering::SeqCst);
        let state = if on { "on" } else { "off" };
        record(&self.journal, format!("switch.{}.{}", self.label, state));
    }

    fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }
}

// ============================================================
// Weather feed
// ============================================================

/// Canned weather feed: either serves a fixed observation or fails every
/// fetch.
pub struct StaticFeed {
    observation: StdMutex<Option<FeedObservation>>,
    fetches: AtomicUsize,
}

impl StaticFeed {
    pub fn with_readings(readings: &[(&str, f64)], updated_at: DateTime<Utc>) -> Arc<Self> {
        let readings: HashMap<String, SensorReading> = readings
            .iter()
            .map(|(name, value)| {
                (
                    (*name).to_string(),
                    SensorReading {
                        value: *value,
                        unit: String::new(),
                    },
                )
            })
            .collect();
        Arc::new(StaticFeed {
            observation: StdMutex::new(Some(FeedObservation {
                readings,
                updated_at,
            })),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(StaticFeed {
            observation: StdMutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_readings(&self, readings: &[(&str, f64)], updated_at: DateTime<Utc>) {
        let readings: HashMap<String, SensorReading> = readings
            .iter()
            .map(|(name, value)| {
                (
                    (*name).to_string(),
                    SensorReading {
                        value: *value,
                        unit: String::new(),
                    },
                )
            })
            .collect();
        *self.observation.lock().unwrap() = Some(FeedObservation {
            readings,
            updated_at,
        });
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherFeed for StaticFeed {
    async fn fetch(&self) -> DeviceResult<FeedObservation> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.observation
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DeviceError::Feed("simulated feed outage".into()))
    }
}
