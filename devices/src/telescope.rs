//! Telescope mount state machine.
//!
//! `TelescopeControl` owns the connection-polling worker and the
//! serialized job queue. All mutation of the published state happens on
//! the worker; everyone else reads a lock-free snapshot that may be up
//! to one poll interval stale, which is fine because the interlocks
//! re-evaluate on every request.

use crate::astro::{airmass, CoordinateTransform};
use crate::error::DeviceResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Pointing classification of the mount.
///
/// The declaration order is load-bearing: everything at or below
/// `Secure` is safe to close the roof over, and the interlocks compare
/// with `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TelescopeStatus {
    Disconnected,
    Lost,
    Error,
    Parked,
    Flatter,
    Secure,
    Northeast,
    Northwest,
    Southwest,
    Southeast,
    West,
    East,
}

impl std::fmt::Display for TelescopeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Drive rate reported by, or commanded to, the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelescopeSpeed {
    Tracking,
    Slewing,
    NotTracking,
    Error,
}

/// Equatorial coordinates: right ascension in hours, declination in
/// degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoords {
    pub ra: f64,
    pub dec: f64,
}

/// Horizontal coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AltazimutalCoords {
    pub alt: f64,
    pub az: f64,
}

/// Round to a fixed number of decimal places before comparing or
/// publishing coordinates.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Configured pointing targets and zone boundaries.
#[derive(Debug, Clone, Deserialize)]
pub struct TelescopeBounds {
    pub park: AltazimutalCoords,
    pub flat: AltazimutalCoords,
    /// Altitude at or below which the mount is safe to close over.
    pub max_secure_alt: f64,
    pub az_ne: f64,
    pub az_se: f64,
    pub az_sw: f64,
    pub az_nw: f64,
    /// Decimal places kept on published coordinates.
    pub coord_decimals: u32,
}

/// Half-width of the park/flat target windows, degrees.
const TARGET_TOLERANCE: f64 = 2.0;

/// Decimal places used for the park-sync coordinate.
const SYNC_DECIMALS: u32 = 2;

fn within_target(aa: AltazimutalCoords, target: AltazimutalCoords) -> bool {
    (aa.alt - target.alt).abs() <= TARGET_TOLERANCE && (aa.az - target.az).abs() <= TARGET_TOLERANCE
}

/// Classify the pointing position. Pure function of the polling flag,
/// the horizontal coordinates and the configured bounds.
///
/// Precedence: disconnected, park window, flat window, secure altitude,
/// then the six azimuth bands tested in this fixed order.
pub fn classify(polling: bool, aa: AltazimutalCoords, bounds: &TelescopeBounds) -> TelescopeStatus {
    if !polling {
        return TelescopeStatus::Disconnected;
    }
    if within_target(aa, bounds.park) {
        return TelescopeStatus::Parked;
    }
    if within_target(aa, bounds.flat) {
        return TelescopeStatus::Flatter;
    }
    if aa.alt <= bounds.max_secure_alt {
        return TelescopeStatus::Secure;
    }

    let az = aa.az;
    if az < bounds.az_ne {
        TelescopeStatus::Northeast
    } else if az > bounds.az_nw {
        TelescopeStatus::Northwest
    } else if bounds.az_sw > az && az > 180.0 {
        TelescopeStatus::Southwest
    } else if 180.0 >= az && az > bounds.az_se {
        TelescopeStatus::Southeast
    } else if bounds.az_sw < az && az <= bounds.az_nw {
        TelescopeStatus::West
    } else if bounds.az_ne <= az && az <= bounds.az_se {
        TelescopeStatus::East
    } else {
        // Only reachable when the configured band boundaries leave a gap.
        tracing::warn!(az, "azimuth matched no configured band");
        TelescopeStatus::Error
    }
}

/// Everything the mount driver reports in one poll.
#[derive(Debug, Clone, Copy)]
pub struct TelescopeReading {
    pub eq: EquatorialCoords,
    pub aa: AltazimutalCoords,
    pub speed: TelescopeSpeed,
}

/// Mount driver contract. Implementations are selected at construction
/// time by configuration; any call may fail with a transient I/O error,
/// which the poll loop absorbs by demoting the status.
#[async_trait]
pub trait TelescopeDriver: Send + Sync {
    async fn connect(&self) -> DeviceResult<()>;
    async fn disconnect(&self) -> DeviceResult<()>;
    /// Register the mount at the given equatorial coordinates.
    async fn sync(&self, eq: EquatorialCoords) -> DeviceResult<()>;
    async fn set_speed(&self, speed: TelescopeSpeed) -> DeviceResult<()>;
    /// Move to the park orientation, leaving the drive at `speed`.
    async fn park(&self, speed: TelescopeSpeed) -> DeviceResult<()>;
    /// Move to the flat-panel orientation, leaving the drive at `speed`.
    async fn flat(&self, speed: TelescopeSpeed) -> DeviceResult<()>;
    async fn retrieve(&self) -> DeviceResult<TelescopeReading>;
    /// Whether the drive can be stopped outright.
    fn has_tracking_off(&self) -> bool;
}

/// Deferred unit of mount work, executed one per poll cycle in FIFO
/// order.
#[derive(Debug, Clone, Copy)]
pub enum Job {
    Sync { started_at: DateTime<Utc> },
    Park { speed: TelescopeSpeed },
    Flat { speed: TelescopeSpeed },
    SetSpeed { speed: TelescopeSpeed },
}

/// Published mount state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TelescopeSnapshot {
    pub status: TelescopeStatus,
    pub speed: TelescopeSpeed,
    pub eq: Option<EquatorialCoords>,
    pub aa: Option<AltazimutalCoords>,
    pub airmass: Option<f64>,
}

impl TelescopeSnapshot {
    fn reset() -> Self {
        TelescopeSnapshot {
            status: TelescopeStatus::Disconnected,
            speed: TelescopeSpeed::Error,
            eq: None,
            aa: None,
            airmass: None,
        }
    }
}

pub struct TelescopeControl {
    driver: Arc<dyn TelescopeDriver>,
    transform: Arc<dyn CoordinateTransform>,
    bounds: TelescopeBounds,
    poll_interval: Duration,
    jobs_tx: mpsc::UnboundedSender<Job>,
    jobs_rx: StdMutex<mpsc::UnboundedReceiver<Job>>,
    polling: AtomicBool,
    snapshot_tx: watch::Sender<TelescopeSnapshot>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TelescopeControl {
    pub fn new(
        driver: Arc<dyn TelescopeDriver>,
        transform: Arc<dyn CoordinateTransform>,
        bounds: TelescopeBounds,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(TelescopeSnapshot::reset());
        Arc::new(TelescopeControl {
            driver,
            transform,
            bounds,
            poll_interval,
            jobs_tx,
            jobs_rx: StdMutex::new(jobs_rx),
            polling: AtomicBool::new(false),
            snapshot_tx,
            worker: Mutex::new(None),
        })
    }

    pub fn polling(&self) -> bool {
        self.polling.load(Ordering::SeqCst)
    }

    /// Current published state, read without blocking the worker.
    pub fn snapshot(&self) -> TelescopeSnapshot {
        *self.snapshot_tx.borrow()
    }

    /// Subscribe to snapshot updates.
    pub fn watch(&self) -> watch::Receiver<TelescopeSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn bounds(&self) -> &TelescopeBounds {
        &self.bounds
    }

    /// Start the poll worker. No-op when it is already running.
    pub async fn polling_start(self: &Arc<Self>) {
        if self.polling.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("telescope polling started");
        let control = Arc::clone(self);
        let handle = tokio::spawn(async move { control.poll_loop().await });
        *self.worker.lock().await = Some(handle);
    }

    /// Stop the poll worker and wait for it to exit. The worker resets
    /// the published state to disconnected on its way out.
    pub async fn polling_end(&self) {
        if !self.polling.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("telescope polling stopped");
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }

    pub fn queue_sync(&self, started_at: DateTime<Utc>) {
        let _ = self.jobs_tx.send(Job::Sync { started_at });
    }

    pub fn queue_set_speed(&self, speed: TelescopeSpeed) {
        // Drives without a tracking-off capability keep tracking.
        let speed = if speed == TelescopeSpeed::NotTracking && !self.driver.has_tracking_off() {
            TelescopeSpeed::Tracking
        } else {
            speed
        };
        let _ = self.jobs_tx.send(Job::SetSpeed { speed });
    }

    pub fn queue_park(&self) {
        let _ = self.jobs_tx.send(Job::Park {
            speed: self.rest_speed(),
        });
    }

    pub fn queue_flat(&self) {
        let _ = self.jobs_tx.send(Job::Flat {
            speed: self.rest_speed(),
        });
    }

    fn rest_speed(&self) -> TelescopeSpeed {
        if self.driver.has_tracking_off() {
            TelescopeSpeed::NotTracking
        } else {
            TelescopeSpeed::Tracking
        }
    }

    async fn poll_loop(&self) {
        while self.polling() {
            if let Err(err) = self.driver.connect().await {
                // The driver's own connect timeout throttles the retry
                // rate, so no extra sleep here.
                tracing::error!(%err, "mount connection failed");
                self.set_status(TelescopeStatus::Lost);
                continue;
            }

            let job = self.jobs_rx.lock().unwrap().try_recv().ok();
            if let Some(job) = job {
                tracing::debug!(?job, "executing queued mount job");
                if let Err(err) = self.execute(job).await {
                    tracing::error!(%err, "mount job failed");
                    self.set_status(TelescopeStatus::Error);
                }
            } else {
                match self.driver.retrieve().await {
                    Ok(reading) => self.publish_reading(reading),
                    Err(err) => {
                        tracing::error!(%err, "mount retrieve failed");
                        self.set_status(TelescopeStatus::Error);
                    }
                }
            }

            let _ = self.driver.disconnect().await;
            tokio::time::sleep(self.poll_interval).await;
        }

        self.snapshot_tx.send_replace(TelescopeSnapshot::reset());
        let _ = self.driver.disconnect().await;
    }

    async fn execute(&self, job: Job) -> DeviceResult<()> {
        match job {
            Job::Sync { started_at } => {
                let eq = self.park_sync_coords(started_at, Utc::now());
                self.driver.sync(eq).await
            }
            Job::Park { speed } => self.driver.park(speed).await,
            Job::Flat { speed } => self.driver.flat(speed).await,
            Job::SetSpeed { speed } => self.driver.set_speed(speed).await,
        }
    }

    /// Equatorial coordinates of the park orientation as of `started_at`.
    /// A stopped drive has drifted with the sky since then, so the right
    /// ascension gains one hour per elapsed hour.
    fn park_sync_coords(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> EquatorialCoords {
        let eq = self.transform.altaz_to_radec(self.bounds.park, started_at);
        let eq = if self.snapshot().speed == TelescopeSpeed::NotTracking {
            let elapsed_hours = (now - started_at).num_milliseconds() as f64 / 3_600_000.0;
            EquatorialCoords {
                ra: eq.ra + elapsed_hours,
                dec: eq.dec,
            }
        } else {
            eq
        };
        EquatorialCoords {
            ra: round_to(eq.ra, SYNC_DECIMALS),
            dec: round_to(eq.dec, SYNC_DECIMALS),
        }
    }

    fn set_status(&self, status: TelescopeStatus) {
        self.snapshot_tx.send_modify(|s| s.status = status);
    }

    fn publish_reading(&self, reading: TelescopeReading) {
        let decimals = self.bounds.coord_decimals;
        let aa = AltazimutalCoords {
            alt: round_to(reading.aa.alt, decimals),
            az: round_to(reading.aa.az, decimals),
        };
        let status = classify(self.polling(), aa, &self.bounds);
        self.snapshot_tx.send_replace(TelescopeSnapshot {
            status,
            speed: reading.speed,
            eq: Some(EquatorialCoords {
                ra: round_to(reading.eq.ra, decimals),
                dec: round_to(reading.eq.dec, decimals),
            }),
            aa: Some(aa),
            airmass: Some(airmass(aa.alt)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimTelescope;
    use crate::astro::Site;

    fn bounds() -> TelescopeBounds {
        TelescopeBounds {
            park: AltazimutalCoords { alt: 0.0, az: 0.0 },
            flat: AltazimutalCoords { alt: 10.0, az: 180.0 },
            max_secure_alt: 15.0,
            az_ne: 70.0,
            az_se: 140.0,
            az_sw: 230.0,
            az_nw: 290.0,
            coord_decimals: 2,
        }
    }

    fn aa(alt: f64, az: f64) -> AltazimutalCoords {
        AltazimutalCoords { alt, az }
    }

    #[test]
    fn classification_precedence() {
        let b = bounds();
        assert_eq!(classify(false, aa(80.0, 90.0), &b), TelescopeStatus::Disconnected);
        assert_eq!(classify(true, aa(1.5, 1.0), &b), TelescopeStatus::Parked);
        assert_eq!(classify(true, aa(9.0, 181.9), &b), TelescopeStatus::Flatter);
        assert_eq!(classify(true, aa(14.0, 90.0), &b), TelescopeStatus::Secure);
    }

    #[test]
    fn classification_azimuth_bands() {
        let b = bounds();
        assert_eq!(classify(true, aa(40.0, 30.0), &b), TelescopeStatus::Northeast);
        assert_eq!(classify(true, aa(40.0, 300.0), &b), TelescopeStatus::Northwest);
        assert_eq!(classify(true, aa(40.0, 200.0), &b), TelescopeStatus::Southwest);
        assert_eq!(classify(true, aa(40.0, 160.0), &b), TelescopeStatus::Southeast);
        assert_eq!(classify(true, aa(40.0, 260.0), &b), TelescopeStatus::West);
        assert_eq!(classify(true, aa(40.0, 100.0), &b), TelescopeStatus::East);
    }

    #[test]
    fn classification_is_pure() {
        let b = bounds();
        let first = classify(true, aa(40.0, 260.0), &b);
        for _ in 0..100 {
            assert_eq!(classify(true, aa(40.0, 260.0), &b), first);
        }
    }

    #[test]
    fn status_ordering_marks_secure_zone() {
        assert!(TelescopeStatus::Parked <= TelescopeStatus::Secure);
        assert!(TelescopeStatus::Flatter <= TelescopeStatus::Secure);
        assert!(TelescopeStatus::West > TelescopeStatus::Secure);
        assert!(TelescopeStatus::East > TelescopeStatus::Secure);
    }

    fn control(driver: Arc<SimTelescope>) -> Arc<TelescopeControl> {
        let site = Site {
            latitude_deg: 45.0,
            longitude_deg: 11.0,
            height_m: 650.0,
        };
        TelescopeControl::new(driver, Arc::new(site), bounds(), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn polling_publishes_classified_reading() {
        let driver = SimTelescope::new(aa(0.0, 0.0), aa(10.0, 180.0));
        driver.set_pointing(aa(40.0, 100.0));
        let control = control(Arc::clone(&driver));

        control.polling_start().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let snap = control.snapshot();
        control.polling_end().await;

        assert_eq!(snap.status, TelescopeStatus::East);
        assert_eq!(snap.aa.unwrap().az, 100.0);
        assert!(snap.airmass.is_some());
        // polling_end resets everything
        assert_eq!(control.snapshot().status, TelescopeStatus::Disconnected);
        assert!(control.snapshot().aa.is_none());
    }

    #[tokio::test]
    async fn connection_failure_degrades_to_lost() {
        let driver = SimTelescope::new(aa(0.0, 0.0), aa(10.0, 180.0));
        driver.set_fail_connect(true);
        let control = control(Arc::clone(&driver));

        control.polling_start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(control.snapshot().status, TelescopeStatus::Lost);
        control.polling_end().await;
    }

    #[tokio::test]
    async fn jobs_run_in_queue_order() {
        let driver = SimTelescope::new(aa(0.0, 0.0), aa(10.0, 180.0));
        let control = control(Arc::clone(&driver));

        control.queue_park();
        control.queue_flat();
        control.queue_set_speed(TelescopeSpeed::Tracking);

        control.polling_start().await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        control.polling_end().await;

        let journal = driver.journal_entries();
        let ops: Vec<&str> = journal
            .iter()
            .map(String::as_str)
            .filter(|op| op.starts_with("telescope.") && !op.contains("connect"))
            .collect();
        assert_eq!(ops, ["telescope.park", "telescope.flat", "telescope.set_speed"]);
    }

    #[test]
    fn queue_set_speed_promotes_without_tracking_off() {
        let driver = SimTelescope::new(aa(0.0, 0.0), aa(10.0, 180.0));
        driver.set_has_tracking_off(false);
        let control = control(Arc::clone(&driver));

        control.queue_set_speed(TelescopeSpeed::NotTracking);
        let job = control.jobs_rx.lock().unwrap().try_recv().unwrap();
        match job {
            Job::SetSpeed { speed } => assert_eq!(speed, TelescopeSpeed::Tracking),
            other => panic!("unexpected job {:?}", other),
        }
    }

    #[test]
    fn park_sync_adds_sidereal_drift_when_not_tracking() {
        let driver = SimTelescope::new(aa(0.0, 0.0), aa(10.0, 180.0));
        let control = control(Arc::clone(&driver));

        let started_at = Utc::now();
        let later = started_at + chrono::Duration::minutes(90);

        let tracking = control.park_sync_coords(started_at, later);
        control
            .snapshot_tx
            .send_modify(|s| s.speed = TelescopeSpeed::NotTracking);
        let drifted = control.park_sync_coords(started_at, later);

        assert!((drifted.ra - tracking.ra - 1.5).abs() < 0.02);
        assert_eq!(drifted.dec, tracking.dec);
    }
}
