//! Weather severity evaluator.
//!
//! Seven readings from a station feed, each matched against three
//! configured bands. The overall verdict is the worst matched severity,
//! except that stale data must never assert a non-dangerous verdict: a
//! feed that has not produced a fresh observation within three times the
//! expiry window forces the overall status to `Unspecified`.

use crate::error::{DeviceError, DeviceResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Declaration order doubles as severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WeatherStatus {
    Unspecified,
    Normal,
    Warning,
    Danger,
}

/// The seven monitored readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    WindSpeed,
    WindGust,
    Temperature,
    Humidity,
    RainRate,
    Barometer,
    BarometerTrend,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::WindSpeed,
        Metric::WindGust,
        Metric::Temperature,
        Metric::Humidity,
        Metric::RainRate,
        Metric::Barometer,
        Metric::BarometerTrend,
    ];

    /// Key the station feed uses for this reading.
    pub fn key(self) -> &'static str {
        match self {
            Metric::WindSpeed => "windSpeed",
            Metric::WindGust => "windGust",
            Metric::Temperature => "outTemp",
            Metric::Humidity => "humidity",
            Metric::RainRate => "rainRate",
            Metric::Barometer => "barometer",
            Metric::BarometerTrend => "barometerTrend",
        }
    }
}

/// Inclusive value range.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    fn contains(self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// The three bands of one metric, tested in listed order; the first
/// match wins.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MetricBands {
    pub normal: Band,
    pub warning: Band,
    pub danger: Band,
}

impl MetricBands {
    pub fn severity(&self, value: f64) -> WeatherStatus {
        let bands = [
            (self.normal, WeatherStatus::Normal),
            (self.warning, WeatherStatus::Warning),
            (self.danger, WeatherStatus::Danger),
        ];
        for (band, severity) in bands {
            if band.contains(value) {
                return severity;
            }
        }
        WeatherStatus::Unspecified
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherThresholds {
    pub wind_speed: MetricBands,
    pub wind_gust: MetricBands,
    pub temperature: MetricBands,
    pub humidity: MetricBands,
    pub rain_rate: MetricBands,
    pub barometer: MetricBands,
    pub barometer_trend: MetricBands,
}

impl WeatherThresholds {
    fn for_metric(&self, metric: Metric) -> &MetricBands {
        match metric {
            Metric::WindSpeed => &self.wind_speed,
            Metric::WindGust => &self.wind_gust,
            Metric::Temperature => &self.temperature,
            Metric::Humidity => &self.humidity,
            Metric::RainRate => &self.rain_rate,
            Metric::Barometer => &self.barometer,
            Metric::BarometerTrend => &self.barometer_trend,
        }
    }
}

/// One sensor value as delivered by the feed.
#[derive(Debug, Clone)]
pub struct SensorReading {
    pub value: f64,
    pub unit: String,
}

/// One complete fetch from a feed.
#[derive(Debug, Clone)]
pub struct FeedObservation {
    pub readings: HashMap<String, SensorReading>,
    /// The station's own update instant, not the fetch instant.
    pub updated_at: DateTime<Utc>,
}

/// Station feed endpoint.
#[async_trait]
pub trait WeatherFeed: Send + Sync {
    async fn fetch(&self) -> DeviceResult<FeedObservation>;
}

/// HTTP station feed. The payload shape is
/// `{"current": {<name>: {"value": ..., "unit_of_measurement": ...}}, "time": ...}`
/// with comma decimals tolerated in values.
pub struct HttpWeatherFeed {
    client: reqwest::Client,
    url: String,
    time_format: String,
}

impl HttpWeatherFeed {
    pub fn new(url: impl Into<String>, time_format: impl Into<String>) -> Self {
        HttpWeatherFeed {
            client: reqwest::Client::new(),
            url: url.into(),
            time_format: time_format.into(),
        }
    }
}

#[async_trait]
impl WeatherFeed for HttpWeatherFeed {
    async fn fetch(&self) -> DeviceResult<FeedObservation> {
        let payload: Value = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_observation(&payload, &self.time_format)
    }
}

/// Units arrive HTML-escaped ("&#176;C"); decode the entities the
/// station emits.
fn decode_unit(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let decoded = match &tail[1..end] {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "deg" => Some('\u{b0}'),
            entity => entity
                .strip_prefix('#')
                .and_then(|digits| digits.parse::<u32>().ok())
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Decode a feed payload. Malformed individual sensors are dropped (the
/// N/A sentinel); a missing envelope is an error.
pub fn parse_observation(payload: &Value, time_format: &str) -> DeviceResult<FeedObservation> {
    let current = payload
        .get("current")
        .and_then(Value::as_object)
        .ok_or_else(|| DeviceError::MalformedFeed("missing current block".into()))?;
    let time = payload
        .get("time")
        .and_then(Value::as_str)
        .ok_or_else(|| DeviceError::MalformedFeed("missing time field".into()))?;
    let updated_at = NaiveDateTime::parse_from_str(time, time_format)
        .map_err(|e| DeviceError::MalformedFeed(format!("bad time '{}': {}", time, e)))?
        .and_utc();

    let mut readings = HashMap::new();
    for (name, sensor) in current {
        let value = match sensor.get("value") {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
            _ => None,
        };
        let Some(value) = value else {
            tracing::debug!(sensor = %name, "unreadable sensor value skipped");
            continue;
        };
        let unit = sensor
            .get("unit_of_measurement")
            .and_then(Value::as_str)
            .map(decode_unit)
            .unwrap_or_default()
            .trim()
            .to_string();
        readings.insert(name.clone(), SensorReading { value, unit });
    }

    Ok(FeedObservation {
        readings,
        updated_at,
    })
}

/// Per-metric evaluation detail for the response surface.
#[derive(Debug, Clone, Serialize)]
pub struct MetricReport {
    pub metric: Metric,
    pub value: Option<f64>,
    pub unit: String,
    pub severity: WeatherStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub status: WeatherStatus,
    pub metrics: Vec<MetricReport>,
    pub updated_at: Option<DateTime<Utc>>,
}

struct Cache {
    observation: Option<FeedObservation>,
    last_attempt: Option<Instant>,
}

pub struct WeatherMonitor {
    primary: Arc<dyn WeatherFeed>,
    fallback: Arc<dyn WeatherFeed>,
    thresholds: WeatherThresholds,
    expiry: Duration,
    /// Minimum spacing between fetch attempts, so a failing source is
    /// not hammered on every request.
    retry_interval: Duration,
    cache: Mutex<Cache>,
}

impl WeatherMonitor {
    pub fn new(
        primary: Arc<dyn WeatherFeed>,
        fallback: Arc<dyn WeatherFeed>,
        thresholds: WeatherThresholds,
        expiry: Duration,
        retry_interval: Duration,
    ) -> Self {
        WeatherMonitor {
            primary,
            fallback,
            thresholds,
            expiry,
            retry_interval,
            cache: Mutex::new(Cache {
                observation: None,
                last_attempt: None,
            }),
        }
    }

    /// Refresh if needed and evaluate all metrics.
    pub async fn evaluate(&self) -> WeatherReport {
        let mut cache = self.cache.lock().await;
        self.refresh(&mut cache).await;
        self.report(&cache)
    }

    /// Overall severity only.
    pub async fn status(&self) -> WeatherStatus {
        self.evaluate().await.status
    }

    async fn refresh(&self, cache: &mut Cache) {
        if !self.is_expired(cache) {
            return;
        }
        if let Some(at) = cache.last_attempt {
            if at.elapsed() < self.retry_interval {
                return;
            }
        }
        cache.last_attempt = Some(Instant::now());

        match self.primary.fetch().await {
            Ok(observation) => cache.observation = Some(observation),
            Err(err) => {
                tracing::error!(%err, "primary weather feed failed, trying fallback");
                match self.fallback.fetch().await {
                    Ok(observation) => cache.observation = Some(observation),
                    Err(err) => tracing::error!(%err, "fallback weather feed failed"),
                }
            }
        }
    }

    fn observation_age(cache: &Cache) -> Option<chrono::Duration> {
        cache
            .observation
            .as_ref()
            .map(|obs| Utc::now().signed_duration_since(obs.updated_at))
    }

    fn is_expired(&self, cache: &Cache) -> bool {
        match Self::observation_age(cache) {
            Some(age) => age >= chrono::Duration::from_std(self.expiry).unwrap_or_default(),
            None => true,
        }
    }

    /// No fresh observation within three expiry windows. Never fetched
    /// counts as unavailable too.
    fn is_unavailable(&self, cache: &Cache) -> bool {
        match Self::observation_age(cache) {
            Some(age) => age >= chrono::Duration::from_std(self.expiry * 3).unwrap_or_default(),
            None => true,
        }
    }

    fn report(&self, cache: &Cache) -> WeatherReport {
        let mut metrics = Vec::with_capacity(Metric::ALL.len());
        let mut overall = WeatherStatus::Unspecified;

        for metric in Metric::ALL {
            let reading = cache
                .observation
                .as_ref()
                .and_then(|obs| obs.readings.get(metric.key()));
            let severity = match reading {
                Some(reading) => self.thresholds.for_metric(metric).severity(reading.value),
                None => WeatherStatus::Unspecified,
            };
            overall = overall.max(severity);
            metrics.push(MetricReport {
                metric,
                value: reading.map(|r| r.value),
                unit: reading.map(|r| r.unit.clone()).unwrap_or_default(),
                severity,
            });
        }

        if self.is_unavailable(cache) {
            overall = WeatherStatus::Unspecified;
        }

        WeatherReport {
            status: overall,
            metrics,
            updated_at: cache.observation.as_ref().map(|obs| obs.updated_at),
        }
    }
}
