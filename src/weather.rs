//! Weather lookup for the event date and location.
//!
//! Lookups never fail from the caller's point of view: any problem degrades to
//! [`WeatherSnapshot::default`] with a warning.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::simulation::types::{WeatherCondition, WeatherSnapshot};

pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.open-meteo.com/v1";

/// Temperatures at or above this are reported as extreme heat.
pub const EXTREME_HEAT_CELSIUS: f64 = 35.0;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Forecast at `(lat, lng)` for an ISO-ish local timestamp.
    async fn weather_at(&self, lat: f64, lng: f64, timestamp: &str) -> WeatherSnapshot;
}

/// Always returns the same snapshot. Used when lookups are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticWeather(pub WeatherSnapshot);

#[async_trait]
impl WeatherProvider for StaticWeather {
    async fn weather_at(&self, _lat: f64, _lng: f64, _timestamp: &str) -> WeatherSnapshot {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("unrecognised timestamp: {0:?}")]
    InvalidTimestamp(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("forecast missing value for hour {0}")]
    MissingValue(usize),
}

/// Map a WMO weather interpretation code. Unknown codes read as cloudy.
pub fn condition_for_wmo(code: i64) -> WeatherCondition {
    match code {
        0 | 1 => WeatherCondition::Clear,
        2 | 3 | 45 | 48 => WeatherCondition::Cloudy,
        51 | 53 | 55 | 56 | 57 | 61 | 63 | 66 | 80 | 81 => WeatherCondition::Rain,
        65 | 67 | 82 => WeatherCondition::HeavyRain,
        71 | 73 | 75 | 77 | 85 | 86 => WeatherCondition::Snow,
        95 | 96 | 99 => WeatherCondition::Storm,
        _ => WeatherCondition::Cloudy,
    }
}

/// Date and hour of an ISO-ish timestamp. Offsets are ignored; the wall-clock hour is kept.
pub fn parse_lookup_time(timestamp: &str) -> Option<(NaiveDate, u32)> {
    let ts = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        let local = dt.naive_local();
        return Some((local.date(), local.hour()));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(ts, fmt) {
            return Some((dt.date(), dt.hour()));
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .map(|d| (d, 0))
}

#[derive(Debug, Default, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    hourly: HourlySeries,
}

#[derive(Debug, Default, Deserialize)]
struct HourlySeries {
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    weathercode: Vec<Option<i64>>,
}

impl HourlySeries {
    /// Snapshot at `hour`, clamped to the last available entry.
    fn snapshot_at(&self, hour: usize) -> Result<WeatherSnapshot, WeatherError> {
        let temperature = pick(&self.temperature_2m, hour, 20.0)?;
        let precipitation = pick(&self.precipitation_probability, hour, 0.0)?;
        let code = pick(&self.weathercode, hour, 0)?;

        let condition = if temperature >= EXTREME_HEAT_CELSIUS {
            WeatherCondition::ExtremeHeat
        } else {
            condition_for_wmo(code)
        };
        Ok(WeatherSnapshot {
            temperature_celsius: temperature,
            precipitation_probability: precipitation,
            condition,
        })
    }
}

/// Empty series yield `empty`; a null at the chosen hour is an error.
fn pick<T: Copy>(series: &[Option<T>], hour: usize, empty: T) -> Result<T, WeatherError> {
    if series.is_empty() {
        return Ok(empty);
    }
    let idx = hour.min(series.len() - 1);
    series[idx].ok_or(WeatherError::MissingValue(idx))
}

/// Open-Meteo hourly forecast client.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenMeteoClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Base URL from `FLOWGUARD_WEATHER_BASE_URL`, else Open-Meteo.
    pub fn from_env() -> Result<Self, WeatherError> {
        let base_url = std::env::var("FLOWGUARD_WEATHER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_WEATHER_BASE_URL.into());
        Self::new(base_url)
    }

    fn forecast_url(&self) -> String {
        format!("{}/forecast", self.base_url.trim_end_matches('/'))
    }

    pub async fn fetch(
        &self,
        lat: f64,
        lng: f64,
        timestamp: &str,
    ) -> Result<WeatherSnapshot, WeatherError> {
        let (date, hour) = parse_lookup_time(timestamp)
            .ok_or_else(|| WeatherError::InvalidTimestamp(timestamp.to_string()))?;
        let date = date.format("%Y-%m-%d").to_string();
        debug!(%date, lat, lng, "fetching forecast");

        let forecast: ForecastResponse = self
            .client
            .get(self.forecast_url())
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lng.to_string()),
                (
                    "hourly",
                    "temperature_2m,precipitation_probability,weathercode".to_string(),
                ),
                ("start_date", date.clone()),
                ("end_date", date),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        forecast.hourly.snapshot_at(hour as usize)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    async fn weather_at(&self, lat: f64, lng: f64, timestamp: &str) -> WeatherSnapshot {
        match self.fetch(lat, lng, timestamp).await {
            Ok(w) => {
                info!(
                    temperature_celsius = w.temperature_celsius,
                    precipitation_probability = w.precipitation_probability,
                    condition = w.condition.as_str(),
                    "fetched weather"
                );
                w
            }
            Err(e) => {
                warn!(error = %e, "weather lookup failed; using defaults");
                WeatherSnapshot::default()
            }
        }
    }
}
