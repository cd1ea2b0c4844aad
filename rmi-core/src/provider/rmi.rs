//! Client for the app API of the Royal Meteorological Institute of Belgium.
//!
//! Only locations inside the Benelux are covered. One `getForecasts` call
//! returns both the current observation and the radar precipitation sequence.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Timelike, Utc};
use log::{debug, warn};
use md5::{Digest, Md5};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::model::{CONDITION_FIELD, Coordinate, ForecastPoint, RawWeather};

use super::{WeatherService, WeatherSession};

const BASE_URL: &str = "https://app.meteo.be/services/appv4/";
const KEY_SALT: &str = "r9EnW374jkJ9acc";
const METHOD: &str = "getForecasts";

#[derive(Debug, Clone)]
pub struct RmiService {
    base_url: String,
    user_agent: String,
}

impl RmiService {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self { base_url: BASE_URL.to_string(), user_agent: user_agent.into() }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl WeatherService for RmiService {
    async fn open_session(&self) -> Result<Box<dyn WeatherSession>> {
        let http = Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client for RMI")?;

        debug!("opened RMI session");
        Ok(Box::new(RmiSession { http, base_url: self.base_url.clone(), data: None }))
    }
}

pub struct RmiSession {
    http: Client,
    base_url: String,
    data: Option<RmiResponse>,
}

impl RmiSession {
    fn load_body(&mut self, body: &str) -> Result<()> {
        let parsed: RmiResponse =
            serde_json::from_str(body).context("Failed to parse RMI forecast JSON")?;
        self.data = Some(parsed);
        Ok(())
    }

    /// Current conditions as seen at `now`; hourly fields come from the entry for the current local hour.
    fn weather_at(&self, now: DateTime<Utc>) -> RawWeather {
        let mut weather = RawWeather::new();
        let Some(data) = &self.data else {
            return weather;
        };

        let night = data.obs.day_night.as_deref() == Some("n");
        let condition = data
            .obs
            .ww
            .as_ref()
            .and_then(weather_code)
            .and_then(|code| condition_from_code(code, night));

        weather.insert("temperature".into(), data.obs.temp.clone());
        weather.insert(CONDITION_FIELD.into(), condition.map(Value::from).unwrap_or(Value::Null));

        let hour = data.current_hour(now);
        let hourly = |value: Option<&Value>| value.cloned().unwrap_or(Value::Null);
        weather.insert("pressure".into(), hourly(hour.map(|h| &h.pressure)));
        weather.insert("wind_speed".into(), hourly(hour.map(|h| &h.wind_speed_km)));
        weather.insert("wind_speed_gust".into(), hourly(hour.map(|h| &h.wind_peak_speed_km)));
        weather.insert("wind_bearing".into(), hourly(hour.map(|h| &h.wind_direction)));
        weather.insert("precipitation_probability".into(), hourly(hour.map(|h| &h.precip_chance)));
        weather.insert("native_precipitation".into(), hourly(hour.map(|h| &h.precip_quantity)));

        if let Some(uv) = data.module.iter().find(|m| m.kind == "uv") {
            weather.insert("uv_index".into(), uv.data.get("levelValue").cloned().unwrap_or_default());
        }

        weather
    }
}

impl Drop for RmiSession {
    fn drop(&mut self) {
        debug!("closed RMI session");
    }
}

#[async_trait]
impl WeatherSession for RmiSession {
    async fn refresh(&mut self, coordinate: Coordinate) -> Result<()> {
        let key = api_key(METHOD, Local::now().date_naive());
        let lat = coordinate.latitude.to_string();
        let long = coordinate.longitude.to_string();

        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("s", METHOD),
                ("k", key.as_str()),
                ("lat", lat.as_str()),
                ("long", long.as_str()),
            ])
            .send()
            .await
            .context("Failed to send request to RMI")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read RMI response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "RMI request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        self.load_body(&body)
    }

    fn current_weather(&self) -> RawWeather {
        self.weather_at(Utc::now())
    }

    fn radar_forecast(&self) -> Vec<ForecastPoint> {
        let Some(animation) = self.data.as_ref().and_then(|d| d.animation.as_ref()) else {
            return Vec::new();
        };

        let mut points: Vec<ForecastPoint> = animation
            .sequence
            .iter()
            .filter_map(|frame| match DateTime::parse_from_rfc3339(&frame.time) {
                Ok(ts) => Some(ForecastPoint {
                    timestamp: ts.with_timezone(&Utc),
                    precipitation_10min: frame.value.unwrap_or(0.0),
                }),
                Err(e) => {
                    warn!("skipping radar frame with bad time '{}': {e}", frame.time);
                    None
                }
            })
            .collect();

        points.sort_by_key(|p| p.timestamp);
        points
    }
}

/// Daily rotating key expected by the app API: md5 of salt, method and date.
fn api_key(method: &str, date: NaiveDate) -> String {
    let input = format!("{KEY_SALT};{method};{}", date.format("%d/%m/%Y"));
    hex::encode(Md5::digest(input.as_bytes()))
}

fn weather_code(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map an RMI `ww` weather code to a condition name.
fn condition_from_code(code: u32, night: bool) -> Option<&'static str> {
    let condition = match code {
        0 | 1 if night => "clear-night",
        0 | 1 => "sunny",
        3 => "partlycloudy",
        14 | 15 => "cloudy",
        2 | 5 | 7 | 10 | 13 | 17 => "lightning-rainy",
        4 | 6 | 16 | 19 => "pouring",
        18 | 21 => "rainy",
        8 | 9 | 20 => "snowy-rainy",
        11 | 12 | 22 | 23 => "snowy",
        24..=27 => "fog",
        _ => return None,
    };
    Some(condition)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct RmiObservation {
    #[serde(default)]
    temp: Value,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    ww: Option<Value>,
    #[serde(rename = "dayNight", default)]
    day_night: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RmiHourly {
    #[serde(default)]
    hour: Value,
    #[serde(default)]
    pressure: Value,
    #[serde(rename = "windSpeedKm", default)]
    wind_speed_km: Value,
    #[serde(rename = "windPeakSpeedKm", default)]
    wind_peak_speed_km: Value,
    #[serde(rename = "windDirection", default)]
    wind_direction: Value,
    #[serde(rename = "precipChance", default)]
    precip_chance: Value,
    #[serde(rename = "precipQuantity", default)]
    precip_quantity: Value,
}

#[derive(Debug, Default, Deserialize)]
struct RmiForecast {
    #[serde(default)]
    hourly: Vec<RmiHourly>,
}

#[derive(Debug, Deserialize)]
struct RmiModule {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct RmiRadarFrame {
    time: String,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RmiAnimation {
    #[serde(default)]
    sequence: Vec<RmiRadarFrame>,
}

#[derive(Debug, Deserialize)]
struct RmiResponse {
    obs: RmiObservation,
    #[serde(rename = "for", default)]
    forecast: RmiForecast,
    #[serde(default)]
    module: Vec<RmiModule>,
    #[serde(default)]
    animation: Option<RmiAnimation>,
}

impl RmiResponse {
    /// Hourly entry for the wall-clock hour of `now`, in the observation's UTC offset.
    ///
    /// `None` when no entry covers that hour.
    fn current_hour(&self, now: DateTime<Utc>) -> Option<&RmiHourly> {
        let local_hour = match self.obs.timestamp.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(ts)) => now.with_timezone(ts.offset()).hour(),
            _ => now.with_timezone(&Local).hour(),
        };

        self.forecast.hourly.iter().find(|e| weather_code(&e.hour) == Some(local_hour))
    }
}
