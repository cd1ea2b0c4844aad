//! Fetch orchestration and normalization.
//!
//! A [`Fetcher`] performs exactly one upstream round trip per [`Fetcher::fetch`]
//! call and never keeps state between calls.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use log::{error, info};
use serde_json::Value;

use crate::{
    config::{ConfigError, FetcherConfig},
    model::{CONDITION_FIELD, Coordinate, FieldMap, ForecastPoint, ObservationRecord, RAIN_RATE_FIELD},
    provider::WeatherService,
};

#[derive(Debug, Clone)]
pub struct Fetcher {
    coordinate: Coordinate,
    poll_interval: Duration,
    field_map: FieldMap,
    service: Arc<dyn WeatherService>,
}

impl Fetcher {
    pub fn new(config: &FetcherConfig, service: Arc<dyn WeatherService>) -> Result<Self, ConfigError> {
        let poll_interval = config.poll_interval()?;
        let coordinate = config.coordinate()?;
        let field_map = config.effective_field_map();

        info!("Polling interval is {}", poll_interval.as_secs_f64());
        info!("Latitude is {}", coordinate.latitude);
        info!("Longitude is {}", coordinate.longitude);

        Ok(Self { coordinate, poll_interval, field_map, service })
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Time between fetches when driven by a timed loop.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Fetch and normalize one observation record.
    ///
    /// Upstream failures are logged and yield an empty record.
    pub async fn fetch(&self) -> ObservationRecord {
        let mut session = match self.service.open_session().await {
            Ok(session) => session,
            Err(e) => {
                error!("Error connecting to RMI api: {e:#}");
                return ObservationRecord::new();
            }
        };

        if let Err(e) = session.refresh(self.coordinate).await {
            error!("Error connecting to RMI api: {e:#}");
            return ObservationRecord::new();
        }

        let weather = session.current_weather();
        let forecast = session.radar_forecast();
        drop(session);

        let mut record = ObservationRecord::new();
        for (output, source) in self.field_map.iter() {
            if source == CONDITION_FIELD {
                let condition = weather.get(source).and_then(Value::as_str);
                record.insert(output, cloud_cover_bucket(condition));
                continue;
            }
            record.insert(output, weather.get(source).cloned().unwrap_or(Value::Null));
        }

        if let Some(rate) = rain_rate(&forecast, Utc::now()) {
            record.insert(RAIN_RATE_FIELD, rate);
        }

        record
    }
}

/// Coarse cloud cover percentage from a condition name: 0, 50 or 100.
pub fn cloud_cover_bucket(condition: Option<&str>) -> u8 {
    match condition {
        Some("sunny" | "clear-night") => 0,
        Some("cloudy") => 50,
        _ => 100,
    }
}

/// Hourly rain rate from the 10-minute radar forecast.
///
/// Uses the last point at or before `now`. When every point is in the past
/// the last point is used; when the first point is already in the future, the
/// first point is used. `None` for an empty forecast.
pub fn rain_rate(forecast: &[ForecastPoint], now: DateTime<Utc>) -> Option<f64> {
    let mut prev = forecast.first()?;
    for point in forecast {
        if point.timestamp > now {
            break;
        }
        prev = point;
    }
    Some(prev.precipitation_10min * 6.0)
}
