use crate::model::{Coordinate, ForecastPoint, RawWeather};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod rmi;

pub use rmi::RmiService;

/// Factory for upstream sessions. One session is opened per fetch.
#[async_trait]
pub trait WeatherService: Send + Sync + Debug {
    async fn open_session(&self) -> anyhow::Result<Box<dyn WeatherSession>>;
}

/// A short-lived connection to the upstream, released when dropped.
#[async_trait]
pub trait WeatherSession: Send {
    /// Request current conditions and forecast for `coordinate`.
    async fn refresh(&mut self, coordinate: Coordinate) -> anyhow::Result<()>;

    /// Current conditions from the last successful refresh.
    fn current_weather(&self) -> RawWeather;

    /// Radar precipitation forecast from the last successful refresh, ascending by time.
    fn radar_forecast(&self) -> Vec<ForecastPoint>;
}
