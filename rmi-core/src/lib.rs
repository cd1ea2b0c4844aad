//! Core library for the RMI weather fetcher.
//!
//! This crate defines:
//! - Configuration handling (`[station]` and `[rmi]` sections)
//! - The upstream client abstraction and the RMI app API client
//! - The [`Fetcher`], which turns one upstream round trip into an observation record
//! - The timed-loop [`Driver`] and host-event [`Service`] callers
//!
//! It is used by `rmi-cli`, but can also be embedded in other hosts.

pub mod config;
pub mod driver;
pub mod fetcher;
pub mod model;
pub mod provider;
pub mod service;

pub use config::{Config, ConfigError, FetcherConfig, StationConfig};
pub use driver::Driver;
pub use fetcher::{Fetcher, cloud_cover_bucket, rain_rate};
pub use model::{Coordinate, FieldMap, ForecastPoint, LoopPacket, ObservationRecord, RawWeather, UnitSystem};
pub use provider::{RmiService, WeatherService, WeatherSession};
pub use service::{Binding, HostEvent, MetricOnly, Service, UnitConverter};
