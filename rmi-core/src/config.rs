use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use crate::{
    model::{Coordinate, FieldMap},
    service::Binding,
};

pub const DEFAULT_POLL_INTERVAL: f64 = 60.0;
pub const DEFAULT_USER_AGENT: &str = "rmi-weather fetcher";

/// Errors raised while turning configuration into a fetcher or service.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("'{0}' is not configured and the station has no location to fall back on")]
    MissingOption(&'static str),

    #[error("'{option}' must be a number, got '{value}'")]
    InvalidNumber { option: &'static str, value: String },

    #[error("'poll_interval' must be a positive number of seconds, got {0}")]
    InvalidPollInterval(f64),

    #[error("Unknown binding: {0}")]
    UnknownBinding(String),
}

/// A numeric option that may be written either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigNumber {
    Number(f64),
    Text(String),
}

impl ConfigNumber {
    pub fn to_f64(&self, option: &'static str) -> Result<f64, ConfigError> {
        match self {
            ConfigNumber::Number(v) => Ok(*v),
            ConfigNumber::Text(s) => s.trim().parse().map_err(|_| ConfigError::InvalidNumber {
                option,
                value: s.clone(),
            }),
        }
    }
}

impl From<f64> for ConfigNumber {
    fn from(value: f64) -> Self {
        ConfigNumber::Number(value)
    }
}

impl From<&str> for ConfigNumber {
    fn from(value: &str) -> Self {
        ConfigNumber::Text(value.to_owned())
    }
}

/// Location of the host station, used when `[rmi]` has no coordinate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// The `[rmi]` section: everything the fetcher, driver and service read.
///
/// Example TOML:
/// ```toml
/// [rmi]
/// poll_interval = 60
/// latitude = 50.85
/// longitude = 4.35
/// binding = "loop"
///
/// [rmi.field_map_extensions]
/// UV = "uv_index"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<ConfigNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<ConfigNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<ConfigNumber>,
    /// Replaces the built-in field map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_map: Option<FieldMap>,
    /// Merged on top of whichever field map is in effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_map_extensions: Option<FieldMap>,
    /// Service mode only: "loop" or "archive".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<String>,
    /// Service mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl FetcherConfig {
    pub fn for_coordinate(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude.into()),
            longitude: Some(longitude.into()),
            ..Self::default()
        }
    }

    /// Fill in latitude/longitude from the station when they are not set here.
    pub fn with_station_location(mut self, station: &StationConfig) -> Self {
        if self.latitude.is_none() {
            self.latitude = station.latitude.map(ConfigNumber::from);
        }
        if self.longitude.is_none() {
            self.longitude = station.longitude.map(ConfigNumber::from);
        }
        self
    }

    /// Validated poll interval; must be positive and representable as a `Duration`.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        let secs = match &self.poll_interval {
            Some(v) => v.to_f64("poll_interval")?,
            None => DEFAULT_POLL_INTERVAL,
        };
        if secs <= 0.0 {
            return Err(ConfigError::InvalidPollInterval(secs));
        }
        Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidPollInterval(secs))
    }

    pub fn coordinate(&self) -> Result<Coordinate, ConfigError> {
        let latitude = self
            .latitude
            .as_ref()
            .ok_or(ConfigError::MissingOption("latitude"))?
            .to_f64("latitude")?;
        let longitude = self
            .longitude
            .as_ref()
            .ok_or(ConfigError::MissingOption("longitude"))?
            .to_f64("longitude")?;
        Ok(Coordinate { latitude, longitude })
    }

    /// `field_map` (or the defaults) with `field_map_extensions` merged on top.
    pub fn effective_field_map(&self) -> FieldMap {
        let mut map = self.field_map.clone().unwrap_or_else(FieldMap::defaults);
        if let Some(ext) = &self.field_map_extensions {
            map.extend_with(ext);
        }
        map
    }

    pub fn binding(&self) -> Result<Binding, ConfigError> {
        match &self.binding {
            Some(s) => s.parse(),
            None => Ok(Binding::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enable.unwrap_or(true)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub rmi: FetcherConfig,
}

impl Config {
    /// The `[rmi]` section with the station location applied as fallback.
    pub fn fetcher_config(&self) -> FetcherConfig {
        self.rmi.clone().with_station_location(&self.station)
    }

    /// Load config from the default location, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("be", "rmi-weather", "rmi")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_defaults_to_sixty_seconds() {
        let cfg = FetcherConfig::default();
        assert_eq!(cfg.poll_interval(), Ok(Duration::from_secs(60)));
    }

    #[test]
    fn poll_interval_accepts_strings() {
        let cfg = FetcherConfig { poll_interval: Some("2".into()), ..Default::default() };
        assert_eq!(cfg.poll_interval(), Ok(Duration::from_secs(2)));
    }

    #[test]
    fn poll_interval_rejects_zero() {
        let cfg = FetcherConfig { poll_interval: Some(0.0.into()), ..Default::default() };
        assert_eq!(cfg.poll_interval(), Err(ConfigError::InvalidPollInterval(0.0)));
    }

    #[test]
    fn poll_interval_rejects_values_too_large_for_duration() {
        let cfg = FetcherConfig { poll_interval: Some(1e30.into()), ..Default::default() };
        assert_eq!(cfg.poll_interval(), Err(ConfigError::InvalidPollInterval(1e30)));

        let cfg = FetcherConfig { poll_interval: Some("inf".into()), ..Default::default() };
        assert!(matches!(cfg.poll_interval(), Err(ConfigError::InvalidPollInterval(_))));

        let cfg = FetcherConfig { poll_interval: Some("NaN".into()), ..Default::default() };
        assert!(matches!(cfg.poll_interval(), Err(ConfigError::InvalidPollInterval(_))));
    }

    #[test]
    fn fractional_poll_interval_is_kept() {
        let cfg = FetcherConfig { poll_interval: Some(0.5.into()), ..Default::default() };
        assert_eq!(cfg.poll_interval(), Ok(Duration::from_millis(500)));
    }

    #[test]
    fn coordinate_errors_when_missing() {
        let cfg = FetcherConfig { latitude: Some(50.0.into()), ..Default::default() };
        assert_eq!(cfg.coordinate(), Err(ConfigError::MissingOption("longitude")));
    }

    #[test]
    fn coordinate_errors_when_not_numeric() {
        let cfg = FetcherConfig {
            latitude: Some("north".into()),
            longitude: Some(4.0.into()),
            ..Default::default()
        };
        let err = cfg.coordinate().unwrap_err();
        assert!(err.to_string().contains("'latitude' must be a number"));
    }

    #[test]
    fn station_location_fills_missing_coordinate_only() {
        let station = StationConfig { latitude: Some(51.0), longitude: Some(3.7) };
        let cfg = FetcherConfig { latitude: Some("50.5".into()), ..Default::default() }
            .with_station_location(&station);

        let coord = cfg.coordinate().expect("coordinate must resolve");
        assert_eq!(coord, Coordinate { latitude: 50.5, longitude: 3.7 });
    }

    #[test]
    fn field_map_replaces_then_extensions_merge() {
        let cfg = FetcherConfig {
            field_map: Some([("extraTemp1", "temperature")].into_iter().collect()),
            field_map_extensions: Some([("UV", "uv_index")].into_iter().collect()),
            ..Default::default()
        };
        let map = cfg.effective_field_map();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("extraTemp1"), Some("temperature"));
        assert_eq!(map.get("UV"), Some("uv_index"));
        assert_eq!(map.get("outTemp"), None);
    }

    #[test]
    fn parses_toml_with_string_and_numeric_values() {
        let cfg = Config::from_toml(
            r#"
            [station]
            latitude = 51.05
            longitude = 3.72

            [rmi]
            poll_interval = "30"
            binding = "archive"
            enable = false

            [rmi.field_map_extensions]
            outTemp = "feels_like"
            "#,
        )
        .expect("config must parse");

        let rmi = cfg.fetcher_config();
        assert_eq!(rmi.poll_interval(), Ok(Duration::from_secs(30)));
        assert_eq!(rmi.coordinate(), Ok(Coordinate { latitude: 51.05, longitude: 3.72 }));
        assert_eq!(rmi.binding(), Ok(Binding::Archive));
        assert!(!rmi.is_enabled());
        assert_eq!(rmi.effective_field_map().get("outTemp"), Some("feels_like"));
    }

    #[test]
    fn unknown_binding_is_an_error() {
        let cfg = FetcherConfig { binding: Some("hourly".into()), ..Default::default() };
        assert_eq!(cfg.binding(), Err(ConfigError::UnknownBinding("hourly".into())));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("rmi-config-test-{}", std::process::id()));
        let path = dir.join("config.toml");

        let mut cfg = Config::default();
        cfg.rmi = FetcherConfig::for_coordinate(50.85, 4.35);
        cfg.save_to(&path).expect("save must succeed");

        let loaded = Config::load_from(&path).expect("load must succeed");
        assert_eq!(loaded, cfg);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join("rmi-config-test-does-not-exist.toml");
        let cfg = Config::load_from(&path).expect("missing file is not an error");
        assert_eq!(cfg, Config::default());
    }
}
