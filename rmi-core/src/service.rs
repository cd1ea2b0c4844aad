//! Host-event caller: augments the host's loop packets or archive records
//! with freshly fetched RMI data.

use std::{fmt, str::FromStr, sync::Arc};

use log::{info, warn};

use crate::{
    config::{ConfigError, FetcherConfig},
    fetcher::Fetcher,
    model::{LoopPacket, ObservationRecord, UnitSystem},
    provider::WeatherService,
};

/// Host lifecycle event that triggers a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding {
    #[default]
    Loop,
    Archive,
}

impl FromStr for Binding {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loop" => Ok(Binding::Loop),
            "archive" => Ok(Binding::Archive),
            other => Err(ConfigError::UnknownBinding(other.to_string())),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Binding::Loop => "loop",
            Binding::Archive => "archive",
        })
    }
}

/// Events the host delivers to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    NewLoopPacket,
    NewArchiveRecord,
}

impl HostEvent {
    fn binding(self) -> Binding {
        match self {
            HostEvent::NewLoopPacket => Binding::Loop,
            HostEvent::NewArchiveRecord => Binding::Archive,
        }
    }
}

/// Converts a metric record into the host packet's unit system.
///
/// Conversion tables belong to the host; it injects them through this trait.
pub trait UnitConverter: Send + Sync + fmt::Debug {
    /// `None` when the target unit system is not supported.
    fn convert(&self, record: ObservationRecord, target: UnitSystem) -> Option<ObservationRecord>;
}

/// Passes metric records through unchanged and refuses every other target.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricOnly;

impl UnitConverter for MetricOnly {
    fn convert(&self, record: ObservationRecord, target: UnitSystem) -> Option<ObservationRecord> {
        (target == UnitSystem::Metric).then_some(record)
    }
}

#[derive(Debug)]
pub struct Service {
    fetcher: Fetcher,
    binding: Binding,
    enabled: bool,
    converter: Arc<dyn UnitConverter>,
}

impl Service {
    pub fn new(config: &FetcherConfig, service: Arc<dyn WeatherService>) -> Result<Self, ConfigError> {
        Self::with_converter(config, service, Arc::new(MetricOnly))
    }

    pub fn with_converter(
        config: &FetcherConfig,
        service: Arc<dyn WeatherService>,
        converter: Arc<dyn UnitConverter>,
    ) -> Result<Self, ConfigError> {
        let fetcher = Fetcher::new(config, service)?;
        let enabled = config.is_enabled();
        if !enabled {
            info!("RMI service not enabled");
            return Ok(Self { fetcher, binding: Binding::default(), enabled, converter });
        }

        let binding = config.binding()?;
        info!("RMI service bound to {binding} events");

        Ok(Self { fetcher, binding, enabled, converter })
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Handle one host event, merging fresh data into `packet` when this service is bound to it.
    ///
    /// Returns whether the packet was touched.
    pub async fn handle(&self, event: HostEvent, packet: &mut LoopPacket) -> bool {
        if !self.enabled || event.binding() != self.binding {
            return false;
        }

        let record = self.fetcher.fetch().await;
        let Some(converted) = self.converter.convert(record, packet.us_units) else {
            warn!("cannot convert RMI data to unit system {:?}, skipping", packet.us_units);
            return false;
        };

        packet.merge_record(&converted);
        true
    }
}
