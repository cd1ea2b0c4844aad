//! Timed-loop caller: fetch, stamp, hand over, sleep, repeat.

use std::ops::ControlFlow;

use chrono::Utc;
use log::debug;

use crate::{
    fetcher::Fetcher,
    model::{LoopPacket, UnitSystem},
};

pub const HARDWARE_NAME: &str = "RMI";

#[derive(Debug, Clone)]
pub struct Driver {
    fetcher: Fetcher,
}

impl Driver {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    pub fn hardware_name(&self) -> &'static str {
        HARDWARE_NAME
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Run one fetch and turn it into a metric packet stamped with the current time.
    ///
    /// A failed fetch still produces a packet, with only `dateTime` and `usUnits`.
    pub async fn next_packet(&self) -> LoopPacket {
        let record = self.fetcher.fetch().await;
        LoopPacket::from_record(&record, Utc::now().timestamp(), UnitSystem::Metric)
    }

    /// Emit packets to `sink` every `poll_interval` seconds until it returns `Break`.
    pub async fn run<F>(&self, mut sink: F)
    where
        F: FnMut(LoopPacket) -> ControlFlow<()>,
    {
        let interval = self.fetcher.poll_interval();
        loop {
            let packet = self.next_packet().await;
            if sink(packet).is_break() {
                debug!("driver loop stopped by caller");
                return;
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FetcherConfig,
        fetcher::tests::{FakeService, init_logging, weather},
        provider::WeatherService,
    };
    use serde_json::json;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn driver(service: FakeService) -> Driver {
        init_logging();
        let config = FetcherConfig { poll_interval: Some(0.01.into()), ..FetcherConfig::for_coordinate(51.0, 3.7) };
        let service: Arc<dyn WeatherService> = Arc::new(service);
        Driver::new(Fetcher::new(&config, service).expect("valid config"))
    }

    #[tokio::test]
    async fn packet_is_metric_and_coerced() {
        let d = driver(FakeService {
            weather: weather(&[
                ("temperature", json!("21.5")),
                ("pressure", json!("not a number")),
                ("condition", json!("clear-night")),
            ]),
            ..Default::default()
        });

        let before = Utc::now().timestamp();
        let packet = d.next_packet().await;

        assert_eq!(packet.us_units, UnitSystem::Metric);
        assert!(packet.date_time >= before);
        assert_eq!(packet.get("outTemp"), Some(21.5));
        assert_eq!(packet.values.get("barometer"), Some(&None));
        assert_eq!(packet.get("cloudcover"), Some(0.0));
    }

    #[tokio::test]
    async fn failed_fetch_yields_bare_packet() {
        let d = driver(FakeService { fail_refresh: true, ..Default::default() });

        let packet = d.next_packet().await;
        assert!(packet.values.is_empty());
        assert_eq!(packet.us_units, UnitSystem::Metric);
    }

    #[tokio::test]
    async fn run_stops_when_sink_breaks() {
        let opened = Arc::new(AtomicUsize::new(0));
        let d = driver(FakeService { opened: Arc::clone(&opened), ..Default::default() });

        let mut packets = Vec::new();
        d.run(|packet| {
            packets.push(packet);
            if packets.len() == 3 { ControlFlow::Break(()) } else { ControlFlow::Continue(()) }
        })
        .await;

        assert_eq!(packets.len(), 3);
        assert_eq!(opened.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn hardware_name_is_rmi() {
        let d = driver(FakeService::default());
        assert_eq!(d.hardware_name(), "RMI");
    }
}
