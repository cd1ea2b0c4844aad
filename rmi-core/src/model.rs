use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Source field name that selects cloud cover derivation instead of a direct copy.
pub const CONDITION_FIELD: &str = "condition";

/// Output key for the rain rate derived from the radar forecast.
pub const RAIN_RATE_FIELD: &str = "rainRate";

/// Output name -> RMI source name, used when no `field_map` is configured.
pub const DEFAULT_FIELD_MAP: &[(&str, &str)] = &[
    ("barometer", "pressure"),
    ("outTemp", "temperature"),
    ("windSpeed", "wind_speed"),
    ("windGust", "wind_speed_gust"),
    ("windDir", "wind_bearing"),
    ("cloudcover", CONDITION_FIELD),
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Mapping from output field name to upstream source field name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, String>);

impl FieldMap {
    pub fn defaults() -> Self {
        DEFAULT_FIELD_MAP.iter().copied().collect()
    }

    /// Merge `other` on top of this map; duplicate output names take the value from `other`.
    pub fn extend_with(&mut self, other: &FieldMap) {
        for (output, source) in other.iter() {
            self.0.insert(output.to_owned(), source.to_owned());
        }
    }

    pub fn insert(&mut self, output: impl Into<String>, source: impl Into<String>) {
        self.0.insert(output.into(), source.into());
    }

    pub fn get(&self, output: &str) -> Option<&str> {
        self.0.get(output).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Current conditions as returned by the upstream, keyed by source field name.
pub type RawWeather = HashMap<String, Value>;

/// One step of the radar precipitation forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    /// Precipitation in mm over the 10 minutes starting at `timestamp`.
    pub precipitation_10min: f64,
}

/// Result of one fetch: output field name -> raw upstream value.
///
/// Values are not coerced here; use [`ObservationRecord::get_as_float`] or
/// [`LoopPacket::from_record`] to get numbers.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct ObservationRecord(BTreeMap<String, Value>);

impl ObservationRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Numeric value of `name`, or `None` if it is absent, null or not a number.
    pub fn get_as_float(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(|v| value_as_float(name, v))
    }
}

/// Best-effort numeric coercion. Parse failures are logged and yield `None`.
pub fn value_as_float(name: &str, value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(e) => {
                error!("cannot read value '{s}' for '{name}': {e}");
                None
            }
        },
        other => {
            error!("cannot read value '{other}' for '{name}': not a number");
            None
        }
    }
}

/// Unit system tag carried by every packet, using the host's numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitSystem {
    Us,
    Metric,
    MetricWx,
}

impl UnitSystem {
    pub const fn code(self) -> u8 {
        match self {
            UnitSystem::Us => 0x01,
            UnitSystem::Metric => 0x10,
            UnitSystem::MetricWx => 0x11,
        }
    }
}

impl Serialize for UnitSystem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// Record handed to the host: timestamp, unit tag and nullable floats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopPacket {
    #[serde(rename = "dateTime")]
    pub date_time: i64,
    #[serde(rename = "usUnits")]
    pub us_units: UnitSystem,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl LoopPacket {
    pub fn new(date_time: i64, us_units: UnitSystem) -> Self {
        Self { date_time, us_units, values: BTreeMap::new() }
    }

    pub fn from_record(record: &ObservationRecord, date_time: i64, us_units: UnitSystem) -> Self {
        let mut packet = Self::new(date_time, us_units);
        packet.merge_record(record);
        packet
    }

    /// Coerce every record entry and write it into the packet, replacing existing keys.
    pub fn merge_record(&mut self, record: &ObservationRecord) {
        for (name, value) in record.iter() {
            self.values.insert(name.to_owned(), value_as_float(name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }
}
