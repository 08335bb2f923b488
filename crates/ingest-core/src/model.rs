use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::Duration;
use uuid::Uuid;

use crate::time::Instant;

/// Maximum future drift allowed between device-supplied `effective_time`
/// and broker-receive `received_time` before clamping (spec §3.1).
pub const MAX_FUTURE_DRIFT: Duration = Duration::hours(24);
/// Maximum past drift allowed before clamping (spec §3.1).
pub const MAX_PAST_DRIFT: Duration = Duration::days(30);
/// Maximum MQTT payload size; larger payloads are rejected (spec §6.1).
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceVendor {
    Ava4,
    Kati,
    Qube,
}

impl SourceVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ava4 => "ava4",
            Self::Kati => "kati",
            Self::Qube => "qube",
        }
    }
}

impl std::fmt::Display for SourceVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubDeviceKind {
    Bp,
    Glucose,
    Spo2,
    Temp,
    Weight,
    Chol,
    Ua,
    Salt,
    Steps,
    Sleep,
    Location,
    DeviceStatus,
    Fall,
    Sos,
    BatchVitals,
}

impl SubDeviceKind {
    /// True for the AVA4 BLE sub-device kinds that carry a `sub_device_mac`
    /// (spec §3.1 invariant).
    pub fn is_ava4_sub_device(&self) -> bool {
        matches!(
            self,
            Self::Bp | Self::Glucose | Self::Spo2 | Self::Temp | Self::Weight | Self::Chol | Self::Ua | Self::Salt
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bp => "bp",
            Self::Glucose => "glucose",
            Self::Spo2 => "spo2",
            Self::Temp => "temp",
            Self::Weight => "weight",
            Self::Chol => "chol",
            Self::Ua => "ua",
            Self::Salt => "salt",
            Self::Steps => "steps",
            Self::Sleep => "sleep",
            Self::Location => "location",
            Self::DeviceStatus => "device_status",
            Self::Fall => "fall",
            Self::Sos => "sos",
            Self::BatchVitals => "batch_vitals",
        }
    }
}

impl std::fmt::Display for SubDeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single canonical value, as extracted and range-checked by the
/// classifier (spec §3.3). Kept as a tagged enum rather than bare JSON so
/// the projector and history router don't have to re-sniff types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Bool(bool),
    Object(serde_json::Value),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Sparse canonical key/value map for one sample (spec §3.3).
pub type Values = BTreeMap<String, Value>;

/// One element of a `batch_vitals` sequence: an independent sample sharing
/// the envelope's identity but carrying its own effective time and values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSample {
    pub effective_time: Instant,
    pub kind: SubDeviceKind,
    pub values: Values,
}

/// The canonical internal record produced by the classifier (C3) and
/// carried through identity resolution, history append, and FHIR
/// projection (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalObservation {
    pub ingest_id: Uuid,
    pub source_vendor: SourceVendor,
    pub source_topic: String,
    pub device_imei: Option<String>,
    pub gateway_mac: Option<String>,
    pub sub_device_mac: Option<String>,
    pub sub_device_kind: SubDeviceKind,
    pub effective_time: Instant,
    pub received_time: Instant,
    pub values: Values,
    pub batch: Option<Vec<BatchSample>>,
    #[serde(with = "raw_payload_as_base64")]
    pub raw_payload: Vec<u8>,
    /// Set when the clamp in `clamp_effective_time` fired, so C7 can emit a
    /// `ClockSkewWarning` without re-deriving it downstream.
    pub clock_skew_clamped: bool,
}

impl CanonicalObservation {
    /// Builds a new record and applies the `effective_time` clamp invariant
    /// from spec §3.1, recording whether clamping fired.
    pub fn new(
        source_vendor: SourceVendor,
        source_topic: impl Into<String>,
        sub_device_kind: SubDeviceKind,
        effective_time: Instant,
        received_time: Instant,
        values: Values,
        raw_payload: Vec<u8>,
    ) -> Self {
        let (clamped, warned) =
            effective_time.clamp_to_window(received_time, MAX_PAST_DRIFT, MAX_FUTURE_DRIFT);
        Self {
            ingest_id: Uuid::new_v4(),
            source_vendor,
            source_topic: source_topic.into(),
            device_imei: None,
            gateway_mac: None,
            sub_device_mac: None,
            sub_device_kind,
            effective_time: clamped,
            received_time,
            values,
            batch: None,
            raw_payload,
            clock_skew_clamped: warned,
        }
    }

    /// The device identifier to key consistent-hash worker partitioning and
    /// `performer` references on (spec §5, §3.4): gateway MAC for AVA4,
    /// IMEI otherwise.
    pub fn device_key(&self) -> &str {
        self.gateway_mac
            .as_deref()
            .or(self.device_imei.as_deref())
            .unwrap_or("unknown")
    }

    /// `{vendor}_{device_imei|gateway_mac}` performer reference (spec §3.4).
    pub fn performer_id(&self) -> String {
        format!("{}_{}", self.source_vendor, self.device_key())
    }

    /// Checks the "exactly one of (device_imei, gateway_mac)" invariant.
    pub fn has_exactly_one_primary_id(&self) -> bool {
        self.device_imei.is_some() != self.gateway_mac.is_some()
    }
}

mod raw_payload_as_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
