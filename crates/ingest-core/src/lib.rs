//! Canonical domain model, error taxonomy, and shared primitives for the
//! device-ingestion pipeline: the types every other `ingest-*` crate builds
//! against.

pub mod error;
pub mod identity;
pub mod model;
pub mod ranges;
pub mod time;

pub use error::{ErrorCategory, IngestError, PayloadError, Result};
pub use identity::{
    Confidence, GatewayBox, HospitalBox, HospitalId, PatientId, Resolution, SubDeviceRegistry,
    SubDeviceRegistryEntry, Watch,
};
pub use model::{
    BatchSample, CanonicalObservation, SourceVendor, SubDeviceKind, Value, Values,
    MAX_FUTURE_DRIFT, MAX_PAST_DRIFT, MAX_PAYLOAD_BYTES,
};
pub use time::{now_utc, Instant};
