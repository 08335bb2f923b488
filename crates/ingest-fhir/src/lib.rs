//! FHIR R5 `Observation` projection (C4) and idempotent HTTP writer (C6).

pub mod error;
pub mod model;
pub mod project;
pub mod writer;

pub use error::WriterError;
pub use model::Observation;
pub use project::project;
pub use writer::{FhirWriter, WriteItem, WriteOutcome};

use ingest_core::CanonicalObservation;

/// Builds the writer items for one canonical record's projection, assigning
/// each the idempotency key `{ingest_id}:{kind}:{index-in-batch}` (spec §4.5).
/// Non-batch records use index 0.
pub fn write_items(obs: &CanonicalObservation, projected: Vec<Observation>) -> Vec<WriteItem> {
    projected
        .into_iter()
        .enumerate()
        .map(|(index, observation)| WriteItem {
            idempotency_key: format!("{}:{}:{}", obs.ingest_id, obs.sub_device_kind, index),
            observation,
        })
        .collect()
}
