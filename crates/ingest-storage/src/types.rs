use ingest_core::identity::PatientId;
use ingest_core::model::{SourceVendor, SubDeviceKind, Values};
use ingest_core::time::Instant;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One document appended to a history series by C5 (spec §4.6). Unmapped
/// records carry `patient_id = None` and get a synthetic display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDocument {
    pub patient_id: Option<PatientId>,
    pub patient_name: Option<String>,
    pub ingest_id: Uuid,
    pub effective_time: Instant,
    pub received_time: Instant,
    pub sub_device_kind: SubDeviceKind,
    pub source_vendor: SourceVendor,
    pub device_id: String,
    pub values: Values,
}

impl HistoryDocument {
    pub fn unmapped_display_name(device_id: &str) -> String {
        format!("Unmapped Device ({device_id})")
    }
}
