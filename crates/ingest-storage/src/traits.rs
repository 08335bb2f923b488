//! Storage contracts for C1 (spec §4.1). Each operation is a single
//! logical read/write; callers retry on `StorageError::is_transient`.
//! Implementations must be `Send + Sync` so a single pool can be shared
//! across the worker fleet (spec §5).

use async_trait::async_trait;
use ingest_core::identity::{GatewayBox, HospitalBox, PatientId, SubDeviceRegistry, Watch};
use ingest_core::model::SubDeviceKind;

use crate::error::StorageResult;
use crate::types::HistoryDocument;

/// Read-only lookups against the identity entities in spec §3.2. C2 (the
/// identity resolver) is the only consumer; registry rows are owned and
/// mutated out-of-band by the external admin surface.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn find_gateway_by_mac(&self, mac: &str) -> StorageResult<Option<GatewayBox>>;

    async fn find_watch_by_imei(&self, imei: &str) -> StorageResult<Option<Watch>>;

    async fn find_hospital_box_by_imei(&self, imei: &str) -> StorageResult<Option<HospitalBox>>;

    async fn find_sub_device_registry(
        &self,
        patient_id: &PatientId,
    ) -> StorageResult<Option<SubDeviceRegistry>>;

    /// Reverse index: BLE sub-device MAC -> (owning patient, declared kind).
    /// May be realized as a full scan + filter if the backend lacks the
    /// index (spec §4.1).
    async fn find_registry_by_sub_mac(
        &self,
        mac: &str,
    ) -> StorageResult<Option<(PatientId, SubDeviceKind)>>;
}

/// Append-only per-kind history series (spec §4.6). Duplicates from
/// at-least-once MQTT redelivery are tolerated by design; readers dedup on
/// `ingest_id` if they need to.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, series: &str, doc: HistoryDocument) -> StorageResult<()>;
}
