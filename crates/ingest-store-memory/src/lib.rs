//! Lock-free in-memory store, grounded on the teacher's
//! `InMemoryStorage` (papaya-backed FHIR resource store): same
//! concurrent-map-per-collection shape, adapted to the device-directory
//! and history-series contracts of `ingest-storage`.

use async_trait::async_trait;
use dashmap::DashMap;
use ingest_core::identity::{GatewayBox, HospitalBox, PatientId, SubDeviceRegistry, Watch};
use ingest_core::model::SubDeviceKind;
use ingest_storage::{DeviceDirectory, HistoryDocument, HistoryStore, StorageResult};
use std::sync::Arc;

/// In-memory identity directory: gateways, watches, hospital boxes, and
/// per-patient sub-device registries. Seeded directly in tests; in
/// production the admin surface would write through an equivalent backed
/// by the document store (out of scope here, see spec §1).
#[derive(Debug, Default)]
pub struct MemoryDeviceDirectory {
    gateways: DashMap<String, GatewayBox>,
    watches: DashMap<String, Watch>,
    hospital_boxes: DashMap<String, HospitalBox>,
    registries: DashMap<String, SubDeviceRegistry>,
    /// sub_device_mac -> (patient_id, kind), maintained alongside `registries`
    /// to realize the reverse index spec §4.1 allows as a store-side concern.
    sub_mac_index: DashMap<String, (PatientId, SubDeviceKind)>,
}

impl MemoryDeviceDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_gateway(&self, gateway: GatewayBox) {
        self.gateways.insert(gateway.gateway_mac.clone(), gateway);
    }

    pub fn put_watch(&self, watch: Watch) {
        self.watches.insert(watch.imei.clone(), watch);
    }

    pub fn put_hospital_box(&self, hospital_box: HospitalBox) {
        self.hospital_boxes.insert(hospital_box.imei.clone(), hospital_box);
    }

    pub fn put_sub_device_registry(&self, registry: SubDeviceRegistry) {
        for entry in &registry.entries {
            self.sub_mac_index.insert(
                entry.sub_device_mac.clone(),
                (registry.patient_id.clone(), entry.kind),
            );
        }
        self.registries.insert(registry.patient_id.0.clone(), registry);
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDeviceDirectory {
    async fn find_gateway_by_mac(&self, mac: &str) -> StorageResult<Option<GatewayBox>> {
        Ok(self.gateways.get(mac).map(|r| r.clone()))
    }

    async fn find_watch_by_imei(&self, imei: &str) -> StorageResult<Option<Watch>> {
        Ok(self.watches.get(imei).map(|r| r.clone()))
    }

    async fn find_hospital_box_by_imei(&self, imei: &str) -> StorageResult<Option<HospitalBox>> {
        Ok(self.hospital_boxes.get(imei).map(|r| r.clone()))
    }

    async fn find_sub_device_registry(
        &self,
        patient_id: &PatientId,
    ) -> StorageResult<Option<SubDeviceRegistry>> {
        Ok(self.registries.get(&patient_id.0).map(|r| r.clone()))
    }

    async fn find_registry_by_sub_mac(
        &self,
        mac: &str,
    ) -> StorageResult<Option<(PatientId, SubDeviceKind)>> {
        Ok(self.sub_mac_index.get(mac).map(|r| r.clone()))
    }
}

/// Append-only history series keyed by series name, each an ordered `Vec`
/// under a dashmap shard. Ordering within a shard matches insertion order,
/// which is all spec §8's per-device ordering property requires.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    series: DashMap<String, Vec<HistoryDocument>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self, series: &str) -> Vec<HistoryDocument> {
        self.series.get(series).map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self, series: &str) -> usize {
        self.series.get(series).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append(&self, series: &str, doc: HistoryDocument) -> StorageResult<()> {
        self.series.entry(series.to_string()).or_default().push(doc);
        Ok(())
    }
}
