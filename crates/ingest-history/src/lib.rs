//! History router (C5, spec §4.6): maps a canonical record's kind to a
//! history-series name and appends one document per event.

use ingest_core::{CanonicalObservation, Resolution, SubDeviceKind};
use ingest_storage::{HistoryDocument, HistoryStore, StorageResult};

/// `kind -> history-series name` (spec §4.6).
pub fn series_for(kind: SubDeviceKind) -> &'static str {
    match kind {
        SubDeviceKind::Bp => "blood_pressure_histories",
        SubDeviceKind::Glucose => "blood_sugar_histories",
        SubDeviceKind::Spo2 => "spo2_histories",
        SubDeviceKind::Temp => "temperature_histories",
        SubDeviceKind::Weight => "body_data_histories",
        SubDeviceKind::Steps => "step_histories",
        SubDeviceKind::Sleep => "sleep_data_histories",
        SubDeviceKind::Chol => "lipid_histories",
        SubDeviceKind::Ua => "creatinine_histories",
        SubDeviceKind::Location | SubDeviceKind::DeviceStatus | SubDeviceKind::Fall | SubDeviceKind::Sos => {
            "device_event_histories"
        }
        SubDeviceKind::Salt => "device_event_histories",
        SubDeviceKind::BatchVitals => "device_event_histories",
    }
}

/// Appends one history document per sample: a single document for a
/// discrete record, or one per `batch_vitals` sample (spec §4.6, §4.4).
/// Unmapped (unresolved) records still append, with a null `patient_id`
/// and a display name synthesized from the device key.
pub async fn append(store: &dyn HistoryStore, obs: &CanonicalObservation, resolution: &Resolution) -> StorageResult<()> {
    if let Some(batch) = &obs.batch {
        for sample in batch {
            let doc = document(obs, resolution, sample.kind, sample.effective_time, sample.values.clone());
            store.append(series_for(sample.kind), doc).await?;
        }
        return Ok(());
    }

    let doc = document(obs, resolution, obs.sub_device_kind, obs.effective_time, obs.values.clone());
    store.append(series_for(obs.sub_device_kind), doc).await
}

fn document(
    obs: &CanonicalObservation,
    resolution: &Resolution,
    kind: SubDeviceKind,
    effective_time: ingest_core::Instant,
    values: ingest_core::Values,
) -> HistoryDocument {
    let patient_name = if resolution.patient_id.is_none() {
        Some(HistoryDocument::unmapped_display_name(obs.device_key()))
    } else {
        None
    };
    HistoryDocument {
        patient_id: resolution.patient_id.clone(),
        patient_name,
        ingest_id: obs.ingest_id,
        effective_time,
        received_time: obs.received_time,
        sub_device_kind: kind,
        source_vendor: obs.source_vendor,
        device_id: obs.device_key().to_string(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::{Confidence, PatientId, SourceVendor, Value, Values as ValuesMap};
    use ingest_store_memory::MemoryHistoryStore;

    fn obs_with(kind: SubDeviceKind) -> CanonicalObservation {
        let mut values = ValuesMap::new();
        values.insert("systolic".into(), Value::Number(120.0));
        let mut o = CanonicalObservation::new(SourceVendor::Ava4, "dusun_sub", kind, ingest_core::now_utc(), ingest_core::now_utc(), values, vec![]);
        o.gateway_mac = Some("GW1".into());
        o
    }

    #[tokio::test]
    async fn resolved_record_carries_patient_id() {
        let store = MemoryHistoryStore::new();
        let obs = obs_with(SubDeviceKind::Bp);
        let resolution = Resolution { patient_id: Some(PatientId("P1".into())), hospital_id: None, confidence: Confidence::Exact };
        append(store.as_ref(), &obs, &resolution).await.unwrap();
        let docs = store.snapshot("blood_pressure_histories");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].patient_id, Some(PatientId("P1".into())));
        assert!(docs[0].patient_name.is_none());
    }

    #[tokio::test]
    async fn unresolved_record_gets_unmapped_display_name() {
        let store = MemoryHistoryStore::new();
        let obs = obs_with(SubDeviceKind::Bp);
        append(store.as_ref(), &obs, &Resolution::unresolved()).await.unwrap();
        let docs = store.snapshot("blood_pressure_histories");
        assert_eq!(docs[0].patient_name.as_deref(), Some("Unmapped Device (GW1)"));
    }

    #[tokio::test]
    async fn batch_vitals_append_one_document_per_sample() {
        use ingest_core::BatchSample;
        let store = MemoryHistoryStore::new();
        let mut obs = obs_with(SubDeviceKind::BatchVitals);
        obs.values = ValuesMap::new();
        obs.batch = Some(vec![
            BatchSample { effective_time: ingest_core::now_utc(), kind: SubDeviceKind::Spo2, values: ValuesMap::new() },
            BatchSample { effective_time: ingest_core::now_utc(), kind: SubDeviceKind::Temp, values: ValuesMap::new() },
        ]);
        append(store.as_ref(), &obs, &Resolution::unresolved()).await.unwrap();
        assert_eq!(store.len("spo2_histories"), 1);
        assert_eq!(store.len("temperature_histories"), 1);
    }
}
