//! Per-device pipeline stage (spec §7, §8): identity resolution, history
//! append, and FHIR projection + write for one routed observation. Each
//! worker only ever sees messages from its own partition, so this function
//! has no concurrency of its own to manage beyond the single await chain.

use std::sync::Arc;

use ingest_core::{CanonicalObservation, Confidence};
use ingest_events::{
    EventEmitter, EventStatus, MonitoringEvent, STEP_FHIR_PROJECTED, STEP_FHIR_STORAGE, STEP_HISTORY_STORED,
    STEP_PATIENT_LOOKUP,
};
use ingest_fhir::{write_items, FhirWriter, WriteOutcome};
use ingest_storage::{DeviceDirectory, HistoryStore};
use tokio::sync::mpsc;

use crate::RoutedMessage;

#[allow(clippy::too_many_arguments)]
pub(crate) async fn worker_loop(
    id: usize,
    mut rx: mpsc::Receiver<RoutedMessage>,
    directory: Arc<dyn DeviceDirectory>,
    history: Arc<dyn HistoryStore>,
    fhir: Arc<FhirWriter>,
    emitter: EventEmitter,
    strict: bool,
) {
    tracing::debug!(worker = id, "worker started");
    while let Some(routed) = rx.recv().await {
        let ack_worthy =
            process(&routed.observation, directory.as_ref(), history.as_ref(), fhir.as_ref(), &emitter, strict).await;
        if ack_worthy {
            if let Err(err) = routed.message.ack().await {
                tracing::warn!(worker = id, error = %err, "mqtt ack failed");
            }
        } else {
            tracing::warn!(worker = id, ingest_id = %routed.observation.ingest_id, "leaving message unacked, expecting QoS-1 redelivery");
        }
    }
    tracing::debug!(worker = id, "worker drained, exiting");
}

/// Runs identity resolution through FHIR write for one observation. Returns
/// whether the MQTT message should be acked: `false` means a transport-class
/// failure occurred (identity store or history store unreachable) and the
/// message should be left for QoS-1 redelivery rather than lost. A FHIR
/// dead-letter does *not* suppress the ack — history already recorded the
/// sample, and dead-lettering is itself the replay mechanism for FHIR
/// (spec §7, Partial downstream policy).
///
/// An identity conflict (declared sub-device kind disagrees with the
/// reported one) is a Semantic-class error (spec §7): under `strict` the
/// record is dropped outright (no history, no FHIR, just an error event);
/// otherwise it is flagged and kept, exactly like today's non-strict path.
async fn process(
    obs: &CanonicalObservation,
    directory: &dyn DeviceDirectory,
    history: &dyn HistoryStore,
    fhir: &FhirWriter,
    emitter: &EventEmitter,
    strict: bool,
) -> bool {
    let resolution = match ingest_identity::resolve(directory, obs).await {
        Ok(resolution) => resolution,
        Err(err) => {
            tracing::error!(ingest_id = %obs.ingest_id, error = %err, "identity resolution failed");
            emitter.emit(event(STEP_PATIENT_LOOKUP, EventStatus::Error, obs, Some(err.to_string())));
            return false;
        }
    };

    if strict && resolution.confidence == Confidence::Conflict {
        tracing::warn!(ingest_id = %obs.ingest_id, "dropping record: declared sub-device kind conflict under strict validation");
        emitter.emit(event(STEP_PATIENT_LOOKUP, EventStatus::Error, obs, Some("sub-device kind conflict".to_string())));
        return true;
    }

    emitter.emit(event(
        STEP_PATIENT_LOOKUP,
        if resolution.is_resolved() { EventStatus::Success } else { EventStatus::Error },
        obs,
        if resolution.is_resolved() { None } else { Some("device is not mapped to a patient".to_string()) },
    ));

    if let Err(err) = ingest_history::append(history, obs, &resolution).await {
        tracing::error!(ingest_id = %obs.ingest_id, error = %err, "history append failed");
        emitter.emit(event(STEP_HISTORY_STORED, EventStatus::Error, obs, Some(err.to_string())));
        return false;
    }
    emitter.emit(event(STEP_HISTORY_STORED, EventStatus::Success, obs, None));

    if !resolution.is_resolved() {
        return true;
    }

    let projected = ingest_fhir::project(obs, &resolution);
    if projected.is_empty() {
        return true;
    }
    emitter.emit(event(STEP_FHIR_PROJECTED, EventStatus::Success, obs, None));

    let items = write_items(obs, projected);
    let outcomes = if items.len() > 1 {
        fhir.write_batch(items).await
    } else {
        vec![fhir.write_single(items.into_iter().next().expect("checked items.len() > 0")).await]
    };

    for outcome in outcomes {
        match outcome {
            WriteOutcome::Written => emitter.emit(event(STEP_FHIR_STORAGE, EventStatus::Success, obs, None)),
            WriteOutcome::DeadLettered { error, .. } => {
                tracing::error!(ingest_id = %obs.ingest_id, error = %error, "fhir write dead-lettered, history already recorded");
                emitter.emit(event(STEP_FHIR_STORAGE, EventStatus::Error, obs, Some(error.to_string())));
            }
        }
    }

    true
}

fn event(step: &str, status: EventStatus, obs: &CanonicalObservation, error: Option<String>) -> MonitoringEvent {
    MonitoringEvent {
        step: step.to_string(),
        status,
        device_type: obs.source_vendor.as_str().to_string(),
        topic: obs.source_topic.clone(),
        payload: serde_json::to_value(&obs.values).unwrap_or(serde_json::Value::Null),
        patient_info: None,
        error,
        timestamp: ingest_core::now_utc().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::{Instant, PatientId, SourceVendor, SubDeviceKind, SubDeviceRegistry, SubDeviceRegistryEntry};
    use ingest_store_memory::{MemoryDeviceDirectory, MemoryHistoryStore};
    use std::collections::BTreeMap;

    fn conflicting_observation() -> CanonicalObservation {
        let mut obs =
            CanonicalObservation::new(SourceVendor::Ava4, "dusun_sub", SubDeviceKind::Glucose, Instant::now(), Instant::now(), BTreeMap::new(), vec![]);
        obs.sub_device_mac = Some("AA:BB".into());
        obs
    }

    #[tokio::test]
    async fn strict_mode_drops_identity_conflicts_without_history_or_fhir() {
        let directory = MemoryDeviceDirectory::new();
        directory.put_sub_device_registry(SubDeviceRegistry {
            patient_id: PatientId("P1".into()),
            entries: vec![SubDeviceRegistryEntry { kind: SubDeviceKind::Bp, sub_device_mac: "AA:BB".into() }],
        });
        let history = MemoryHistoryStore::new();
        let fhir = FhirWriter::new("http://127.0.0.1:0", None);
        let emitter = EventEmitter::new();

        let obs = conflicting_observation();
        let acked = process(&obs, directory.as_ref(), history.as_ref(), &fhir, &emitter, true).await;
        assert!(acked, "a strict-mode semantic drop is acked, not redelivered");
        assert_eq!(history.len("blood_sugar_histories"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_strict_mode_keeps_identity_conflicts() {
        let directory = MemoryDeviceDirectory::new();
        directory.put_sub_device_registry(SubDeviceRegistry {
            patient_id: PatientId("P1".into()),
            entries: vec![SubDeviceRegistryEntry { kind: SubDeviceKind::Bp, sub_device_mac: "AA:BB".into() }],
        });
        let history = MemoryHistoryStore::new();
        let fhir = FhirWriter::new("http://127.0.0.1:0", None);
        let emitter = EventEmitter::new();

        let obs = conflicting_observation();
        let acked = process(&obs, directory.as_ref(), history.as_ref(), &fhir, &emitter, false).await;
        assert!(acked);
        assert_eq!(history.len("blood_sugar_histories"), 1);
    }
}
