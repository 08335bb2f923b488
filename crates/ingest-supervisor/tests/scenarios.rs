//! End-to-end acceptance scenarios S1-S6 (spec.md §8), exercised at the
//! classify -> identity -> history -> FHIR-projection/write level. MQTT
//! transport itself (`ingest-mqtt`) is covered by its own unit tests; these
//! scenarios assume a message has already arrived off the broker and drive
//! the rest of the pipeline the same way `ingest-supervisor`'s worker loop
//! does.

use ingest_core::identity::{PatientId, SubDeviceRegistry, SubDeviceRegistryEntry, Watch};
use ingest_core::{Instant, PayloadError, SourceVendor, SubDeviceKind};
use ingest_fhir::{FhirWriter, WriteOutcome};
use ingest_store_memory::{MemoryDeviceDirectory, MemoryHistoryStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ava4_bp_payload(gateway_mac: &str, sub_mac: &str) -> Vec<u8> {
    format!(
        r#"{{
            "from":"BLE","to":"CLOUD","time":1700000000,"deviceCode":"BP_BIOLIGTH",
            "mac":"{gateway_mac}","type":"reportAttribute",
            "data":{{"attribute":"BP_BIOLIGTH","mac":"{sub_mac}",
                    "value":{{"device_list":[{{"bp_high":128,"bp_low":82,"PR":76}}]}}}}
        }}"#
    )
    .into_bytes()
}

#[tokio::test]
async fn s1_ava4_blood_pressure_happy_path() {
    let directory = MemoryDeviceDirectory::new();
    directory.put_sub_device_registry(SubDeviceRegistry {
        patient_id: PatientId("P1".into()),
        entries: vec![SubDeviceRegistryEntry { kind: SubDeviceKind::Bp, sub_device_mac: "AA:BB:CC:DD:EE:01".into() }],
    });
    let history = MemoryHistoryStore::new();

    let raw = ava4_bp_payload("11:22:33:AA:BB:CC", "AA:BB:CC:DD:EE:01");
    let obs = ingest_classify::classify("dusun_sub", raw, Instant::now()).unwrap();
    assert_eq!(obs.source_vendor, SourceVendor::Ava4);

    let resolution = ingest_identity::resolve(directory.as_ref(), &obs).await.unwrap();
    assert!(resolution.is_resolved());
    assert_eq!(resolution.patient_id.as_ref().unwrap().0, "P1");

    ingest_history::append(history.as_ref(), &obs, &resolution).await.unwrap();
    let docs = history.snapshot("blood_pressure_histories");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].patient_id.as_ref().unwrap().0, "P1");
    assert_eq!(docs[0].values.get("systolic").and_then(|v| v.as_f64()), Some(128.0));
    assert_eq!(docs[0].values.get("diastolic").and_then(|v| v.as_f64()), Some(82.0));
    assert_eq!(docs[0].values.get("pulse").and_then(|v| v.as_f64()), Some(76.0));

    let projected = ingest_fhir::project(&obs, &resolution);
    assert_eq!(projected.len(), 1);
    let observation = &projected[0];
    assert_eq!(observation.code.coding[0].code, "85354-9");
    assert_eq!(observation.component.len(), 2);
    assert_eq!(observation.subject.reference, "Patient/P1");
}

#[tokio::test]
async fn s2_kati_ap55_batch_expands_to_three_observations() {
    let directory = MemoryDeviceDirectory::new();
    directory.put_watch(Watch { imei: "861265061486269".into(), patient_id: Some(PatientId("P2".into())) });
    let history = MemoryHistoryStore::new();

    let raw = br#"{
        "IMEI":"861265061486269",
        "data":[
            {"heartRate":72,"bloodPressure":{"bp_sys":120,"bp_dia":78}},
            {"heartRate":80,"spO2":97},
            {"bodyTemperature":36.6}
        ]
    }"#
    .to_vec();
    let obs = ingest_classify::classify("iMEDE_watch/AP55", raw, Instant::now()).unwrap();
    let batch = obs.batch.as_ref().expect("batch samples");
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[0].kind, SubDeviceKind::Bp);
    assert_eq!(batch[1].kind, SubDeviceKind::Spo2);
    assert_eq!(batch[2].kind, SubDeviceKind::Temp);

    let resolution = ingest_identity::resolve(directory.as_ref(), &obs).await.unwrap();
    assert!(resolution.is_resolved());

    ingest_history::append(history.as_ref(), &obs, &resolution).await.unwrap();
    assert_eq!(history.len("blood_pressure_histories"), 1);
    assert_eq!(history.len("spo2_histories"), 1);
    assert_eq!(history.len("temperature_histories"), 1);

    let projected = ingest_fhir::project(&obs, &resolution);
    assert_eq!(projected.len(), 3, "one Observation per batch sample, ordering preserved");
    assert_eq!(projected[0].code.coding[0].code, "85354-9");
    assert_eq!(projected[2].code.coding[0].code, "8310-5");
}

#[tokio::test]
async fn s3_unmapped_kati_watch_keeps_history_skips_fhir() {
    let directory = MemoryDeviceDirectory::new();
    let history = MemoryHistoryStore::new();

    let raw = br#"{"IMEI":"000000000000000","bodyTemperature":36.9}"#.to_vec();
    let obs = ingest_classify::classify("iMEDE_watch/VitalSign", raw, Instant::now()).unwrap();

    let resolution = ingest_identity::resolve(directory.as_ref(), &obs).await.unwrap();
    assert!(!resolution.is_resolved(), "unmapped IMEI must resolve to unresolved, not an error");

    ingest_history::append(history.as_ref(), &obs, &resolution).await.unwrap();
    let docs = history.snapshot("temperature_histories");
    assert_eq!(docs.len(), 1);
    assert!(docs[0].patient_id.is_none());
    assert_eq!(docs[0].patient_name.as_deref(), Some("Unmapped Device (000000000000000)"));

    let projected = ingest_fhir::project(&obs, &resolution);
    assert!(projected.is_empty(), "unresolved confidence must never produce a FHIR Observation");
}

#[test]
fn s4_non_utf8_payload_is_rejected_without_storing_anything() {
    let raw = vec![0xFF, 0xFE, 0x00, 0x01];
    let err = ingest_classify::classify("iMEDE_watch/hb", raw, Instant::now()).unwrap_err();
    assert!(matches!(err, PayloadError::MalformedEncoding));
}

#[test]
fn s5_out_of_range_bp_is_rejected_regardless_of_strict_mode() {
    // `validation.strict` never changes this outcome (spec.md §8 S5): range
    // errors are always a hard reject, only clock skew is ever clamped.
    let raw = ava4_bp_payload("AA:BB:CC:DD:EE:FF", "11:22:33:44:55:66");
    let raw = String::from_utf8(raw)
        .unwrap()
        .replace("\"bp_high\":128", "\"bp_high\":500")
        .into_bytes();
    let err = ingest_classify::classify("dusun_sub", raw, Instant::now()).unwrap_err();
    assert!(matches!(
        err,
        PayloadError::OutOfRange { ref field, .. } if field == "systolic"
    ));
}

#[tokio::test(start_paused = true)]
async fn s6_fhir_outage_history_survives_and_write_dead_letters() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Observation"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let directory = MemoryDeviceDirectory::new();
    directory.put_watch(Watch { imei: "861265061486269".into(), patient_id: Some(PatientId("P6".into())) });
    let history = MemoryHistoryStore::new();

    let raw = br#"{"IMEI":"861265061486269","heartRate":70,"bloodPressure":{"bp_sys":125,"bp_dia":82}}"#.to_vec();
    let obs = ingest_classify::classify("iMEDE_watch/VitalSign", raw, Instant::now()).unwrap();

    let resolution = ingest_identity::resolve(directory.as_ref(), &obs).await.unwrap();
    assert!(resolution.is_resolved());

    ingest_history::append(history.as_ref(), &obs, &resolution).await.unwrap();
    assert_eq!(history.len("blood_pressure_histories"), 1, "history is written before any FHIR attempt");

    let writer = FhirWriter::new(mock_server.uri(), None);
    let projected = ingest_fhir::project(&obs, &resolution);
    let mut items = ingest_fhir::write_items(&obs, projected);
    let item = items.pop().expect("one observation for a non-batch record");
    let ingest_id = obs.ingest_id;

    let outcome = writer.write_single(item).await;
    match outcome {
        WriteOutcome::DeadLettered { item, .. } => {
            assert!(item.idempotency_key.starts_with(&ingest_id.to_string()));
        }
        WriteOutcome::Written => panic!("a persistently failing store must dead-letter, not succeed"),
    }

    // A later, unrelated message for a different device must still be
    // processable: the dead-letter did not poison shared state.
    assert_eq!(history.len("blood_pressure_histories"), 1);
}
