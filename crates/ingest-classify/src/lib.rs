//! Per-vendor payload classification and validation (C3).
//!
//! [`classify`] is the single entry point: it enforces the payload-size and
//! UTF-8/JSON-shape checks common to every vendor (spec §4.3), then hands off
//! to the vendor-specific table in [`ava4`], [`kati`], or [`qube`].

mod ava4;
mod json_ext;
mod kati;
mod qube;
mod validate;

use ingest_core::{CanonicalObservation, Instant, PayloadError, MAX_PAYLOAD_BYTES};

/// Classifies a raw MQTT payload into a canonical observation.
///
/// `topic` decides vendor routing per spec §6.1's subscription table; within
/// a vendor, the per-vendor dispatch table (§4.3–§4.5) decides the kind.
pub fn classify(topic: &str, raw: Vec<u8>, received: Instant) -> Result<CanonicalObservation, PayloadError> {
    if raw.len() > MAX_PAYLOAD_BYTES {
        return Err(PayloadError::MalformedEncoding);
    }

    let text = std::str::from_utf8(&raw).map_err(|_| PayloadError::MalformedEncoding)?;
    let json: serde_json::Value =
        serde_json::from_str(text).map_err(|_| PayloadError::MalformedEncoding)?;

    if !json.is_object() {
        return Err(PayloadError::MalformedEncoding);
    }

    match vendor_for_topic(topic) {
        Some(Vendor::Ava4) => ava4::classify(topic, &json, received, raw),
        Some(Vendor::Kati) => kati::classify(topic, &json, received, raw),
        Some(Vendor::Qube) => qube::classify(topic, &json, received, raw),
        None => Err(PayloadError::UnknownTopic(topic.to_string())),
    }
}

enum Vendor {
    Ava4,
    Kati,
    Qube,
}

/// Routes a verbatim MQTT topic to a vendor per the subscription table in
/// spec §6.1. Kati topics are namespaced under `iMEDE_watch/`; AVA4 and
/// Qube-Vital each publish to a small fixed set of bare topic names.
fn vendor_for_topic(topic: &str) -> Option<Vendor> {
    if topic.starts_with("iMEDE_watch/") {
        return Some(Vendor::Kati);
    }
    match topic {
        "ESP32_BLE_GW_TX" | "dusun_sub" | "dusun_status" => Some(Vendor::Ava4),
        "CM4_BLE_GW_TX" => Some(Vendor::Qube),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_oversized_payload() {
        let raw = vec![b'a'; MAX_PAYLOAD_BYTES + 1];
        let err = classify("iMEDE_watch/hb", raw, Instant::now()).unwrap_err();
        assert!(matches!(err, PayloadError::MalformedEncoding));
    }

    #[test]
    fn rejects_non_utf8_payload() {
        let raw = vec![0xFF, 0xFE, 0x00, 0x01];
        let err = classify("iMEDE_watch/hb", raw, Instant::now()).unwrap_err();
        assert!(matches!(err, PayloadError::MalformedEncoding));
    }

    #[test]
    fn rejects_unknown_topic() {
        let raw = br#"{"foo":"bar"}"#.to_vec();
        let err = classify("some/random/topic", raw, Instant::now()).unwrap_err();
        assert!(matches!(err, PayloadError::UnknownTopic(_)));
    }

    #[test]
    fn classifies_ava4_bp_reading() {
        let raw = br#"{
            "from":"BLE","to":"CLOUD","time":1700000000,"deviceCode":"BP_BIOLIGTH",
            "mac":"AA:BB:CC:DD:EE:FF","type":"reportAttribute",
            "data":{"attribute":"BP_BIOLIGTH","mac":"11:22:33:44:55:66",
                    "value":{"device_list":[{"bp_high":128,"bp_low":82,"PR":76}]}}
        }"#
        .to_vec();
        let obs = classify("dusun_sub", raw, Instant::now()).unwrap();
        assert_eq!(obs.gateway_mac.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(obs.sub_device_mac.as_deref(), Some("11:22:33:44:55:66"));
        assert_eq!(obs.values.get("systolic").and_then(|v| v.as_f64()), Some(128.0));
    }

    #[test]
    fn classifies_kati_vital_sign_bp() {
        let raw = br#"{
            "IMEI":"8612650614862690","heartRate":72,"spO2":97,
            "bloodPressure":{"bp_sys":120,"bp_dia":78},
            "bodyTemperature":36.6,"timeStamps":"2026-07-29T00:00:00Z"
        }"#
        .to_vec();
        let obs = classify("iMEDE_watch/VitalSign", raw, Instant::now()).unwrap();
        assert_eq!(obs.device_imei.as_deref(), Some("8612650614862690"));
        assert_eq!(obs.values.get("systolic").and_then(|v| v.as_f64()), Some(120.0));
        assert_eq!(obs.values.get("pulse").and_then(|v| v.as_f64()), Some(72.0));
    }

    #[test]
    fn classifies_kati_batch_vitals() {
        let raw = br#"{
            "IMEI":"861265061486269",
            "data":[
                {"heartRate":70,"bloodPressure":{"bp_sys":120,"bp_dia":80}},
                {"heartRate":72,"spO2":97}
            ]
        }"#
        .to_vec();
        let obs = classify("iMEDE_watch/AP55", raw, Instant::now()).unwrap();
        assert_eq!(obs.device_imei.as_deref(), Some("861265061486269"));
        let batch = obs.batch.expect("batch samples");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn classifies_qube_blood_pressure() {
        let raw = br#"{
            "type":"BLOOD_PRESSURE","device_id":"862222061486269","timestamp":"2026-07-29T00:00:00Z",
            "data":{"value":{"systolic":118,"diastolic":76,"pulse":70}}
        }"#
        .to_vec();
        let obs = classify("CM4_BLE_GW_TX", raw, Instant::now()).unwrap();
        assert_eq!(obs.device_imei.as_deref(), Some("862222061486269"));
        assert_eq!(obs.values.get("systolic").and_then(|v| v.as_f64()), Some(118.0));
    }

    #[test]
    fn out_of_range_bp_is_rejected() {
        let raw = br#"{
            "type":"BLOOD_PRESSURE","device_id":"1","timestamp":"2026-07-29T00:00:00Z",
            "data":{"value":{"systolic":500,"diastolic":80}}
        }"#
        .to_vec();
        let err = classify("CM4_BLE_GW_TX", raw, Instant::now()).unwrap_err();
        assert!(matches!(err, PayloadError::OutOfRange { .. }));
    }
}
