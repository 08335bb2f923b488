//! Qube-Vital hospital box dispatch table (spec §4.5, §6.2).
//!
//! Single topic, `type` field discriminates the reading kind. All Qube
//! payloads carry `device_id` (the box IMEI) at the top level, and nest the
//! reading under `data.value`.

use ingest_core::{CanonicalObservation, Instant, PayloadError, SourceVendor, SubDeviceKind, Value, Values};
use serde_json::Value as Json;

use crate::json_ext::{optional_f64, optional_str, required_f64, required_object, required_str, time_field};
use crate::validate;

pub fn classify(topic: &str, json: &Json, received: Instant, raw: Vec<u8>) -> Result<CanonicalObservation, PayloadError> {
    let imei = required_str(json, "device_id")?.to_string();
    let reading_type = required_str(json, "type")?;
    let data = required_object(json, "data")?;
    let value = required_object(data, "value")?;

    let envelope_time = time_field(json, "timestamp", received);

    let (kind, values) = match reading_type {
        "BLOOD_PRESSURE" => (SubDeviceKind::Bp, extract_bp(value)?),
        "BLOOD_SUGAR" => (SubDeviceKind::Glucose, extract_glucose(value)?),
        "SPO2" => (SubDeviceKind::Spo2, extract_spo2(value)?),
        "TEMPERATURE" => (SubDeviceKind::Temp, extract_temp(value)?),
        other => return Err(PayloadError::UnknownDiscriminator(other.to_string())),
    };

    let mut obs = CanonicalObservation::new(
        SourceVendor::Qube,
        topic.to_string(),
        kind,
        envelope_time,
        received,
        values,
        raw,
    );
    obs.device_imei = Some(imei);
    Ok(obs)
}

fn extract_bp(value: &Json) -> Result<Values, PayloadError> {
    let systolic = required_f64(value, "systolic")?;
    let diastolic = required_f64(value, "diastolic")?;
    validate::systolic(systolic)?;
    validate::diastolic(diastolic)?;
    let mut values = Values::new();
    values.insert("systolic".into(), Value::Number(systolic));
    values.insert("diastolic".into(), Value::Number(diastolic));
    if let Some(pulse) = optional_f64(value, "pulse") {
        validate::pulse(pulse)?;
        values.insert("pulse".into(), Value::Number(pulse));
    }
    Ok(values)
}

fn extract_glucose(value: &Json) -> Result<Values, PayloadError> {
    let glucose = required_f64(value, "glucose")?;
    validate::glucose(glucose)?;
    let marker = optional_str(value, "marker").unwrap_or("none");
    let mut values = Values::new();
    values.insert("value".into(), Value::Number(glucose));
    values.insert("marker".into(), Value::Text(marker.to_string()));
    Ok(values)
}

fn extract_spo2(value: &Json) -> Result<Values, PayloadError> {
    let spo2 = required_f64(value, "spo2")?;
    validate::spo2(spo2)?;
    let mut values = Values::new();
    values.insert("spo2".into(), Value::Number(spo2));
    if let Some(pulse) = optional_f64(value, "pulse") {
        validate::pulse(pulse)?;
        values.insert("pulse".into(), Value::Number(pulse));
    }
    Ok(values)
}

fn extract_temp(value: &Json) -> Result<Values, PayloadError> {
    let temp = required_f64(value, "temp")?;
    validate::temp(temp)?;
    let mut values = Values::new();
    values.insert("value".into(), Value::Number(temp));
    Ok(values)
}
