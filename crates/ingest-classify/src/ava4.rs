//! AVA4 BLE gateway dispatch table (spec §4.3, §6.2).
//!
//! Topics: `ESP32_BLE_GW_TX`, `dusun_sub` (envelope carrying a BLE sample,
//! discriminated by `deviceCode`), `dusun_status` (gateway device status).

use ingest_core::{CanonicalObservation, Instant, PayloadError, SourceVendor, SubDeviceKind, Value, Values};
use serde_json::Value as Json;

use crate::json_ext::{optional_f64, optional_str, required_f64, required_object, required_str, time_field};
use crate::validate;

pub fn classify(topic: &str, json: &Json, received: Instant, raw: Vec<u8>) -> Result<CanonicalObservation, PayloadError> {
    let gateway_mac = required_str(json, "mac")?.to_string();
    let envelope_time = time_field(json, "time", received);

    if topic == "dusun_status" {
        return classify_status(json, &gateway_mac, envelope_time, received, raw);
    }

    // dusun_sub / ESP32_BLE_GW_TX: envelope carries data.attribute (== deviceCode)
    // and data.value with the sample payload.
    let device_code = required_str(json, "deviceCode")?;
    let data = required_object(json, "data")?;
    let sub_mac = optional_str(data, "mac").map(|s| s.to_string());
    let value = required_object(data, "value")?;

    let (kind, values) = match device_code {
        "BP_BIOLIGTH" => (SubDeviceKind::Bp, extract_bp(value)?),
        "BLOOD_SUGAR" => (SubDeviceKind::Glucose, extract_glucose(value)?),
        "SpO2" => (SubDeviceKind::Spo2, extract_spo2(value)?),
        "BODY_TEMP" => (SubDeviceKind::Temp, extract_temp(value)?),
        "BODY_SCALE" => (SubDeviceKind::Weight, extract_weight(value)?),
        "CHOLESTEROL" => (SubDeviceKind::Chol, extract_single(value, "cholesterol", |_| Ok(()))?),
        "URIC" => (SubDeviceKind::Ua, extract_single(value, "uric_acid", |_| Ok(()))?),
        "SALT" => (SubDeviceKind::Salt, extract_single(value, "salt", |_| Ok(()))?),
        other => return Err(PayloadError::UnknownDiscriminator(other.to_string())),
    };

    let mut obs = CanonicalObservation::new(
        SourceVendor::Ava4,
        topic.to_string(),
        kind,
        envelope_time,
        received,
        values,
        raw,
    );
    obs.gateway_mac = Some(gateway_mac);
    obs.sub_device_mac = sub_mac;
    Ok(obs)
}

fn classify_status(
    json: &Json,
    gateway_mac: &str,
    effective: Instant,
    received: Instant,
    raw: Vec<u8>,
) -> Result<CanonicalObservation, PayloadError> {
    let status = required_str(json, "status")?;
    let mut values = Values::new();
    values.insert("status".into(), Value::Text(status.to_string()));
    if let Some(battery) = optional_f64(json, "battery") {
        values.insert("battery".into(), Value::Number(battery));
    }
    if let Some(signal) = optional_f64(json, "signal") {
        values.insert("signal".into(), Value::Number(signal));
    }
    let mut obs = CanonicalObservation::new(
        SourceVendor::Ava4,
        "dusun_status".to_string(),
        SubDeviceKind::DeviceStatus,
        effective,
        received,
        values,
        raw,
    );
    obs.gateway_mac = Some(gateway_mac.to_string());
    Ok(obs)
}

/// BP sample lives under `device_list[0]` per the §6.2 example envelope.
fn first_device(value: &Json) -> Result<&Json, PayloadError> {
    value
        .get("device_list")
        .and_then(Json::as_array)
        .and_then(|list| list.first())
        .ok_or_else(|| PayloadError::SchemaViolation { field: "data.value.device_list".into() })
}

fn extract_bp(value: &Json) -> Result<Values, PayloadError> {
    let sample = first_device(value)?;
    let systolic = required_f64(sample, "bp_high")?;
    let diastolic = required_f64(sample, "bp_low")?;
    validate::systolic(systolic)?;
    validate::diastolic(diastolic)?;
    let mut values = Values::new();
    values.insert("systolic".into(), Value::Number(systolic));
    values.insert("diastolic".into(), Value::Number(diastolic));
    if let Some(pr) = optional_f64(sample, "PR") {
        validate::pulse(pr)?;
        values.insert("pulse".into(), Value::Number(pr));
    }
    Ok(values)
}

fn extract_glucose(value: &Json) -> Result<Values, PayloadError> {
    let sample = first_device(value)?;
    let glucose = required_f64(sample, "blood_glucose")?;
    validate::glucose(glucose)?;
    let marker = optional_str(sample, "marker").unwrap_or("none");
    let mut values = Values::new();
    values.insert("value".into(), Value::Number(glucose));
    values.insert("marker".into(), Value::Text(marker.to_string()));
    Ok(values)
}

fn extract_spo2(value: &Json) -> Result<Values, PayloadError> {
    let sample = first_device(value)?;
    let spo2 = required_f64(sample, "spo2")?;
    validate::spo2(spo2)?;
    let mut values = Values::new();
    values.insert("spo2".into(), Value::Number(spo2));
    if let Some(pulse) = optional_f64(sample, "pulse") {
        validate::pulse(pulse)?;
        values.insert("pulse".into(), Value::Number(pulse));
    }
    if let Some(resp) = optional_f64(sample, "resp_rate") {
        values.insert("respiration".into(), Value::Number(resp));
    }
    Ok(values)
}

fn extract_temp(value: &Json) -> Result<Values, PayloadError> {
    let sample = first_device(value)?;
    let temp = required_f64(sample, "temp")?;
    validate::temp(temp)?;
    let mut values = Values::new();
    values.insert("value".into(), Value::Number(temp));
    Ok(values)
}

fn extract_weight(value: &Json) -> Result<Values, PayloadError> {
    let sample = first_device(value)?;
    let weight = required_f64(sample, "weight")?;
    validate::weight(weight)?;
    let mut values = Values::new();
    values.insert("weight".into(), Value::Number(weight));
    if let Some(bmi) = optional_f64(sample, "bmi") {
        values.insert("bmi".into(), Value::Number(bmi));
    }
    Ok(values)
}

fn extract_single(
    value: &Json,
    field: &str,
    check: impl Fn(f64) -> Result<(), PayloadError>,
) -> Result<Values, PayloadError> {
    let sample = first_device(value)?;
    let v = required_f64(sample, field)?;
    check(v)?;
    let mut values = Values::new();
    values.insert("value".into(), Value::Number(v));
    Ok(values)
}
