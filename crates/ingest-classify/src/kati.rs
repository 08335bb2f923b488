//! Kati wrist monitor dispatch table (spec §4.4, §6.2).
//!
//! Topic shape is `iMEDE_watch/<suffix>`; the suffix alone discriminates the
//! sample kind. All Kati payloads carry `IMEI` at the top level.

use ingest_core::{BatchSample, CanonicalObservation, Instant, PayloadError, SourceVendor, SubDeviceKind, Value, Values};
use serde_json::Value as Json;

use crate::json_ext::{optional_f64, optional_str, required_f64, required_str, time_field};
use crate::validate;

pub fn classify(topic: &str, json: &Json, received: Instant, raw: Vec<u8>) -> Result<CanonicalObservation, PayloadError> {
    let imei = required_str(json, "IMEI")?.to_string();
    let suffix = topic
        .rsplit('/')
        .next()
        .ok_or_else(|| PayloadError::UnknownTopic(topic.to_string()))?;

    let envelope_time = time_field(json, "time", received);

    let (kind, values, batch) = match suffix {
        "hb" => (SubDeviceKind::DeviceStatus, extract_heartbeat(json)?, None),
        "VitalSign" => extract_vital_sign(json)?,
        "AP55" => {
            let batch = extract_batch(json, envelope_time)?;
            (SubDeviceKind::BatchVitals, Values::new(), Some(batch))
        }
        "location" => (SubDeviceKind::Location, extract_location(json)?, None),
        "sleepdata" => (SubDeviceKind::Sleep, extract_sleep(json)?, None),
        "sos" | "SOS" => (SubDeviceKind::Sos, single_flag(json, "sos"), None),
        "fallDown" | "FALLDOWN" => (SubDeviceKind::Fall, single_flag(json, "fall"), None),
        "onlineTrigger" => (SubDeviceKind::DeviceStatus, online_trigger(json)?, None),
        other => return Err(PayloadError::UnknownDiscriminator(other.to_string())),
    };

    let mut obs = CanonicalObservation::new(
        SourceVendor::Kati,
        topic.to_string(),
        kind,
        envelope_time,
        received,
        values,
        raw,
    );
    obs.device_imei = Some(imei);
    obs.batch = batch;
    Ok(obs)
}

/// The `hb` heartbeat carries device-health telemetry in addition to step
/// count, per the original listener's handling of this topic.
fn extract_heartbeat(json: &Json) -> Result<Values, PayloadError> {
    let mut values = Values::new();
    if let Some(step) = optional_f64(json, "step") {
        values.insert("steps".into(), Value::Number(step));
    }
    if let Some(battery) = optional_f64(json, "battery") {
        values.insert("battery".into(), Value::Number(battery));
    }
    if let Some(signal) = optional_f64(json, "signalGSM") {
        values.insert("signal_gsm".into(), Value::Number(signal));
    }
    if let Some(satellites) = optional_f64(json, "satellites") {
        values.insert("satellites".into(), Value::Number(satellites));
    }
    if let Some(mode) = optional_str(json, "workingMode") {
        values.insert("working_mode".into(), Value::Text(mode.to_string()));
    }
    values.insert("status".into(), Value::Text("online".to_string()));
    Ok(values)
}

/// `VitalSign` (and each `AP55` batch item) shares one shape: `heartRate`,
/// `spO2`, `bloodPressure: {bp_sys, bp_dia}`, and `bodyTemperature` may all
/// be present together; which one decides the canonical kind follows
/// priority bp > spo2 > temp, with `heartRate` folded in as `pulse` when the
/// winning kind isn't already a heart-rate reading.
fn extract_vital_sign(item: &Json) -> Result<(SubDeviceKind, Values), PayloadError> {
    let mut values = Values::new();
    let heart_rate = optional_f64(item, "heartRate");

    if let Some(bp) = item.get("bloodPressure") {
        let systolic = required_f64(bp, "bp_sys")?;
        let diastolic = required_f64(bp, "bp_dia")?;
        validate::systolic(systolic)?;
        validate::diastolic(diastolic)?;
        values.insert("systolic".into(), Value::Number(systolic));
        values.insert("diastolic".into(), Value::Number(diastolic));
        if let Some(pulse) = heart_rate {
            validate::pulse(pulse)?;
            values.insert("pulse".into(), Value::Number(pulse));
        }
        return Ok((SubDeviceKind::Bp, values));
    }

    if let Some(spo2) = optional_f64(item, "spO2") {
        validate::spo2(spo2)?;
        values.insert("spo2".into(), Value::Number(spo2));
        if let Some(pulse) = heart_rate {
            validate::pulse(pulse)?;
            values.insert("pulse".into(), Value::Number(pulse));
        }
        return Ok((SubDeviceKind::Spo2, values));
    }

    if let Some(temp) = optional_f64(item, "bodyTemperature") {
        validate::temp(temp)?;
        values.insert("value".into(), Value::Number(temp));
        return Ok((SubDeviceKind::Temp, values));
    }

    Err(PayloadError::SchemaViolation { field: "heartRate|spO2|bloodPressure|bodyTemperature".into() })
}

/// `AP55` is a batch of vital-sign samples collected while the watch was out
/// of coverage (spec §6.2). Individual items carry no timestamp of their
/// own, so every sample in the batch shares the envelope's `time`/`timeStamps`.
fn extract_batch(json: &Json, envelope_time: Instant) -> Result<Vec<BatchSample>, PayloadError> {
    let items = json
        .get("data")
        .and_then(Json::as_array)
        .ok_or_else(|| PayloadError::SchemaViolation { field: "data".into() })?;

    let mut batch = Vec::with_capacity(items.len());
    for item in items {
        let (kind, values) = extract_vital_sign(item)?;
        batch.push(BatchSample { effective_time: envelope_time, kind, values });
    }
    Ok(batch)
}

fn extract_location(json: &Json) -> Result<Values, PayloadError> {
    let location = json
        .get("location")
        .ok_or_else(|| PayloadError::SchemaViolation { field: "location".into() })?;
    let gps = location
        .get("GPS")
        .ok_or_else(|| PayloadError::SchemaViolation { field: "location.GPS".into() })?;
    let lat = required_f64(gps, "latitude")?;
    let lng = required_f64(gps, "longitude")?;
    let mut values = Values::new();
    values.insert("latitude".into(), Value::Number(lat));
    values.insert("longitude".into(), Value::Number(lng));
    if let Some(speed) = optional_f64(gps, "speed") {
        values.insert("speed".into(), Value::Number(speed));
    }
    if let Some(wifi) = optional_str(location, "WiFi") {
        values.insert("wifi".into(), Value::Text(wifi.to_string()));
    }
    Ok(values)
}

fn extract_sleep(json: &Json) -> Result<Values, PayloadError> {
    let mut values = Values::new();
    if let Some(v) = optional_str(json, "sleepData") {
        values.insert("sleep_data".into(), Value::Text(v.to_string()));
    }
    Ok(values)
}

fn single_flag(json: &Json, name: &str) -> Values {
    let mut values = Values::new();
    values.insert(name.into(), Value::Bool(true));
    if let Some(status) = optional_str(json, "status") {
        values.insert("status".into(), Value::Text(status.to_string()));
    }
    values
}

fn online_trigger(json: &Json) -> Result<Values, PayloadError> {
    let mut values = Values::new();
    values.insert("status".into(), Value::Text("online".to_string()));
    if let Some(battery) = optional_f64(json, "battery") {
        values.insert("battery".into(), Value::Number(battery));
    }
    Ok(values)
}
