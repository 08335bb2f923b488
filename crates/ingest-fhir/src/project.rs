//! FHIR projector (C4, spec §4.4 / §3.4).

use ingest_core::{BatchSample, CanonicalObservation, Resolution, SubDeviceKind, Values};

use crate::model::{CodeableConcept, Observation, ObservationComponent, Quantity, Reference};

const UCUM: &str = "http://unitsofmeasure.org";

/// Projects a resolved canonical record into zero or more FHIR Observations.
///
/// Unresolved records produce an empty projection (spec §3.4, §8); `batch_vitals`
/// expands to one Observation per sample, each carrying the envelope's identity
/// but its own `effective_time` and values (spec §4.4).
pub fn project(obs: &CanonicalObservation, resolution: &Resolution) -> Vec<Observation> {
    let Some(subject) = resolution.fhir_subject() else {
        return Vec::new();
    };
    let performer = Reference { reference: format!("Device/{}", obs.performer_id()) };

    if let Some(batch) = &obs.batch {
        return batch
            .iter()
            .filter_map(|sample| project_sample(sample.kind, &sample.values, sample.effective_time.to_string(), &subject, &performer))
            .collect();
    }

    project_sample(obs.sub_device_kind, &obs.values, obs.effective_time.to_string(), &subject, &performer)
        .into_iter()
        .collect()
}

fn project_sample(
    kind: SubDeviceKind,
    values: &Values,
    effective: String,
    subject: &str,
    performer: &Reference,
) -> Option<Observation> {
    let issued = ingest_core::now_utc().to_string();
    let subject = Reference { reference: subject.to_string() };

    let obs = match kind {
        SubDeviceKind::Bp => {
            let mut o = Observation::new(CodeableConcept::loinc("85354-9", "Blood pressure panel"), subject, performer.clone(), effective, issued);
            o.component.push(component("8480-6", "Systolic blood pressure", num(values, "systolic")?, "mm[Hg]"));
            o.component.push(component("8462-4", "Diastolic blood pressure", num(values, "diastolic")?, "mm[Hg]"));
            o
        }
        SubDeviceKind::Spo2 => {
            let mut o = Observation::new(CodeableConcept::loinc("2708-6", "Oxygen saturation"), subject, performer.clone(), effective, issued);
            let spo2 = num(values, "spo2")?;
            match num(values, "pulse") {
                Some(pulse) => {
                    o.component.push(component("2708-6", "Oxygen saturation", spo2, "%"));
                    o.component.push(component("8867-4", "Heart rate", pulse, "/min"));
                }
                None => o.value_quantity = Some(Quantity { value: spo2, unit: "%", system: UCUM, code: "%" }),
            }
            o
        }
        SubDeviceKind::Temp => {
            let mut o = Observation::new(CodeableConcept::loinc("8310-5", "Body temperature"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "value")?, unit: "Cel", system: UCUM, code: "Cel" });
            o
        }
        SubDeviceKind::Glucose => {
            let mut o = Observation::new(CodeableConcept::loinc("15074-8", "Glucose [Mass/volume] in Blood"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "value")?, unit: "mg/dL", system: UCUM, code: "mg/dL" });
            o
        }
        SubDeviceKind::Weight => {
            let mut o = Observation::new(CodeableConcept::loinc("29463-7", "Body weight"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "weight")?, unit: "kg", system: UCUM, code: "kg" });
            o
        }
        SubDeviceKind::Chol => {
            let mut o = Observation::new(CodeableConcept::loinc("2093-3", "Cholesterol [Mass/volume] in Serum or Plasma"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "value")?, unit: "mg/dL", system: UCUM, code: "mg/dL" });
            o
        }
        SubDeviceKind::Ua => {
            let mut o = Observation::new(CodeableConcept::loinc("3084-1", "Urate [Mass/volume] in Serum or Plasma"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "value")?, unit: "mg/dL", system: UCUM, code: "mg/dL" });
            o
        }
        SubDeviceKind::Salt => {
            let mut o = Observation::new(CodeableConcept::loinc("2951-2", "Sodium [Moles/volume] in Serum or Plasma"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "value")?, unit: "mmol/L", system: UCUM, code: "mmol/L" });
            o
        }
        SubDeviceKind::Steps => {
            let mut o = Observation::new(CodeableConcept::loinc("55423-8", "Number of steps"), subject, performer.clone(), effective, issued);
            o.value_quantity = Some(Quantity { value: num(values, "steps")?, unit: "steps", system: UCUM, code: "1" });
            o
        }
        SubDeviceKind::Sleep => {
            let mut o = Observation::new(CodeableConcept::loinc("93832-4", "Sleep summary"), subject, performer.clone(), effective, issued);
            o.value_string = values.get("sleep_data").and_then(|v| v.as_str()).map(str::to_string);
            o
        }
        SubDeviceKind::Location => {
            let mut o = Observation::new(CodeableConcept::loinc("86711-2", "Location of observation"), subject, performer.clone(), effective, issued);
            let lat = num(values, "latitude")?;
            let lng = num(values, "longitude")?;
            o.value_string = Some(format!("{lat},{lng}"));
            o
        }
        SubDeviceKind::DeviceStatus => {
            let mut o = Observation::new(CodeableConcept::loinc("75275-8", "Device status"), subject, performer.clone(), effective, issued);
            o.value_string = values.get("status").and_then(|v| v.as_str()).map(str::to_string);
            o
        }
        // Fall/sos are discrete lifecycle events, not vital-sign measurements;
        // they are recorded in history and the event stream but not projected
        // to a FHIR Observation (see DESIGN.md Open Question decisions).
        SubDeviceKind::Fall | SubDeviceKind::Sos => return None,
        SubDeviceKind::BatchVitals => return None,
    };
    Some(obs)
}

fn num(values: &Values, key: &str) -> Option<f64> {
    values.get(key).and_then(|v| v.as_f64())
}

fn component(code: &'static str, display: &'static str, value: f64, unit: &'static str) -> ObservationComponent {
    ObservationComponent {
        code: Some(CodeableConcept::loinc(code, display)),
        value_quantity: Some(Quantity { value, unit, system: UCUM, code: unit }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_core::{CanonicalObservation, Confidence, Instant, PatientId, SourceVendor, Value};

    fn resolved() -> Resolution {
        Resolution { patient_id: Some(PatientId("P1".into())), hospital_id: None, confidence: Confidence::Exact }
    }

    #[test]
    fn unresolved_projects_to_nothing() {
        let mut values = Values::new();
        values.insert("systolic".into(), Value::Number(120.0));
        values.insert("diastolic".into(), Value::Number(80.0));
        let obs = CanonicalObservation::new(SourceVendor::Ava4, "dusun_sub", SubDeviceKind::Bp, Instant::now(), Instant::now(), values, vec![]);
        assert!(project(&obs, &Resolution::unresolved()).is_empty());
    }

    #[test]
    fn bp_projects_one_resource_with_two_components() {
        let mut values = Values::new();
        values.insert("systolic".into(), Value::Number(128.0));
        values.insert("diastolic".into(), Value::Number(82.0));
        values.insert("pulse".into(), Value::Number(76.0));
        let obs = CanonicalObservation::new(SourceVendor::Ava4, "dusun_sub", SubDeviceKind::Bp, Instant::now(), Instant::now(), values, vec![]);
        let projected = project(&obs, &resolved());
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].component.len(), 2);
        assert_eq!(projected[0].code.coding[0].code, "85354-9");
    }

    #[test]
    fn batch_vitals_expands_to_one_resource_per_sample() {
        let mut v1 = Values::new();
        v1.insert("spo2".into(), Value::Number(97.0));
        let mut v2 = Values::new();
        v2.insert("value".into(), Value::Number(36.6));
        let mut obs = CanonicalObservation::new(
            SourceVendor::Kati,
            "iMEDE_watch/AP55",
            SubDeviceKind::BatchVitals,
            Instant::now(),
            Instant::now(),
            Values::new(),
            vec![],
        );
        obs.batch = Some(vec![
            BatchSample { effective_time: Instant::now(), kind: SubDeviceKind::Spo2, values: v1 },
            BatchSample { effective_time: Instant::now(), kind: SubDeviceKind::Temp, values: v2 },
        ]);
        let projected = project(&obs, &resolved());
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn fall_event_has_no_fhir_projection() {
        let mut values = Values::new();
        values.insert("fall".into(), Value::Bool(true));
        let obs = CanonicalObservation::new(SourceVendor::Kati, "iMEDE_watch/fallDown", SubDeviceKind::Fall, Instant::now(), Instant::now(), values, vec![]);
        assert!(project(&obs, &resolved()).is_empty());
    }
}
