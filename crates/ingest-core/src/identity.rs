use serde::{Deserialize, Serialize};

/// Opaque patient identifier. Demographics and back-pointers are owned by
/// the external admin surface and are not reasoned about here (spec §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HospitalId(pub String);

/// AVA4 gateway box, keyed by gateway MAC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayBox {
    pub gateway_mac: String,
    pub patient_id: Option<PatientId>,
}

/// Sparse per-patient mapping of BLE sub-device kind to sub-device MAC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubDeviceRegistry {
    pub patient_id: PatientId,
    pub entries: Vec<SubDeviceRegistryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubDeviceRegistryEntry {
    pub kind: crate::model::SubDeviceKind,
    pub sub_device_mac: String,
}

/// Kati cellular wrist monitor, keyed by IMEI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    pub imei: String,
    pub patient_id: Option<PatientId>,
}

/// Qube-Vital hospital box, keyed by IMEI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HospitalBox {
    pub imei: String,
    pub hospital_id: Option<HospitalId>,
}

/// Confidence level assigned by the identity resolver (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    Exact,
    Conflict,
    Unresolved,
}

/// Result of resolving a `CanonicalObservation`'s identifiers to an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub patient_id: Option<PatientId>,
    pub hospital_id: Option<HospitalId>,
    pub confidence: Confidence,
}

impl Resolution {
    pub fn unresolved() -> Self {
        Self {
            patient_id: None,
            hospital_id: None,
            confidence: Confidence::Unresolved,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.patient_id.is_some() || self.hospital_id.is_some()
    }

    /// `subject` reference for the FHIR projector, or `None` to skip the
    /// FHIR write entirely (spec §3.4, §8: unresolved ⇒ no Observation).
    pub fn fhir_subject(&self) -> Option<String> {
        if let Some(p) = &self.patient_id {
            Some(format!("Patient/{}", p.0))
        } else {
            // Open Question 3 (see DESIGN.md): hospital-scoped samples use a
            // Patient/ placeholder pending confirmation of Organization vs Group.
            self.hospital_id.as_ref().map(|h| format!("Patient/{}", h.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_has_no_subject() {
        let r = Resolution::unresolved();
        assert!(!r.is_resolved());
        assert_eq!(r.fhir_subject(), None);
    }

    #[test]
    fn resolved_patient_has_subject() {
        let r = Resolution {
            patient_id: Some(PatientId("P1".into())),
            hospital_id: None,
            confidence: Confidence::Exact,
        };
        assert_eq!(r.fhir_subject().as_deref(), Some("Patient/P1"));
    }
}
