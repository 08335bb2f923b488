//! FHIR R5 `Observation` resource shapes (spec §3.4). Typed to the fields
//! the projector actually emits rather than a full R5 schema, matching the
//! resource model's own minimal-field approach.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Coding {
    pub system: &'static str,
    pub code: &'static str,
    pub display: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

impl CodeableConcept {
    pub fn loinc(code: &'static str, display: &'static str) -> Self {
        Self { coding: vec![Coding { system: "http://loinc.org", code, display }] }
    }

    pub fn vital_signs_category() -> Self {
        Self {
            coding: vec![Coding {
                system: "http://terminology.hl7.org/CodeSystem/observation-category",
                code: "vital-signs",
                display: "Vital Signs",
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reference {
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: &'static str,
    pub system: &'static str,
    pub code: &'static str,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ObservationComponent {
    pub code: Option<CodeableConcept>,
    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
}

/// A FHIR R5 `Observation`, serialized verbatim as the writer's request body.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    #[serde(rename = "resourceType")]
    pub resource_type: &'static str,
    pub status: &'static str,
    pub category: Vec<CodeableConcept>,
    pub code: CodeableConcept,
    pub subject: Reference,
    pub performer: Vec<Reference>,
    #[serde(rename = "effectiveDateTime")]
    pub effective_date_time: String,
    pub issued: String,
    #[serde(rename = "valueQuantity", skip_serializing_if = "Option::is_none")]
    pub value_quantity: Option<Quantity>,
    #[serde(rename = "valueString", skip_serializing_if = "Option::is_none")]
    pub value_string: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub component: Vec<ObservationComponent>,
}

impl Observation {
    pub fn new(code: CodeableConcept, subject: Reference, performer: Reference, effective: String, issued: String) -> Self {
        Self {
            resource_type: "Observation",
            status: "final",
            category: vec![CodeableConcept::vital_signs_category()],
            code,
            subject,
            performer: vec![performer],
            effective_date_time: effective,
            issued,
            value_quantity: None,
            value_string: None,
            component: Vec::new(),
        }
    }
}
