//! Classification payloads as the classifier service reports them.
#![allow(dead_code)]

use serde_json::{json, Value};

use smart_bin_orchestrator::models::classification::{Alternative, Classification};

/// A classifier result and the decision it should produce.
#[derive(Debug, Clone)]
pub struct ClassificationFixture {
    pub label: &'static str,
    pub confidence: f64,
    pub expected_action: &'static str,
    pub expected_compartment: Option<&'static str>,
    pub description: &'static str,
}

pub const CLASSIFICATION_FIXTURES: &[ClassificationFixture] = &[
    ClassificationFixture {
        label: "plastic_bottle",
        confidence: 0.94,
        expected_action: "accept",
        expected_compartment: Some("recyclable"),
        description: "Clear PET bottle, high confidence",
    },
    ClassificationFixture {
        label: "aluminum_can",
        confidence: 0.88,
        expected_action: "accept",
        expected_compartment: Some("recyclable"),
        description: "Crushed can",
    },
    ClassificationFixture {
        label: "organic_waste",
        confidence: 0.81,
        expected_action: "accept",
        expected_compartment: Some("organic"),
        description: "Banana peel",
    },
    ClassificationFixture {
        label: "general_waste",
        confidence: 0.9,
        expected_action: "accept",
        expected_compartment: Some("general"),
        description: "Chip bag",
    },
    ClassificationFixture {
        label: "paper",
        confidence: 0.7,
        expected_action: "accept",
        expected_compartment: Some("recyclable"),
        description: "Exactly at the review threshold",
    },
    ClassificationFixture {
        label: "unknown_item",
        confidence: 0.5,
        expected_action: "manual_review",
        expected_compartment: None,
        description: "Ambiguous object",
    },
    ClassificationFixture {
        label: "glass_bottle",
        confidence: 0.69,
        expected_action: "manual_review",
        expected_compartment: None,
        description: "Just under the review threshold",
    },
];

pub fn classification(label: &str, confidence: f64) -> Classification {
    Classification {
        label: label.to_string(),
        confidence,
        model_version: "v1.2.3".to_string(),
        alternatives: vec![
            Alternative { label: "plastic_container".to_string(), confidence: 0.04 },
            Alternative { label: "glass_bottle".to_string(), confidence: 0.02 },
        ],
        processing_time_ms: 342,
    }
}

/// The same result as the raw JSON a callback carries.
pub fn classification_json(label: &str, confidence: f64) -> Value {
    serde_json::to_value(classification(label, confidence)).unwrap()
}

pub fn completed_callback(job_id: &str, label: &str, confidence: f64) -> Value {
    json!({
        "job_id": job_id,
        "status": "completed",
        "classification": {
            "label": label,
            "confidence": confidence,
            "model_version": "v1.2.3",
            "alternatives": [
                { "label": "plastic_container", "confidence": 0.04 }
            ],
            "processing_time_ms": 342
        }
    })
}

pub fn failed_callback(job_id: &str, error: &str) -> Value {
    json!({
        "job_id": job_id,
        "status": "failed",
        "error": error
    })
}
