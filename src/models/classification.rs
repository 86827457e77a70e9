use serde::{Deserialize, Serialize};

/// Labels routed to the recyclable compartment.
pub const RECYCLABLE_LABELS: &[&str] = &[
    "plastic_bottle",
    "plastic_container",
    "glass_bottle",
    "aluminum_can",
    "paper",
    "cardboard",
];

/// Label routed to the organic compartment.
pub const ORGANIC_LABEL: &str = "organic_waste";

/// Below this confidence a classification goes to manual review.
pub const REVIEW_THRESHOLD: f64 = 0.7;

/// At or above this confidence a classification counts as high confidence.
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Result reported by the external classification service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
    #[serde(default)]
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub processing_time_ms: i64,
}

/// A lower-ranked prediction returned alongside the top label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alternative {
    pub label: String,
    pub confidence: f64,
}

impl Classification {
    /// Parse a raw callback payload and check it.
    pub fn from_payload(value: serde_json::Value) -> Result<Self, ClassificationError> {
        let parsed: Self = serde_json::from_value(value)
            .map_err(|e| ClassificationError::Malformed(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject payloads the orchestrator must not act on.
    pub fn validate(&self) -> Result<(), ClassificationError> {
        if self.label.trim().is_empty() {
            return Err(ClassificationError::EmptyLabel);
        }
        if !is_probability(self.confidence) {
            return Err(ClassificationError::ConfidenceOutOfRange(self.confidence));
        }
        if self.processing_time_ms < 0 {
            return Err(ClassificationError::NegativeProcessingTime(self.processing_time_ms));
        }
        for alt in &self.alternatives {
            if alt.label.trim().is_empty() || !is_probability(alt.confidence) {
                return Err(ClassificationError::MalformedAlternative(alt.label.clone()));
            }
        }
        Ok(())
    }

    pub fn is_recyclable(&self) -> bool {
        RECYCLABLE_LABELS.contains(&self.label.as_str())
    }

    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= HIGH_CONFIDENCE_THRESHOLD
    }

    pub fn should_review(&self) -> bool {
        self.confidence < REVIEW_THRESHOLD
    }

    pub fn top_alternatives(&self, n: usize) -> &[Alternative] {
        &self.alternatives[..n.min(self.alternatives.len())]
    }
}

fn is_probability(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ClassificationError {
    #[error("malformed classification: {0}")]
    Malformed(String),

    #[error("classification label is empty")]
    EmptyLabel,

    #[error("classification confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("classification processing time {0}ms is negative")]
    NegativeProcessingTime(i64),

    #[error("malformed alternative prediction '{0}'")]
    MalformedAlternative(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(label: &str, confidence: f64) -> Classification {
        Classification {
            label: label.to_string(),
            confidence,
            model_version: "v1.2.3".to_string(),
            alternatives: vec![
                Alternative { label: "glass_bottle".to_string(), confidence: 0.03 },
                Alternative { label: "aluminum_can".to_string(), confidence: 0.02 },
            ],
            processing_time_ms: 342,
        }
    }

    #[test]
    fn test_recyclable_vocabulary() {
        assert!(classification("plastic_bottle", 0.9).is_recyclable());
        assert!(classification("cardboard", 0.9).is_recyclable());
        assert!(!classification("organic_waste", 0.9).is_recyclable());
        assert!(!classification("unknown_item", 0.9).is_recyclable());
    }

    #[test]
    fn test_confidence_bands() {
        assert!(classification("paper", 0.8).is_high_confidence());
        assert!(!classification("paper", 0.79).is_high_confidence());
        assert!(classification("paper", 0.699_999).should_review());
        assert!(!classification("paper", 0.7).should_review());
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        assert_eq!(
            classification("paper", 1.2).validate(),
            Err(ClassificationError::ConfidenceOutOfRange(1.2))
        );
        assert!(classification("paper", f64::NAN).validate().is_err());
        assert!(classification("paper", 0.0).validate().is_ok());
        assert!(classification("paper", 1.0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_label_and_bad_alternatives() {
        assert_eq!(classification("  ", 0.5).validate(), Err(ClassificationError::EmptyLabel));

        let mut c = classification("paper", 0.5);
        c.alternatives.push(Alternative { label: "cardboard".to_string(), confidence: -0.1 });
        assert_eq!(
            c.validate(),
            Err(ClassificationError::MalformedAlternative("cardboard".to_string()))
        );
    }

    #[test]
    fn test_from_payload_rejects_mistyped_fields() {
        let parsed = Classification::from_payload(serde_json::json!({
            "label": "paper",
            "confidence": 0.82,
            "model_version": "v1.2.3"
        }))
        .unwrap();
        assert_eq!(parsed.label, "paper");
        assert_eq!(parsed.processing_time_ms, 0);

        let mistyped = serde_json::json!({ "label": "paper", "confidence": "high" });
        assert!(matches!(
            Classification::from_payload(mistyped),
            Err(ClassificationError::Malformed(_))
        ));
        let missing = serde_json::json!({ "label": "paper" });
        assert!(matches!(
            Classification::from_payload(missing),
            Err(ClassificationError::Malformed(_))
        ));
        assert_eq!(
            Classification::from_payload(serde_json::json!({ "label": "paper", "confidence": 2.0 })),
            Err(ClassificationError::ConfidenceOutOfRange(2.0))
        );
    }

    #[test]
    fn test_top_alternatives_truncates() {
        let c = classification("plastic_bottle", 0.94);
        assert_eq!(c.top_alternatives(1).len(), 1);
        assert_eq!(c.top_alternatives(5).len(), 2);
        assert_eq!(c.top_alternatives(1)[0].label, "glass_bottle");
    }
}
