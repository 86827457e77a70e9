use async_trait::async_trait;

use crate::models::classification::{Classification, ORGANIC_LABEL, REVIEW_THRESHOLD};
use crate::models::decision::{BinCompartment, Decision, DecisionAction, DecisionError};
use crate::models::job::Job;

pub const RULE_VERSION: &str = "1.0.0";

pub const RULE_LOW_CONFIDENCE: &str = "low_confidence_manual_review";
pub const RULE_MALFORMED: &str = "malformed_classification_manual_review";
pub const RULE_RECYCLABLE: &str = "recyclable_high_confidence";
pub const RULE_ORGANIC: &str = "organic_high_confidence";
pub const RULE_GENERAL: &str = "general_waste_default";

/// Turns a job's classification into a decision.
#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn decide(&self, job: &Job, classification: &Classification) -> Result<Decision, DecisionError>;
}

/// Local recyclability rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleDecisionEngine;

#[async_trait]
impl DecisionEngine for RuleDecisionEngine {
    async fn decide(&self, _job: &Job, classification: &Classification) -> Result<Decision, DecisionError> {
        Ok(decide(classification))
    }
}

pub fn compartment_for(classification: &Classification) -> BinCompartment {
    if classification.is_recyclable() {
        BinCompartment::Recyclable
    } else if classification.label == ORGANIC_LABEL {
        BinCompartment::Organic
    } else {
        BinCompartment::General
    }
}

/// Apply the rules. Never fails: data it cannot trust goes to manual review.
pub fn decide(classification: &Classification) -> Decision {
    if classification.validate().is_err() {
        let mut decision = manual_review(RULE_MALFORMED, "Unreadable classification - manual review required");
        decision.add_reason(format!(
            "Classification for label '{}' failed validation",
            classification.label
        ));
        return decision;
    }

    let pct = classification.confidence * 100.0;

    if classification.should_review() {
        let mut decision = manual_review(RULE_LOW_CONFIDENCE, "Low confidence - manual review required");
        decision.add_reason(format!(
            "Confidence {:.1}% is below the {:.0}% review threshold",
            pct,
            REVIEW_THRESHOLD * 100.0
        ));
        if let Some(alt) = classification.top_alternatives(1).first() {
            decision.add_reason(format!(
                "Next candidate: {} ({:.1}%)",
                alt.label,
                alt.confidence * 100.0
            ));
        }
        return decision;
    }

    let compartment = compartment_for(classification);
    let (rule, message) = match compartment {
        BinCompartment::Recyclable => (
            RULE_RECYCLABLE,
            format!("{} accepted in recyclable compartment", classification.label),
        ),
        BinCompartment::Organic => (
            RULE_ORGANIC,
            format!("{} accepted in organic compartment", classification.label),
        ),
        BinCompartment::General => (
            RULE_GENERAL,
            format!("{} accepted in general compartment", classification.label),
        ),
    };

    let mut decision = Decision {
        action: DecisionAction::Accept,
        bin_compartment: Some(compartment),
        message,
        confidence_threshold_met: true,
        confidence_threshold: REVIEW_THRESHOLD,
        rule_applied: rule.to_string(),
        rule_version: RULE_VERSION.to_string(),
        reasons: Vec::new(),
    };
    decision.add_reason(format!("Confidence {:.1}% meets the review threshold", pct));
    decision.add_reason(format!("Label {} maps to {} compartment", classification.label, compartment));
    decision
}

fn manual_review(rule: &str, message: &str) -> Decision {
    Decision {
        action: DecisionAction::ManualReview,
        bin_compartment: None,
        message: message.to_string(),
        confidence_threshold_met: false,
        confidence_threshold: REVIEW_THRESHOLD,
        rule_applied: rule.to_string(),
        rule_version: RULE_VERSION.to_string(),
        reasons: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classification::Alternative;

    fn classification(label: &str, confidence: f64) -> Classification {
        Classification {
            label: label.to_string(),
            confidence,
            model_version: "v1.2.3".to_string(),
            alternatives: vec![Alternative { label: "glass_bottle".to_string(), confidence: 0.03 }],
            processing_time_ms: 342,
        }
    }

    #[test]
    fn test_recyclable_label_is_accepted() {
        let d = decide(&classification("plastic_bottle", 0.94));
        assert_eq!(d.action, DecisionAction::Accept);
        assert_eq!(d.bin_compartment, Some(BinCompartment::Recyclable));
        assert!(d.confidence_threshold_met);
        assert_eq!(d.rule_applied, RULE_RECYCLABLE);
        assert_eq!(d.reasons.len(), 2);
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_compartment_lookup() {
        for label in ["plastic_container", "glass_bottle", "aluminum_can", "paper", "cardboard"] {
            assert_eq!(compartment_for(&classification(label, 0.9)), BinCompartment::Recyclable);
        }
        assert_eq!(compartment_for(&classification("organic_waste", 0.9)), BinCompartment::Organic);
        assert_eq!(compartment_for(&classification("general_waste", 0.9)), BinCompartment::General);
        assert_eq!(compartment_for(&classification("styrofoam", 0.9)), BinCompartment::General);
    }

    #[test]
    fn test_threshold_boundary() {
        let at = decide(&classification("paper", 0.7));
        assert_eq!(at.action, DecisionAction::Accept);
        assert!(at.confidence_threshold_met);

        let below = decide(&classification("paper", 0.699_999));
        assert_eq!(below.action, DecisionAction::ManualReview);
        assert!(!below.confidence_threshold_met);
        assert_eq!(below.bin_compartment, None);
        assert_eq!(below.rule_applied, RULE_LOW_CONFIDENCE);
    }

    #[test]
    fn test_unknown_low_confidence_goes_to_review() {
        let d = decide(&classification("unknown_item", 0.5));
        assert!(d.requires_manual_review());
        assert!(d.reasons[0].contains("50.0%"));
        assert!(d.reasons[1].contains("glass_bottle"));
    }

    #[test]
    fn test_malformed_data_degrades_to_review() {
        let d = decide(&classification("paper", f64::NAN));
        assert!(d.requires_manual_review());
        assert_eq!(d.rule_applied, RULE_MALFORMED);
        assert!(d.validate().is_ok());
    }
}
