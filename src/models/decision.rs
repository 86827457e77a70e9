use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// What the bin should do with the classified item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DecisionAction {
    Accept,
    Reject,
    ManualReview,
}

/// Physical compartment an accepted item is routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BinCompartment {
    Recyclable,
    Organic,
    General,
}

/// Outcome of applying the business rules to a job's classification.
///
/// Produced once per job and never mutated after it is attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: DecisionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_compartment: Option<BinCompartment>,
    pub message: String,
    pub confidence_threshold_met: bool,
    pub confidence_threshold: f64,
    pub rule_applied: String,
    pub rule_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        self.action == DecisionAction::Accept
    }

    pub fn is_rejected(&self) -> bool {
        self.action == DecisionAction::Reject
    }

    pub fn requires_manual_review(&self) -> bool {
        self.action == DecisionAction::ManualReview
    }

    /// Reasons form an audit trail: append only.
    pub fn add_reason(&mut self, reason: impl Into<String>) {
        self.reasons.push(reason.into());
    }

    pub fn validate(&self) -> Result<(), DecisionError> {
        if self.message.trim().is_empty() {
            return Err(DecisionError::EmptyMessage);
        }
        if self.is_accepted() && self.bin_compartment.is_none() {
            return Err(DecisionError::MissingCompartment);
        }
        if self.rule_applied.trim().is_empty() {
            return Err(DecisionError::MissingRule);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecisionError {
    #[error("decision message cannot be empty")]
    EmptyMessage,

    #[error("accepted decision must name a bin compartment")]
    MissingCompartment,

    #[error("decision must name the rule applied")]
    MissingRule,

    #[error("decision engine failed: {0}")]
    Engine(String),
}
