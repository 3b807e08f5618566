//! Primitive-local validation outcomes.

use serde::{Deserialize, Serialize};

/// Outcome class of a primitive's local check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Continue planning
    Pass,

    /// Abort planning at this step
    Fail,

    /// Informational only; planning continues
    Warning,
}

/// Result of a primitive's local `validate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub status: ValidationStatus,

    /// Human-readable explanation
    pub reason: String,

    /// Constraint tag (e.g. "table_collision", "no_object_held")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,

    /// Offending waypoint, when the check is positional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waypoint_index: Option<usize>,
}

impl ValidationResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Pass,
            reason: reason.into(),
            constraint: None,
            waypoint_index: None,
        }
    }

    pub fn fail(reason: impl Into<String>, constraint: &str) -> Self {
        Self {
            status: ValidationStatus::Fail,
            reason: reason.into(),
            constraint: Some(constraint.to_string()),
            waypoint_index: None,
        }
    }

    pub fn warning(reason: impl Into<String>, constraint: &str) -> Self {
        Self {
            status: ValidationStatus::Warning,
            reason: reason.into(),
            constraint: Some(constraint.to_string()),
            waypoint_index: None,
        }
    }

    /// Attach the index of the offending waypoint
    pub fn at_waypoint(mut self, index: usize) -> Self {
        self.waypoint_index = Some(index);
        self
    }

    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Pass
    }

    pub fn failed(&self) -> bool {
        self.status == ValidationStatus::Fail
    }
}
