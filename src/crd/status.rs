//! # Status Types
//!
//! Status substructures and the shared condition record.

use super::AppState;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a namespace-backed resource (CFOrg, CFSpace)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceBackedStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation of the spec last acted upon
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Externally visible identifier; equal to the resource name
    #[serde(default)]
    pub guid: Option<String>,
}

/// Status of a CFApp
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CFAppStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// State the workload has actually reached
    #[serde(default)]
    pub actual_state: Option<AppState>,
}

/// Status of a CFTask
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CFTaskStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Per-app sequence number assigned on first reconcile
    #[serde(default)]
    pub sequence_id: Option<i64>,
}

/// Status of a condition (True, False, Unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/// Condition represents a condition of a resource
///
/// At most one condition per `type` is kept in a status; see
/// [`crate::controller::conditions::set_condition`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition
    pub status: ConditionStatus,
    /// Machine readable reason for the last transition
    #[serde(default)]
    pub reason: String,
    /// Human readable details
    #[serde(default)]
    pub message: String,
    /// Generation of the resource this condition was computed from
    #[serde(default)]
    pub observed_generation: i64,
    /// Last time `status` changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Create a condition with no reason or message
    pub fn new(r#type: impl Into<String>, status: ConditionStatus, observed_generation: i64) -> Self {
        Self {
            r#type: r#type.into(),
            status,
            reason: String::new(),
            message: String::new(),
            observed_generation,
            last_transition_time: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
