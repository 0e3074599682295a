//! # Ready Condition
//!
//! Builds the canonical `Ready` condition from the outcome of a reconcile pass.

use super::READY;
use crate::constants;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{Condition, ConditionStatus};

/// Build the Ready condition for a reconcile outcome
///
/// `None` yields `Ready=True`; an error yields `Ready=False` with the error's
/// reason (or `ReconcileFailed`) and its message.
pub fn ready_condition(observed_generation: i64, err: Option<&ReconcilerError>) -> Condition {
    ReadyConditionBuilder::new(observed_generation)
        .with_error(err)
        .build()
}

/// Builder for the Ready condition
#[derive(Debug, Clone)]
pub struct ReadyConditionBuilder {
    observed_generation: i64,
    status: ConditionStatus,
    reason: Option<String>,
    message: String,
}

impl ReadyConditionBuilder {
    pub fn new(observed_generation: i64) -> Self {
        Self {
            observed_generation,
            status: ConditionStatus::True,
            reason: None,
            message: String::new(),
        }
    }

    /// Ready=Unknown; used for first-seen bookkeeping
    pub fn unknown(mut self) -> Self {
        self.status = ConditionStatus::Unknown;
        self
    }

    /// Override the reason; an explicit reason wins over the error's own
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_error(mut self, err: Option<&ReconcilerError>) -> Self {
        if let Some(err) = err {
            self.status = ConditionStatus::False;
            if self.reason.is_none() {
                self.reason = Some(
                    err.reason()
                        .unwrap_or(constants::REASON_RECONCILE_FAILED)
                        .to_string(),
                );
            }
            self.message = err.to_string();
        }
        self
    }

    pub fn build(self) -> Condition {
        let reason = self.reason.unwrap_or_else(|| match self.status {
            ConditionStatus::True => constants::REASON_READY.to_string(),
            ConditionStatus::Unknown => constants::REASON_INITIALIZING.to_string(),
            ConditionStatus::False => constants::REASON_RECONCILE_FAILED.to_string(),
        });
        Condition::new(READY, self.status, self.observed_generation)
            .with_reason(reason)
            .with_message(self.message)
    }
}
