//! # Reconciler Types
//!
//! The domain reconcile contract, its requeue directive and its error types.

use crate::store::StoreError;
use async_trait::async_trait;
use kube_runtime::controller::Action;
use std::time::Duration;

/// What the work-queue should do after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Nothing to do until the object changes
    Done,
    /// Revisit the object after the given delay
    After(Duration),
}

impl Requeue {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Self {
        match requeue {
            Requeue::Done => Action::await_change(),
            Requeue::After(delay) => Action::requeue(delay),
        }
    }
}

/// A precondition for readiness is not met yet
///
/// Carries the Ready condition reason for the failing step. With
/// `requeue_after` set it is not an error at all: the pass ends with a plain
/// delayed requeue and the reason is only recorded on the condition.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct NotReadyError {
    pub reason: String,
    pub message: String,
    pub requeue_after: Option<Duration>,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl NotReadyError {
    pub fn new(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            message: reason.clone(),
            reason,
            requeue_after: None,
            cause: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Wrap a lower-level error; its text is appended to the message
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.message = format!("{}: {cause}", self.message);
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_requeue_after(mut self, delay: Duration) -> Self {
        self.requeue_after = Some(delay);
        self
    }
}

/// Errors returned by a reconcile pass
#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    NotReady(#[from] NotReadyError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcilerError {
    /// Ready condition reason carried by the error, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::NotReady(err) => Some(&err.reason),
            Self::Store(_) => None,
        }
    }

    /// Turn a "not ready, come back later" error into a plain requeue
    pub fn into_requeue(self) -> Result<Requeue, Self> {
        match self {
            Self::NotReady(NotReadyError {
                requeue_after: Some(delay),
                ..
            }) => Ok(Requeue::After(delay)),
            other => Err(other),
        }
    }
}

/// Domain reconcile function driven by the patching reconciler
///
/// Implementations mutate `obj` (status and spec) in place; the caller
/// persists whatever they changed, whether or not they return an error.
#[async_trait]
pub trait ObjectReconciler<K>: Send + Sync {
    async fn reconcile_resource(&self, obj: &mut K) -> Result<Requeue, ReconcilerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_message_includes_cause() {
        let err = NotReadyError::new("NamespaceCreation")
            .with_message("failed to create namespace \"foo\"")
            .with_cause(StoreError::Watch("boom".to_string()));
        assert_eq!(err.reason, "NamespaceCreation");
        assert_eq!(err.to_string(), "failed to create namespace \"foo\": watch failed: boom");
    }

    #[test]
    fn test_into_requeue_only_for_delayed_not_ready() {
        let delayed: ReconcilerError = NotReadyError::new("NamespaceNotReady")
            .with_requeue_after(Duration::from_millis(100))
            .into();
        assert_eq!(
            delayed.into_requeue().unwrap(),
            Requeue::After(Duration::from_millis(100))
        );

        let failed: ReconcilerError = NotReadyError::new("NamespaceCreation").into();
        assert!(failed.into_requeue().is_err());
    }

    #[test]
    fn test_requeue_into_action() {
        assert_eq!(Action::from(Requeue::Done), Action::await_change());
        assert_eq!(
            Action::from(Requeue::After(Duration::from_secs(1))),
            Action::requeue(Duration::from_secs(1))
        );
    }
}
