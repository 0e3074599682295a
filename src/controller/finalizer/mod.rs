//! # Finalizer Chain
//!
//! Pre-deletion hooks consulted by the namespace reconciler while a resource
//! carries a deletion timestamp.
//!
//! A [`NamespaceFinalizer`] wraps a delegate. The delegate runs first; only
//! once it reports it is done does the child namespace get deleted, and only
//! once the namespace is gone is the resource's finalizer token released.

mod contained;
mod namespace;

pub use contained::ContainedObjectsFinalizer;
pub use namespace::NamespaceFinalizer;

use crate::controller::reconciler::{ReconcilerError, Requeue};
use async_trait::async_trait;
use kube::api::ObjectMeta;
use std::time::Duration;

/// Finalization step run on a resource marked for deletion
///
/// `Requeue::Done` means this step has nothing left to do.
#[async_trait]
pub trait Finalizer<K>: Send + Sync {
    async fn finalize(&self, obj: &mut K) -> Result<Requeue, ReconcilerError>;
}

/// Delegate that has nothing to clean up
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFinalizer;

#[async_trait]
impl<K: Send + Sync> Finalizer<K> for NoopFinalizer {
    async fn finalize(&self, _obj: &mut K) -> Result<Requeue, ReconcilerError> {
        Ok(Requeue::Done)
    }
}

pub fn has_finalizer(meta: &ObjectMeta, token: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|t| t == token))
}

/// Add a finalizer token; returns `true` if it was not present yet
pub fn add_finalizer(meta: &mut ObjectMeta, token: &str) -> bool {
    if has_finalizer(meta, token) {
        return false;
    }
    meta.finalizers
        .get_or_insert_with(Vec::new)
        .push(token.to_string());
    true
}

/// Remove a finalizer token; returns `true` if it was present
pub fn remove_finalizer(meta: &mut ObjectMeta, token: &str) -> bool {
    let Some(finalizers) = meta.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|t| t != token);
    finalizers.len() != before
}

/// Time since the deletion timestamp; zero when unset or in the future
pub fn deletion_elapsed(meta: &ObjectMeta) -> Duration {
    let Some(timestamp) = meta.deletion_timestamp.as_ref() else {
        return Duration::ZERO;
    };
    serde_json::to_value(timestamp)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
        .and_then(|deleted_at| (chrono::Utc::now() - deleted_at.with_timezone(&chrono::Utc)).to_std().ok())
        .unwrap_or_default()
}
