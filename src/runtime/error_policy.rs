//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loops.

use crate::constants;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::{PatchingReconciler, ReconcilerError};
use crate::observability;
use crate::store::{kind_of, object_key, StoredObject};
use kube::ResourceExt;
use kube::core::DynamicObject;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Consecutive error tracking for one resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(
                constants::ERROR_BACKOFF_MIN_SECS,
                constants::ERROR_BACKOFF_MAX_SECS,
            ),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-kind context handed to the kube-runtime controller
pub struct ControllerContext<K> {
    pub reconciler: PatchingReconciler<K>,
    /// Backoff state per `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl<K> std::fmt::Debug for ControllerContext<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerContext").finish_non_exhaustive()
    }
}

impl<K> ControllerContext<K> {
    pub fn new(reconciler: PatchingReconciler<K>) -> Self {
        Self {
            reconciler,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Forget the error history of a resource after a successful pass
    pub fn reset_backoff(&self, resource_key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(resource_key);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }

    /// Drop the error history of a resource that left the watch cache
    ///
    /// A resource deleted while it is still failing never gets the successful
    /// pass that would reset it, so the controller's "object not found"
    /// report is the last chance to evict its entry.
    pub fn forget(&self, obj_ref: &ObjectRef<DynamicObject>) {
        let namespace = obj_ref.namespace.as_deref().unwrap_or_default();
        self.reset_backoff(&object_key(namespace, &obj_ref.name));
    }

    /// Number of resources currently backing off
    pub fn tracked_resources(&self) -> usize {
        self.backoff_states.lock().map(|states| states.len()).unwrap_or_default()
    }

    /// Record an error and return the delay before the next attempt
    fn next_backoff(&self, resource_key: &str) -> (u64, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_default();
                state.increment_error();
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!(
                    "Failed to lock backoff_states: {}, using default backoff",
                    e
                );
                (constants::ERROR_BACKOFF_MIN_SECS, 0)
            }
        }
    }
}

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff is tracked per resource so one failing resource never delays the
/// retries of another.
pub fn handle_reconciliation_error<K: StoredObject>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<ControllerContext<K>>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let kind = kind_of::<K>();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %kind,
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {} {}: {:?}", kind, name, error);

    let resource_key = object_key(&namespace, &name);
    let (backoff_seconds, error_count) = ctx.next_backoff(&resource_key);

    info!(
        "Retrying {} in {}s (error count: {})",
        resource_key, backoff_seconds, error_count
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::{NotReadyError, ObjectReconciler, Requeue};
    use crate::crd::{CFOrg, CFOrgSpec};
    use crate::store::memory::MemoryStore;
    use crate::store::ObjectStore;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ObjectReconciler<CFOrg> for Noop {
        async fn reconcile_resource(&self, _obj: &mut CFOrg) -> Result<Requeue, ReconcilerError> {
            Ok(Requeue::Done)
        }
    }

    fn context() -> Arc<ControllerContext<CFOrg>> {
        let store = Arc::new(MemoryStore::<CFOrg>::new()) as Arc<dyn ObjectStore<CFOrg>>;
        Arc::new(ControllerContext::new(PatchingReconciler::new(store, Arc::new(Noop))))
    }

    fn org() -> Arc<CFOrg> {
        let mut org = CFOrg::new(
            "cf-org-1",
            CFOrgSpec {
                display_name: "foo".to_string(),
            },
        );
        org.metadata.namespace = Some("cf".to_string());
        Arc::new(org)
    }

    fn error() -> ReconcilerError {
        NotReadyError::new("NamespaceCreation").into()
    }

    #[test]
    fn test_backoff_grows_per_resource() {
        let ctx = context();
        let delays: Vec<Action> = (0..4)
            .map(|_| handle_reconciliation_error(org(), &error(), Arc::clone(&ctx)))
            .collect();

        assert_eq!(
            delays,
            vec![
                Action::requeue(Duration::from_secs(1)),
                Action::requeue(Duration::from_secs(1)),
                Action::requeue(Duration::from_secs(2)),
                Action::requeue(Duration::from_secs(3)),
            ]
        );
    }

    #[test]
    fn test_reset_backoff_restarts_sequence() {
        let ctx = context();
        for _ in 0..4 {
            handle_reconciliation_error(org(), &error(), Arc::clone(&ctx));
        }
        ctx.reset_backoff("cf/cf-org-1");

        let action = handle_reconciliation_error(org(), &error(), ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
    }

    #[test]
    fn test_deleted_resource_is_evicted() {
        let ctx = context();
        handle_reconciliation_error(org(), &error(), Arc::clone(&ctx));
        handle_reconciliation_error(org(), &error(), Arc::clone(&ctx));
        assert_eq!(ctx.tracked_resources(), 1);

        let gone = ObjectRef::from_obj(org().as_ref()).erase();
        ctx.forget(&gone);

        assert_eq!(ctx.tracked_resources(), 0);
    }

    #[test]
    fn test_forget_leaves_other_resources() {
        let ctx = context();
        handle_reconciliation_error(org(), &error(), Arc::clone(&ctx));

        let other = ObjectRef::<CFOrg>::new("cf-org-2").within("cf").erase();
        ctx.forget(&other);

        assert_eq!(ctx.tracked_resources(), 1);
    }
}
