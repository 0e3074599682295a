//! # Patching Reconciler
//!
//! Wraps a domain [`ObjectReconciler`] and guarantees the object's status and
//! spec are written back exactly once per pass, even when the domain function
//! fails. This is what makes a `Ready=False` condition durable on an erroring
//! pass that the work-queue will retry.

use super::types::{ObjectReconciler, ReconcilerError, Requeue};
use crate::constants;
use crate::observability;
use crate::store::{kind_of, object_key, patch, ObjectStore, StoreError, StoredObject};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn, Instrument};

/// Which part of the object a write-back targets
#[derive(Debug, Clone, Copy)]
enum Target {
    Main,
    Status,
}

/// Reconcile entry point for one kind
pub struct PatchingReconciler<K> {
    store: Arc<dyn ObjectStore<K>>,
    inner: Arc<dyn ObjectReconciler<K>>,
}

impl<K> std::fmt::Debug for PatchingReconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchingReconciler").finish_non_exhaustive()
    }
}

impl<K: StoredObject> PatchingReconciler<K> {
    pub fn new(store: Arc<dyn ObjectStore<K>>, inner: Arc<dyn ObjectReconciler<K>>) -> Self {
        Self { store, inner }
    }

    /// Run one reconcile pass for the object identified by `namespace`/`name`
    ///
    /// An object that no longer exists is a successful no-op. When both the
    /// domain function and the write-back fail, the write-back error is
    /// returned; the domain error is already recorded on the status.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Requeue, ReconcilerError> {
        let kind = kind_of::<K>();
        let span = tracing::info_span!(
            "controller.reconcile",
            resource.kind = %kind,
            resource.namespace = namespace,
            resource.name = name
        );

        async {
            let started = Instant::now();
            observability::metrics::increment_reconciliations(&kind);

            let result = self.reconcile_once(namespace, name).await;

            observability::metrics::observe_reconciliation_duration(
                &kind,
                started.elapsed().as_secs_f64(),
            );
            match &result {
                Ok(Requeue::After(delay)) => {
                    debug!("Requeue in {:?}", delay);
                    observability::metrics::increment_requeues_total("requeue-after");
                }
                Ok(Requeue::Done) => debug!("Reconciliation complete"),
                Err(e) => {
                    warn!(error = %e, "Reconciliation failed");
                    observability::metrics::increment_reconciliation_errors(&kind);
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_once(&self, namespace: &str, name: &str) -> Result<Requeue, ReconcilerError> {
        let Some(mut obj) = self.store.get(namespace, name).await? else {
            debug!("{} {} no longer exists", kind_of::<K>(), object_key(namespace, name));
            return Ok(Requeue::Done);
        };
        let original = obj.clone();

        let result = self.inner.reconcile_resource(&mut obj).await;

        // Persist on every path, including errors from the domain function
        match self.write_back(namespace, name, &original, &obj).await {
            Ok(()) => result,
            Err(e) => Err(e.into()),
        }
    }

    /// Patch status, then spec/metadata, each exactly once (plus conflict retries)
    ///
    /// Status goes first: a spec patch that drops the last finalizer can make
    /// the object disappear.
    async fn write_back(&self, namespace: &str, name: &str, original: &K, updated: &K) -> Result<(), StoreError> {
        let diff = patch::object_diff(original, updated)
            .map_err(|e| StoreError::serialization::<K>(namespace, name, e))?;

        let mut resource_version = original.meta().resource_version.clone();
        match self
            .patch_with_retry(namespace, name, &diff.status, resource_version.clone(), Target::Status)
            .await
        {
            Ok(Some(patched)) => resource_version = patched.meta().resource_version.clone(),
            Ok(None) => return Ok(()),
            Err(e) => return Err(e),
        }

        self.patch_with_retry(namespace, name, &diff.main, resource_version, Target::Main)
            .await
            .map(|_| ())
    }

    /// Returns `Ok(None)` when the object vanished underneath the patch
    async fn patch_with_retry(
        &self,
        namespace: &str,
        name: &str,
        diff: &Value,
        mut resource_version: Option<String>,
        target: Target,
    ) -> Result<Option<K>, StoreError> {
        let mut attempt = 1;
        loop {
            let body = patch::with_resource_version(diff.clone(), resource_version.as_deref());
            let result = match target {
                Target::Status => self.store.patch_status(namespace, name, &body).await,
                Target::Main => self.store.patch(namespace, name, &body).await,
            };

            match result {
                Ok(patched) => return Ok(Some(patched)),
                Err(e) if e.is_not_found() => {
                    debug!(
                        "{} {} was deleted during reconciliation, skipping {:?} write-back",
                        kind_of::<K>(),
                        object_key(namespace, name),
                        target
                    );
                    return Ok(None);
                }
                Err(e) if e.is_conflict() && attempt < constants::CONFLICT_RETRY_STEPS => {
                    debug!(attempt, "Conflict writing {:?}, retrying against latest version", target);
                    tokio::time::sleep(constants::CONFLICT_RETRY_DELAY).await;
                    match self.store.get(namespace, name).await? {
                        Some(latest) => resource_version = latest.meta().resource_version.clone(),
                        None => return Ok(None),
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
