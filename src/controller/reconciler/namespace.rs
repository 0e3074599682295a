//! # Namespace Reconciler
//!
//! Provisions the child namespace owned by an org or space, propagates
//! credentials into it, and hands deletion over to the finalizer chain.
//!
//! Each pass runs the steps below in order and stops at the first one that
//! cannot complete. Every step has its own Ready reason so a stuck resource
//! shows which stage is blocked.
//!
//! 1. Stamp `observedGeneration`
//! 2. Deleting: delegate to the finalizer and return its result
//! 3. Ready=Unknown if absent, GUID, finalizer token. A newly added token ends
//!    the pass with a short requeue: it must be stored before anything exists
//!    that only the finalizer would clean up.
//! 4. Create or patch the child namespace (`NamespaceCreation`)
//! 5. Re-read the namespace; requeue shortly while it is not readable (`NamespaceNotReady`)
//! 6. Propagate registry secrets (`RegistrySecretPropagation`)
//! 7. Propagate role bindings and service accounts (`RoleBindingPropagation`, `ServiceAccountPropagation`)
//! 8. Ready=True

use super::propagation::Propagator;
use super::types::{NotReadyError, ObjectReconciler, ReconcilerError, Requeue};
use crate::constants;
use crate::controller::conditions::{self, HasConditions, HasGeneration, ReadyConditionBuilder};
use crate::controller::finalizer::{self, Finalizer};
use crate::controller::labels::Compiler;
use crate::store::{create_or_patch, ObjectStore, OperationResult, StoredObject};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A resource that owns exactly one child namespace named after itself
pub trait NamespaceBacked: StoredObject + HasConditions + HasGeneration {
    /// Child namespace label carrying the resource name
    const GUID_LABEL: &'static str;
    /// Child namespace annotation carrying the display name
    const NAME_ANNOTATION: &'static str;
    /// Finalizer token gating namespace teardown
    const FINALIZER: &'static str;

    fn display_name(&self) -> &str;

    fn set_guid(&mut self, guid: String);
}

/// Domain reconciler for [`NamespaceBacked`] resources
pub struct NamespaceReconciler<K> {
    namespaces: Arc<dyn ObjectStore<Namespace>>,
    propagator: Arc<Propagator>,
    finalizer: Arc<dyn Finalizer<K>>,
    labels: Compiler,
    annotations: Compiler,
}

impl<K> std::fmt::Debug for NamespaceReconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceReconciler")
            .field("labels", &self.labels)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

impl<K: NamespaceBacked> NamespaceReconciler<K> {
    pub fn new(
        namespaces: Arc<dyn ObjectStore<Namespace>>,
        propagator: Arc<Propagator>,
        finalizer: Arc<dyn Finalizer<K>>,
        labels: Compiler,
        annotations: Compiler,
    ) -> Self {
        Self {
            namespaces,
            propagator,
            finalizer,
            labels,
            annotations,
        }
    }

    /// First-seen bookkeeping; returns `true` when the finalizer token was just added
    fn initialize(&self, obj: &mut K) -> bool {
        let generation = obj.generation();
        conditions::set_condition_if_absent(
            obj.conditions_mut(),
            ReadyConditionBuilder::new(generation).unknown().build(),
        );
        let name = obj.name_any();
        obj.set_guid(name);
        finalizer::add_finalizer(obj.meta_mut(), K::FINALIZER)
    }

    async fn reconcile_live(&self, obj: &mut K) -> Result<(), ReconcilerError> {
        let name = obj.name_any();
        self.ensure_namespace(obj, &name).await?;

        if self.namespaces.get("", &name).await?.is_none() {
            return Err(NotReadyError::new(constants::REASON_NAMESPACE_NOT_READY)
                .with_message(format!("namespace {name:?} is not ready yet"))
                .with_requeue_after(constants::NAMESPACE_NOT_READY_REQUEUE)
                .into());
        }

        let parent = obj.namespace().unwrap_or_default();
        self.propagator.propagate_registry_secrets(&parent, &name).await?;
        self.propagator.propagate_role_bindings(&parent, &name).await?;
        self.propagator.propagate_service_accounts(&parent, &name).await?;
        Ok(())
    }

    /// Merge compiled metadata into the child namespace, keeping unrelated keys
    async fn ensure_namespace(&self, obj: &K, name: &str) -> Result<(), NotReadyError> {
        let labels = self.labels.compile([(K::GUID_LABEL, name)]);
        let annotations = self
            .annotations
            .compile([(K::NAME_ANNOTATION, obj.display_name())]);

        let (result, _) = create_or_patch(self.namespaces.as_ref(), "", name, |ns: &mut Namespace| {
            ns.metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .extend(labels);
            ns.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .extend(annotations);
        })
        .await
        .map_err(|e| {
            NotReadyError::new(constants::REASON_NAMESPACE_CREATION)
                .with_message(format!("failed to create namespace {name:?}"))
                .with_cause(e)
        })?;

        match result {
            OperationResult::Created => info!("Created namespace {}", name),
            OperationResult::Updated => info!("Updated namespace {}", name),
            OperationResult::Unchanged => {}
        }
        Ok(())
    }
}

#[async_trait]
impl<K: NamespaceBacked> ObjectReconciler<K> for NamespaceReconciler<K> {
    async fn reconcile_resource(&self, obj: &mut K) -> Result<Requeue, ReconcilerError> {
        let generation = obj.generation();
        obj.set_observed_generation(generation);

        if obj.meta().deletion_timestamp.is_some() {
            debug!("Resource is being deleted, running finalizers");
            return self.finalizer.finalize(obj).await;
        }

        if self.initialize(obj) {
            debug!("Added finalizer {}, provisioning after it is stored", K::FINALIZER);
            return Ok(Requeue::After(constants::FINALIZER_ADDED_REQUEUE));
        }

        let result = self.reconcile_live(obj).await;
        conditions::set_condition(
            obj.conditions_mut(),
            conditions::ready_condition(generation, result.as_ref().err()),
        );
        result
            .map(|()| Requeue::Done)
            .or_else(ReconcilerError::into_requeue)
    }
}
