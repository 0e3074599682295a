//! # Propagation
//!
//! Copies secrets, role bindings and service accounts from a parent namespace
//! into a child namespace and prunes copies whose source is gone or no longer
//! flagged.
//!
//! Every copy carries the [`PROPAGATED_FROM_LABEL`] back-reference; the set of
//! previously propagated objects is always found through that label and never
//! by name.
//!
//! [`PROPAGATED_FROM_LABEL`]: crate::constants::PROPAGATED_FROM_LABEL

use super::types::NotReadyError;
use crate::constants;
use crate::observability;
use crate::store::{create_or_patch, kind_of, ObjectStore, OperationResult, StoreError, StoredObject};
use k8s_openapi::api::core::v1::{LocalObjectReference, ObjectReference, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// A kind that can be copied into a child namespace
trait Propagated: StoredObject + Default {
    /// Copy the payload of `source` onto `target`; metadata is handled by the caller
    fn copy_into(source: &Self, target: &mut Self, registry_secret_names: &[String]);
}

impl Propagated for Secret {
    fn copy_into(source: &Self, target: &mut Self, _registry_secret_names: &[String]) {
        target.type_.clone_from(&source.type_);
        target.data.clone_from(&source.data);
    }
}

impl Propagated for RoleBinding {
    fn copy_into(source: &Self, target: &mut Self, _registry_secret_names: &[String]) {
        target.role_ref.clone_from(&source.role_ref);
        target.subjects.clone_from(&source.subjects);
    }
}

impl Propagated for ServiceAccount {
    /// Secret references are rebuilt from the ones the account itself owns
    /// (token and dockercfg secrets named after it) plus the allow-listed
    /// registry secrets; anything else the store injected is dropped.
    fn copy_into(source: &Self, target: &mut Self, registry_secret_names: &[String]) {
        let account = source.name_any();
        let keep = |name: &str| {
            owned_by_account(&account, name) || registry_secret_names.iter().any(|n| n == name)
        };

        let image_pull_secrets: Vec<LocalObjectReference> = target
            .image_pull_secrets
            .iter()
            .flatten()
            .chain(source.image_pull_secrets.iter().flatten())
            .filter(|r| keep(&r.name))
            .fold(Vec::new(), |mut refs, r| {
                if !refs.iter().any(|existing: &LocalObjectReference| existing.name == r.name) {
                    refs.push(r.clone());
                }
                refs
            });
        target.image_pull_secrets = (!image_pull_secrets.is_empty()).then_some(image_pull_secrets);

        let secrets: Vec<ObjectReference> = target
            .secrets
            .iter()
            .flatten()
            .chain(source.secrets.iter().flatten())
            .filter(|r| r.name.as_deref().is_some_and(|name| keep(name)))
            .fold(Vec::new(), |mut refs, r| {
                if !refs.iter().any(|existing: &ObjectReference| existing.name == r.name) {
                    refs.push(ObjectReference {
                        name: r.name.clone(),
                        ..ObjectReference::default()
                    });
                }
                refs
            });
        target.secrets = (!secrets.is_empty()).then_some(secrets);

        target
            .automount_service_account_token
            .clone_from(&source.automount_service_account_token);
    }
}

fn owned_by_account(account: &str, secret: &str) -> bool {
    secret.starts_with(&format!("{account}-token-")) || secret.starts_with(&format!("{account}-dockercfg-"))
}

fn is_denylisted(key: &str) -> bool {
    constants::PROPAGATION_DENYLIST_PREFIXES
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

/// Merge the source's labels and annotations into the copy, minus deployment-tool keys
fn copy_metadata(source: &ObjectMeta, target: &mut ObjectMeta, parent: &str) {
    let filtered = |map: &Option<BTreeMap<String, String>>| {
        map.iter()
            .flatten()
            .filter(|(k, _)| !is_denylisted(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>()
    };

    let labels = target.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(filtered(&source.labels));
    labels.insert(constants::PROPAGATED_FROM_LABEL.to_string(), parent.to_string());

    let annotations = filtered(&source.annotations);
    if !annotations.is_empty() {
        target
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
    }
}

fn has_annotation(meta: &ObjectMeta, key: &str, value: &str) -> bool {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .is_some_and(|v| v == value)
}

/// Copies objects from a parent namespace into a child namespace
pub struct Propagator {
    secrets: Arc<dyn ObjectStore<Secret>>,
    role_bindings: Arc<dyn ObjectStore<RoleBinding>>,
    service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    registry_secret_names: Vec<String>,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("registry_secret_names", &self.registry_secret_names)
            .finish_non_exhaustive()
    }
}

impl Propagator {
    pub fn new(
        secrets: Arc<dyn ObjectStore<Secret>>,
        role_bindings: Arc<dyn ObjectStore<RoleBinding>>,
        service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
        registry_secret_names: Vec<String>,
    ) -> Self {
        Self {
            secrets,
            role_bindings,
            service_accounts,
            registry_secret_names,
        }
    }

    /// Propagate the allow-listed registry secrets
    ///
    /// Present secrets are propagated and stale copies pruned even when some
    /// allow-listed secret is missing from the parent; the missing ones then
    /// fail the step.
    pub async fn propagate_registry_secrets(&self, parent: &str, child: &str) -> Result<(), NotReadyError> {
        let reason = constants::REASON_REGISTRY_SECRET_PROPAGATION;

        let mut candidates = Vec::new();
        let mut missing = Vec::new();
        for name in &self.registry_secret_names {
            match self.secrets.get(parent, name).await {
                Ok(Some(secret)) => candidates.push(secret),
                Ok(None) => missing.push(name.as_str()),
                Err(e) => return Err(wrap::<Secret>(reason, parent, child, e)),
            }
        }

        self.sync(self.secrets.as_ref(), parent, child, candidates)
            .await
            .map_err(|e| wrap::<Secret>(reason, parent, child, e))?;

        if !missing.is_empty() {
            return Err(NotReadyError::new(reason).with_message(format!(
                "registry secret(s) {} not found in namespace {parent:?}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Propagate role bindings annotated for propagation
    pub async fn propagate_role_bindings(&self, parent: &str, child: &str) -> Result<(), NotReadyError> {
        self.propagate_flagged(
            self.role_bindings.as_ref(),
            parent,
            child,
            constants::PROPAGATE_ROLE_BINDING_ANNOTATION,
        )
        .await
        .map_err(|e| wrap::<RoleBinding>(constants::REASON_ROLE_BINDING_PROPAGATION, parent, child, e))
    }

    /// Propagate service accounts annotated for propagation
    pub async fn propagate_service_accounts(&self, parent: &str, child: &str) -> Result<(), NotReadyError> {
        self.propagate_flagged(
            self.service_accounts.as_ref(),
            parent,
            child,
            constants::PROPAGATE_SERVICE_ACCOUNT_ANNOTATION,
        )
        .await
        .map_err(|e| {
            wrap::<ServiceAccount>(constants::REASON_SERVICE_ACCOUNT_PROPAGATION, parent, child, e)
        })
    }

    async fn propagate_flagged<K: Propagated>(
        &self,
        store: &dyn ObjectStore<K>,
        parent: &str,
        child: &str,
        annotation: &str,
    ) -> Result<(), StoreError> {
        let candidates = store
            .list(parent, None)
            .await?
            .into_iter()
            .filter(|obj| has_annotation(obj.meta(), annotation, "true"))
            .collect();
        self.sync(store, parent, child, candidates).await
    }

    /// Create or patch a copy of each candidate, then prune stale copies
    async fn sync<K: Propagated>(
        &self,
        store: &dyn ObjectStore<K>,
        parent: &str,
        child: &str,
        candidates: Vec<K>,
    ) -> Result<(), StoreError> {
        let kind = kind_of::<K>();
        let mut desired = BTreeSet::new();

        for source in &candidates {
            let name = source.name_any();
            let (result, _) = create_or_patch(store, child, &name, |copy: &mut K| {
                copy_metadata(source.meta(), copy.meta_mut(), parent);
                K::copy_into(source, copy, &self.registry_secret_names);
            })
            .await?;
            if result != OperationResult::Unchanged {
                debug!("Propagated {} {} from {} to {} ({:?})", kind, name, parent, child, result);
                observability::metrics::increment_propagated(&kind);
            }
            desired.insert(name);
        }

        let selector = format!("{}={}", constants::PROPAGATED_FROM_LABEL, parent);
        for existing in store.list(child, Some(&selector)).await? {
            let name = existing.name_any();
            if desired.contains(&name) {
                continue;
            }
            if has_annotation(existing.meta(), constants::PROPAGATE_DELETION_ANNOTATION, "false") {
                debug!("Keeping {} {}/{}: deletion is not propagated", kind, child, name);
                continue;
            }
            match store.delete(child, &name).await {
                Ok(()) => {
                    info!("Pruned stale {} {}/{}", kind, child, name);
                    observability::metrics::increment_pruned(&kind);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn wrap<K: StoredObject>(reason: &str, parent: &str, child: &str, err: StoreError) -> NotReadyError {
    NotReadyError::new(reason)
        .with_message(format!(
            "failed to propagate {} from {parent:?} to {child:?}",
            kind_of::<K>()
        ))
        .with_cause(err)
}
