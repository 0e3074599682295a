//! # Reconciler
//!
//! Reconciliation core for namespace-backed resources.
//!
//! ## Structure
//!
//! - `types` - requeue directive, reconcile errors and the domain reconcile contract
//! - `patching` - exactly-once status/spec write-back around a domain reconciler
//! - `namespace` - child namespace provisioning for orgs and spaces
//! - `propagation` - copying secrets, role bindings and service accounts into child namespaces
//!
//! The finalizer chain consulted on deletion lives in [`crate::controller::finalizer`].

mod namespace;
mod patching;
mod propagation;
mod types;

pub use namespace::{NamespaceBacked, NamespaceReconciler};
pub use patching::PatchingReconciler;
pub use propagation::Propagator;
pub use types::{NotReadyError, ObjectReconciler, ReconcilerError, Requeue};

use crate::config::ControllerConfig;
use crate::controller::finalizer::{ContainedObjectsFinalizer, NamespaceFinalizer};
use crate::controller::labels::Compiler;
use crate::crd::{CFApp, CFOrg, CFSpace};
use crate::store::{KubeStore, ObjectStore};
use crate::constants;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::Client;
use std::sync::Arc;

/// Store handles shared by every reconciler
#[derive(Clone)]
pub struct Stores {
    pub namespaces: Arc<dyn ObjectStore<Namespace>>,
    pub secrets: Arc<dyn ObjectStore<Secret>>,
    pub role_bindings: Arc<dyn ObjectStore<RoleBinding>>,
    pub service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    pub orgs: Arc<dyn ObjectStore<CFOrg>>,
    pub spaces: Arc<dyn ObjectStore<CFSpace>>,
    pub apps: Arc<dyn ObjectStore<CFApp>>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    /// Stores backed by the Kubernetes API server
    pub fn kube(client: &Client) -> Self {
        Self {
            namespaces: Arc::new(KubeStore::<Namespace>::cluster(client.clone())),
            secrets: Arc::new(KubeStore::<Secret>::namespaced(client.clone())),
            role_bindings: Arc::new(KubeStore::<RoleBinding>::namespaced(client.clone())),
            service_accounts: Arc::new(KubeStore::<ServiceAccount>::namespaced(client.clone())),
            orgs: Arc::new(KubeStore::<CFOrg>::namespaced(client.clone())),
            spaces: Arc::new(KubeStore::<CFSpace>::namespaced(client.clone())),
            apps: Arc::new(KubeStore::<CFApp>::namespaced(client.clone())),
        }
    }

    fn propagator(&self, config: &ControllerConfig) -> Arc<Propagator> {
        Arc::new(Propagator::new(
            Arc::clone(&self.secrets),
            Arc::clone(&self.role_bindings),
            Arc::clone(&self.service_accounts),
            config.container_registry_secret_names.clone(),
        ))
    }
}

/// Labels compiled into every child namespace
fn namespace_labels(config: &ControllerConfig) -> Compiler {
    Compiler::new().defaults([
        (
            constants::POD_SECURITY_ENFORCE_LABEL,
            config.namespace_pod_security_level.as_str(),
        ),
        (
            constants::POD_SECURITY_AUDIT_LABEL,
            config.namespace_pod_security_level.as_str(),
        ),
    ])
}

/// Reconciler for CFOrgs; deleting an org first deletes its spaces
pub fn org_reconciler(stores: &Stores, config: &ControllerConfig) -> PatchingReconciler<CFOrg> {
    let delegate = ContainedObjectsFinalizer::<CFOrg, CFSpace>::new(
        Arc::clone(&stores.spaces),
        config.org_finalizer_space_deletion_timeout(),
    );
    let finalizer = NamespaceFinalizer::new(Arc::clone(&stores.namespaces), Arc::new(delegate));
    let inner = NamespaceReconciler::new(
        Arc::clone(&stores.namespaces),
        stores.propagator(config),
        Arc::new(finalizer),
        namespace_labels(config),
        Compiler::new(),
    );
    PatchingReconciler::new(Arc::clone(&stores.orgs), Arc::new(inner))
}

/// Reconciler for CFSpaces; deleting a space first deletes its apps
pub fn space_reconciler(stores: &Stores, config: &ControllerConfig) -> PatchingReconciler<CFSpace> {
    let delegate = ContainedObjectsFinalizer::<CFSpace, CFApp>::new(
        Arc::clone(&stores.apps),
        config.space_finalizer_app_deletion_timeout(),
    );
    let finalizer = NamespaceFinalizer::new(Arc::clone(&stores.namespaces), Arc::new(delegate));
    let inner = NamespaceReconciler::new(
        Arc::clone(&stores.namespaces),
        stores.propagator(config),
        Arc::new(finalizer),
        namespace_labels(config),
        Compiler::new(),
    );
    PatchingReconciler::new(Arc::clone(&stores.spaces), Arc::new(inner))
}
