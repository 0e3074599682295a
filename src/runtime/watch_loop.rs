//! # Watch Loop
//!
//! Runs one kube-runtime controller per namespace-backed kind until a
//! shutdown signal arrives.
//!
//! The work-queue serializes passes per resource, so the reconcilers never
//! lock; different resources reconcile concurrently.
//!
//! Besides its own kind, each controller watches the propagation sources in
//! its parent namespaces (registry secrets, role bindings, service accounts).
//! A change to any of them requeues every resource living in that namespace,
//! so child namespaces follow the parent without an edit to the org or space.

use super::error_policy::{handle_reconciliation_error, ControllerContext};
use super::initialization::InitializationResult;
use crate::controller::reconciler::{org_reconciler, space_reconciler, NamespaceBacked, ReconcilerError};
use crate::crd::{CFOrg, CFSpace};
use crate::store::{kind_of, object_key};
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Controller, Error as ControllerError};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconcile entry point handed to kube-runtime
async fn reconcile<K: NamespaceBacked>(
    obj: Arc<K>,
    ctx: Arc<ControllerContext<K>>,
) -> Result<Action, ReconcilerError> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();

    let requeue = ctx.reconciler.reconcile(&namespace, &name).await?;
    ctx.reset_backoff(&object_key(&namespace, &name));
    Ok(requeue.into())
}

/// References to the resources stored in `namespace`
fn refs_in_namespace<K>(objects: &[Arc<K>], namespace: &str) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    objects
        .iter()
        .filter(|obj| obj.namespace().as_deref() == Some(namespace))
        .map(|obj| ObjectRef::from_obj(obj.as_ref()))
        .collect()
}

/// Resources whose parent namespace holds `source`
fn tenants_of<K, S>(tenants: &Store<K>, source: &S) -> Vec<ObjectRef<K>>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
    S: Resource,
{
    source
        .namespace()
        .map(|namespace| refs_in_namespace(&tenants.state(), &namespace))
        .unwrap_or_default()
}

fn is_registry_secret(registry_secret_names: &[String], secret: &Secret) -> bool {
    secret
        .metadata
        .name
        .as_deref()
        .is_some_and(|name| registry_secret_names.iter().any(|n| n == name))
}

/// Api over propagation sources: one namespace, or all of them
fn source_api<S>(client: &Client, namespace: Option<&str>) -> Api<S>
where
    S: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Controller for `K` that also reacts to propagation sources in its parent namespaces
///
/// `parents` limits the source watches to a single namespace (the root
/// namespace for orgs); `None` watches every namespace.
fn controller_for<K: NamespaceBacked>(
    api: Api<K>,
    client: &Client,
    parents: Option<&str>,
    registry_secret_names: &[String],
) -> Controller<K> {
    let controller = Controller::new(api, watcher::Config::default());
    let tenants = controller.store();
    let registry_secret_names: Arc<[String]> = registry_secret_names.into();

    let secret_tenants = tenants.clone();
    let binding_tenants = tenants.clone();
    controller
        .watches(
            source_api::<Secret>(client, parents),
            watcher::Config::default(),
            move |secret: Secret| {
                if is_registry_secret(&registry_secret_names, &secret) {
                    tenants_of(&secret_tenants, &secret)
                } else {
                    Vec::new()
                }
            },
        )
        .watches(
            source_api::<RoleBinding>(client, parents),
            watcher::Config::default(),
            move |binding: RoleBinding| tenants_of(&binding_tenants, &binding),
        )
        .watches(
            source_api::<ServiceAccount>(client, parents),
            watcher::Config::default(),
            move |account: ServiceAccount| tenants_of(&tenants, &account),
        )
}

async fn run_controller<K: NamespaceBacked>(controller: Controller<K>, ctx: Arc<ControllerContext<K>>) {
    let kind = kind_of::<K>();
    info!("Starting {} controller", kind);

    controller
        .shutdown_on_signal()
        .run(reconcile::<K>, handle_reconciliation_error::<K>, Arc::clone(&ctx))
        .for_each(|result| {
            let kind = kind.clone();
            let ctx = Arc::clone(&ctx);
            async move {
                match result {
                    Ok((obj, action)) => debug!("{} {} reconciled: {:?}", kind, obj.name, action),
                    Err(ControllerError::ObjectNotFound(obj)) => {
                        debug!("{} {} is gone, dropping its backoff state", kind, obj.name);
                        ctx.forget(&obj);
                    }
                    Err(e) => warn!(error = %e, "{} controller error", kind),
                }
            }
        })
        .await;

    info!("{} controller stopped", kind);
}

/// Run the org and space controllers until shutdown
///
/// Orgs are watched in the root namespace only; spaces in every namespace.
pub async fn run_watch_loop(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        client,
        stores,
        controller_config,
        server_state,
    } = init;

    let orgs = Arc::new(ControllerContext::new(org_reconciler(&stores, &controller_config)));
    let spaces = Arc::new(ControllerContext::new(space_reconciler(&stores, &controller_config)));

    let root_namespace = controller_config.root_namespace.as_str();
    let registry_secret_names = &controller_config.container_registry_secret_names;
    let org_controller = controller_for(
        Api::<CFOrg>::namespaced(client.clone(), root_namespace),
        &client,
        Some(root_namespace),
        registry_secret_names,
    );
    let space_controller = controller_for(
        Api::<CFSpace>::all(client.clone()),
        &client,
        None,
        registry_secret_names,
    );

    info!(
        "Watching CFOrgs in namespace {} and CFSpaces in all namespaces",
        root_namespace
    );
    futures::join!(
        run_controller(org_controller, orgs),
        run_controller(space_controller, spaces)
    );

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controllers stopped, shutting down");
    Ok(())
}
