//! # Store
//!
//! Typed access to the cluster's object store.
//!
//! Reconcilers never talk to `kube::Api` directly: they go through
//! [`ObjectStore`], which the runtime backs with [`KubeStore`] and the tests
//! back with an in-memory store. Writes are JSON merge patches carrying the
//! last observed `resourceVersion` as an optimistic-concurrency precondition.

mod client;
#[cfg(test)]
pub(crate) mod memory;
pub mod patch;

pub use client::KubeStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

/// Bounds every stored kind satisfies
pub trait StoredObject:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> StoredObject for K where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Errors returned by store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} {key} was modified concurrently")]
    Conflict { kind: String, key: String },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("failed to encode {kind} {key}: {source}")]
    Serialization {
        kind: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} request for {key} failed: {source}")]
    Api {
        kind: String,
        key: String,
        #[source]
        source: kube::Error,
    },

    #[error("watch failed: {0}")]
    Watch(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub(crate) fn not_found<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind_of::<K>(),
            key: object_key(namespace, name),
        }
    }

    pub(crate) fn conflict<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> Self {
        Self::Conflict {
            kind: kind_of::<K>(),
            key: object_key(namespace, name),
        }
    }

    pub(crate) fn serialization<K: Resource<DynamicType = ()>>(
        namespace: &str,
        name: &str,
        source: serde_json::Error,
    ) -> Self {
        Self::Serialization {
            kind: kind_of::<K>(),
            key: object_key(namespace, name),
            source,
        }
    }
}

/// A change observed on a watched object
#[derive(Debug, Clone)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
}

impl<K> WatchEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj,
        }
    }
}

/// Stream of watch events; dropping it stops the watch
pub type WatchStream<K> = BoxStream<'static, Result<WatchEvent<K>, StoreError>>;

/// Typed store operations for one kind
///
/// Cluster-scoped kinds are addressed with an empty namespace.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Read an object; `Ok(None)` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>;

    /// Create an object in the namespace recorded in its metadata
    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    /// Apply a JSON merge patch to the main resource
    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError>;

    /// Apply a JSON merge patch to the status subresource
    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError>;

    /// List objects in a namespace, optionally filtered by an equality label selector
    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>, StoreError>;

    /// Delete an object; `StoreError::NotFound` when it is already gone
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Watch a single object by namespace and name
    async fn watch(&self, namespace: &str, name: &str) -> Result<WatchStream<K>, StoreError>;
}

/// Outcome of [`create_or_patch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    /// The mutation produced no change; nothing was written
    Unchanged,
}

/// Read-modify-write an object
///
/// Creates the object (after applying `mutate` to a blank one) when it does
/// not exist; otherwise applies `mutate` to a copy and patches only the
/// difference, guarded by the observed `resourceVersion`.
pub async fn create_or_patch<K, F>(
    store: &dyn ObjectStore<K>,
    namespace: &str,
    name: &str,
    mutate: F,
) -> Result<(OperationResult, K), StoreError>
where
    K: StoredObject + Default,
    F: FnOnce(&mut K),
{
    match store.get(namespace, name).await? {
        None => {
            let mut obj = K::default();
            obj.meta_mut().name = Some(name.to_string());
            if !namespace.is_empty() {
                obj.meta_mut().namespace = Some(namespace.to_string());
            }
            mutate(&mut obj);
            let created = store.create(&obj).await?;
            debug!("Created {} {}", kind_of::<K>(), object_key(namespace, name));
            Ok((OperationResult::Created, created))
        }
        Some(existing) => {
            let mut updated = existing.clone();
            mutate(&mut updated);

            let diff = patch::object_diff(&existing, &updated)
                .map_err(|e| StoreError::serialization::<K>(namespace, name, e))?;
            if patch::is_empty(&diff.main) {
                return Ok((OperationResult::Unchanged, existing));
            }

            let guarded =
                patch::with_resource_version(diff.main, existing.meta().resource_version.as_deref());
            let patched = store.patch(namespace, name, &guarded).await?;
            debug!("Patched {} {}", kind_of::<K>(), object_key(namespace, name));
            Ok((OperationResult::Updated, patched))
        }
    }
}

/// `namespace/name`, or just `name` for cluster-scoped objects
pub fn object_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}/{name}")
    }
}

/// Kind name of a statically typed resource
pub fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).to_string()
}
