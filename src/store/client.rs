//! # Kubernetes Store
//!
//! [`ObjectStore`] implementation backed by `kube::Api`.

use super::{kind_of, object_key, ObjectStore, StoreError, StoredObject, WatchEvent, WatchStream};
use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use futures::{future, StreamExt};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams, WatchParams};
use kube::{Client, Resource};
use serde_json::Value;

/// Store backed by the Kubernetes API server
pub struct KubeStore<K> {
    client: Client,
    api_for: fn(Client, &str) -> Api<K>,
}

impl<K> std::fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    /// Store for a namespaced kind
    pub fn namespaced(client: Client) -> Self {
        Self {
            client,
            api_for: |client: Client, namespace: &str| Api::namespaced(client, namespace),
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
{
    /// Store for a cluster-scoped kind; the namespace argument is ignored
    pub fn cluster(client: Client) -> Self {
        Self {
            client,
            api_for: |client: Client, _namespace: &str| Api::all(client),
        }
    }
}

impl<K: StoredObject> KubeStore<K> {
    fn api(&self, namespace: &str) -> Api<K> {
        (self.api_for)(self.client.clone(), namespace)
    }
}

/// Classify a kube error; 404 and 409 become typed store errors
fn api_error<K: StoredObject>(err: kube::Error, namespace: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(ref response) if response.code == 404 => {
            StoreError::not_found::<K>(namespace, name)
        }
        kube::Error::Api(ref response) if response.code == 409 => {
            if response.reason == "AlreadyExists" {
                StoreError::AlreadyExists {
                    kind: kind_of::<K>(),
                    key: object_key(namespace, name),
                }
            } else {
                StoreError::conflict::<K>(namespace, name)
            }
        }
        source => StoreError::Api {
            kind: kind_of::<K>(),
            key: object_key(namespace, name),
            source,
        },
    }
}

fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    }
}

#[async_trait]
impl<K: StoredObject> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| api_error::<K>(e, namespace, name))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let name = obj.meta().name.clone().unwrap_or_default();
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        self.api(&namespace)
            .create(&params, obj)
            .await
            .map_err(|e| api_error::<K>(e, &namespace, &name))
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError> {
        self.api(namespace)
            .patch(name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| api_error::<K>(e, namespace, name))
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError> {
        self.api(namespace)
            .patch_status(name, &patch_params(), &Patch::Merge(patch))
            .await
            .map_err(|e| api_error::<K>(e, namespace, name))
    }

    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        self.api(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| api_error::<K>(e, namespace, "*"))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api(namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| api_error::<K>(e, namespace, name))
    }

    async fn watch(&self, namespace: &str, name: &str) -> Result<WatchStream<K>, StoreError> {
        let params = WatchParams::default().fields(&format!("metadata.name={name}"));
        let events = self
            .api(namespace)
            .watch(&params, "0")
            .await
            .map_err(|e| api_error::<K>(e, namespace, name))?;

        let events = events.filter_map(|event| {
            future::ready(match event {
                Ok(kube::api::WatchEvent::Added(obj)) => Some(Ok(WatchEvent::Added(obj))),
                Ok(kube::api::WatchEvent::Modified(obj)) => Some(Ok(WatchEvent::Modified(obj))),
                Ok(kube::api::WatchEvent::Deleted(obj)) => Some(Ok(WatchEvent::Deleted(obj))),
                Ok(kube::api::WatchEvent::Bookmark(_)) => None,
                Ok(kube::api::WatchEvent::Error(e)) => Some(Err(StoreError::Watch(format!("{e:?}")))),
                Err(e) => Some(Err(StoreError::Watch(e.to_string()))),
            })
        });
        Ok(events.boxed())
    }
}
