//! # In-Memory Store
//!
//! Test store with resource versions, generations, equality label selectors,
//! finalizer-aware deletion, watch fan-out, per-operation call counters and
//! injectable API failures.

use super::patch::{apply_merge_patch, is_empty};
use super::{ObjectStore, StoreError, StoredObject, WatchEvent, WatchStream};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

type Key = (String, String);

/// Number of calls per operation; `writes` counts only calls that changed the store
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Calls {
    pub gets: usize,
    pub creates: usize,
    pub patches: usize,
    pub status_patches: usize,
    pub lists: usize,
    pub deletes: usize,
    pub writes: usize,
}

struct State<K> {
    objects: BTreeMap<Key, K>,
    resource_version: u64,
    /// Created objects not yet visible to `get`
    lagging: HashSet<Key>,
    read_lag: bool,
    pending_conflicts: usize,
    failing_creates: usize,
    failing_lists: usize,
    fail_watch: bool,
    calls: Calls,
}

pub(crate) struct MemoryStore<K> {
    state: Mutex<State<K>>,
    events: broadcast::Sender<WatchEvent<K>>,
}

impl<K: StoredObject> MemoryStore<K> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                resource_version: 0,
                lagging: HashSet::new(),
                read_lag: false,
                pending_conflicts: 0,
                failing_creates: 0,
                failing_lists: 0,
                fail_watch: false,
                calls: Calls::default(),
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap()
    }

    /// Seed an object without counting a call
    pub fn insert(&self, mut obj: K) -> K {
        let mut state = self.lock();
        state.resource_version += 1;
        let meta = obj.meta_mut();
        meta.resource_version = Some(state.resource_version.to_string());
        meta.generation.get_or_insert(1);
        let key = key_of(&obj);
        state.objects.insert(key, obj.clone());
        drop(state);
        let _ = self.events.send(WatchEvent::Added(obj.clone()));
        obj
    }

    /// Mutate a stored object out of band, as another writer would
    pub fn update(&self, namespace: &str, name: &str, mutate: impl FnOnce(&mut K)) -> K {
        let mut state = self.lock();
        state.resource_version += 1;
        let resource_version = state.resource_version.to_string();
        let obj = state
            .objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("object to update must exist");
        mutate(obj);
        obj.meta_mut().resource_version = Some(resource_version);
        let obj = obj.clone();
        drop(state);
        let _ = self.events.send(WatchEvent::Modified(obj.clone()));
        obj
    }

    /// Read an object bypassing read lag and call counters
    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of the objects stored in a namespace
    pub fn names(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = Calls::default();
    }

    /// Hide each created object from the first `get` that follows its creation
    pub fn set_read_lag(&self, enabled: bool) {
        self.lock().read_lag = enabled;
    }

    /// Fail the next `count` patches with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().pending_conflicts = count;
    }

    /// Fail the next `count` creates with a server error
    pub fn fail_creates(&self, count: usize) {
        self.lock().failing_creates = count;
    }

    /// Fail the next `count` lists with a server error
    pub fn fail_lists(&self, count: usize) {
        self.lock().failing_lists = count;
    }

    pub fn fail_watches(&self) {
        self.lock().fail_watch = true;
    }

    fn apply(&self, namespace: &str, name: &str, patch: &Value, status: bool) -> Result<K, StoreError> {
        let mut state = self.lock();
        if status {
            state.calls.status_patches += 1;
        } else {
            state.calls.patches += 1;
        }

        let key = (namespace.to_string(), name.to_string());
        let Some(current) = state.objects.get(&key).cloned() else {
            return Err(StoreError::not_found::<K>(namespace, name));
        };
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(StoreError::conflict::<K>(namespace, name));
        }
        if let Some(expected) = patch.pointer("/metadata/resourceVersion").and_then(Value::as_str) {
            if Some(expected) != current.meta().resource_version.as_deref() {
                return Err(StoreError::conflict::<K>(namespace, name));
            }
        }

        let mut effective = patch.clone();
        if let Some(map) = effective.as_object_mut() {
            if status {
                map.retain(|k, _| k == "status");
            } else {
                map.remove("status");
                if let Some(Value::Object(metadata)) = map.get_mut("metadata") {
                    metadata.remove("resourceVersion");
                    if metadata.is_empty() {
                        map.remove("metadata");
                    }
                }
            }
        }
        if is_empty(&effective) {
            return Ok(current);
        }

        let before = serde_json::to_value(&current)
            .map_err(|e| StoreError::serialization::<K>(namespace, name, e))?;
        let mut doc = before.clone();
        apply_merge_patch(&mut doc, &effective);
        if doc == before {
            return Ok(current);
        }
        if !status && doc.get("spec") != before.get("spec") {
            let generation = current.meta().generation.unwrap_or(1) + 1;
            doc["metadata"]["generation"] = json!(generation);
        }

        state.resource_version += 1;
        doc["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
        let updated: K = serde_json::from_value(doc)
            .map_err(|e| StoreError::serialization::<K>(namespace, name, e))?;
        state.calls.writes += 1;

        let finalized = updated.meta().deletion_timestamp.is_some()
            && updated.meta().finalizers.as_ref().is_none_or(Vec::is_empty);
        let event = if finalized {
            state.objects.remove(&key);
            WatchEvent::Deleted(updated.clone())
        } else {
            state.objects.insert(key, updated.clone());
            WatchEvent::Modified(updated.clone())
        };
        drop(state);
        let _ = self.events.send(event);
        Ok(updated)
    }
}

/// What the API server returns when it cannot serve a request
fn server_error<K: StoredObject>(namespace: &str, name: &str) -> StoreError {
    StoreError::Api {
        kind: super::kind_of::<K>(),
        key: super::object_key(namespace, name),
        source: kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "etcdserver: request timed out".to_string(),
            reason: "InternalError".to_string(),
            code: 500,
        }),
    }
}

fn key_of<K: StoredObject>(obj: &K) -> Key {
    (
        obj.meta().namespace.clone().unwrap_or_default(),
        obj.meta().name.clone().unwrap_or_default(),
    )
}

fn matches_selector<K: StoredObject>(obj: &K, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = obj.meta().labels.clone().unwrap_or_default();
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key).map(String::as_str) == Some(value),
            None => labels.contains_key(term),
        })
}

#[async_trait]
impl<K: StoredObject> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        let mut state = self.lock();
        state.calls.gets += 1;
        let key = (namespace.to_string(), name.to_string());
        if state.lagging.remove(&key) {
            return Ok(None);
        }
        Ok(state.objects.get(&key).cloned())
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let mut state = self.lock();
        state.calls.creates += 1;
        let key = key_of(obj);
        if state.failing_creates > 0 {
            state.failing_creates -= 1;
            return Err(server_error::<K>(&key.0, &key.1));
        }
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: super::kind_of::<K>(),
                key: super::object_key(&key.0, &key.1),
            });
        }

        state.resource_version += 1;
        let mut created = obj.clone();
        let meta = created.meta_mut();
        meta.resource_version = Some(state.resource_version.to_string());
        meta.generation = Some(1);
        state.objects.insert(key.clone(), created.clone());
        if state.read_lag {
            state.lagging.insert(key);
        }
        state.calls.writes += 1;
        drop(state);
        let _ = self.events.send(WatchEvent::Added(created.clone()));
        Ok(created)
    }

    async fn patch(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError> {
        self.apply(namespace, name, patch, false)
    }

    async fn patch_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError> {
        self.apply(namespace, name, patch, true)
    }

    async fn list(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<K>, StoreError> {
        let mut state = self.lock();
        state.calls.lists += 1;
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(server_error::<K>(namespace, "*"));
        }
        Ok(state
            .objects
            .iter()
            .filter(|((ns, _), obj)| ns == namespace && matches_selector(*obj, label_selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.calls.deletes += 1;
        let key = (namespace.to_string(), name.to_string());
        let Some(current) = state.objects.get(&key).cloned() else {
            return Err(StoreError::not_found::<K>(namespace, name));
        };

        let has_finalizers = current.meta().finalizers.as_ref().is_some_and(|f| !f.is_empty());
        let event = if has_finalizers {
            if current.meta().deletion_timestamp.is_some() {
                return Ok(());
            }
            let mut doc = serde_json::to_value(&current)
                .map_err(|e| StoreError::serialization::<K>(namespace, name, e))?;
            state.resource_version += 1;
            doc["metadata"]["deletionTimestamp"] = json!(chrono::Utc::now()
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true));
            doc["metadata"]["resourceVersion"] = json!(state.resource_version.to_string());
            let marked: K = serde_json::from_value(doc)
                .map_err(|e| StoreError::serialization::<K>(namespace, name, e))?;
            state.objects.insert(key, marked.clone());
            WatchEvent::Modified(marked)
        } else {
            state.objects.remove(&key);
            WatchEvent::Deleted(current)
        };
        state.calls.writes += 1;
        drop(state);
        let _ = self.events.send(event);
        Ok(())
    }

    async fn watch(&self, namespace: &str, name: &str) -> Result<WatchStream<K>, StoreError> {
        // Subscribe before snapshotting so no change between the two is lost
        let receiver = self.events.subscribe();
        let state = self.lock();
        if state.fail_watch {
            return Err(StoreError::Watch(format!(
                "watch on {} refused",
                super::object_key(namespace, name)
            )));
        }
        let key = (namespace.to_string(), name.to_string());
        let current = state.objects.get(&key).cloned();
        drop(state);

        let initial = futures::stream::iter(current.map(|obj| Ok(WatchEvent::Added(obj))));
        let live = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((event, receiver)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .filter(move |event| futures::future::ready(key_of(event.object()) == key))
        .map(Ok);

        Ok(initial.chain(live).boxed())
    }
}
