//! # Awaiter
//!
//! Blocks a caller until a watched object satisfies a predicate.
//!
//! Used by synchronous API paths such as "run this task and wait until it
//! starts". Every wait is bounded by the awaiter's own timeout regardless of
//! the caller's cancellation token, and the watch is dropped on every exit.

use crate::config::ControllerConfig;
use crate::controller::conditions::{self, HasConditions, HasGeneration};
use crate::observability;
use crate::store::{kind_of, object_key, ObjectStore, StoreError, StoredObject};
use futures::StreamExt;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum AwaitError {
    #[error("failed to watch {kind} {key}: {source}")]
    WatchOpen {
        kind: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("timed out after {timeout:?} waiting for {kind} {key} to reach {target}")]
    Timeout {
        kind: String,
        key: String,
        target: String,
        timeout: Duration,
    },

    #[error("watch on {kind} {key} failed: {source}")]
    Watch {
        kind: String,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("watch on {kind} {key} closed before it reached {target}")]
    WatchClosed {
        kind: String,
        key: String,
        target: String,
    },

    #[error("cancelled while waiting for {kind} {key} to reach {target}")]
    Cancelled {
        kind: String,
        key: String,
        target: String,
    },
}

impl AwaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Waits on objects of one kind
pub struct Awaiter<K> {
    store: Arc<dyn ObjectStore<K>>,
    timeout: Duration,
}

impl<K> std::fmt::Debug for Awaiter<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Awaiter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<K: StoredObject> Awaiter<K> {
    pub fn new(store: Arc<dyn ObjectStore<K>>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Awaiter bounded by `AWAITER_TIMEOUT_SECS`
    pub fn from_config(store: Arc<dyn ObjectStore<K>>, config: &ControllerConfig) -> Self {
        Self::new(store, config.awaiter_timeout())
    }

    /// Wait until the object's condition of type `condition_type` is True and fresh
    pub async fn await_condition(
        &self,
        cancel: &CancellationToken,
        obj: &K,
        condition_type: &str,
    ) -> Result<K, AwaitError>
    where
        K: HasConditions + HasGeneration,
    {
        self.await_state(cancel, obj, &format!("condition {condition_type}"), |o| {
            conditions::is_true_and_fresh(o, condition_type)
        })
        .await
    }

    /// Wait until `predicate` holds for the watched object
    ///
    /// `target` describes what is awaited and appears in errors.
    pub async fn await_state<F>(
        &self,
        cancel: &CancellationToken,
        obj: &K,
        target: &str,
        predicate: F,
    ) -> Result<K, AwaitError>
    where
        F: Fn(&K) -> bool + Send + Sync,
    {
        let kind = kind_of::<K>();
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let key = object_key(&namespace, &name);

        let mut events = self
            .store
            .watch(&namespace, &name)
            .await
            .map_err(|source| AwaitError::WatchOpen {
                kind: kind.clone(),
                key: key.clone(),
                source,
            })?;

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!("Timed out waiting for {} {} to reach {}", kind, key, target);
                    observability::metrics::increment_awaiter_timeouts(&kind);
                    return Err(AwaitError::Timeout {
                        kind,
                        key,
                        target: target.to_string(),
                        timeout: self.timeout,
                    });
                }
                () = cancel.cancelled() => {
                    return Err(AwaitError::Cancelled {
                        kind,
                        key,
                        target: target.to_string(),
                    });
                }
                event = events.next() => match event {
                    Some(Ok(event)) => {
                        let observed = event.into_object();
                        if predicate(&observed) {
                            debug!("{} {} reached {}", kind, key, target);
                            return Ok(observed);
                        }
                    }
                    Some(Err(source)) => return Err(AwaitError::Watch { kind, key, source }),
                    None => {
                        return Err(AwaitError::WatchClosed {
                            kind,
                            key,
                            target: target.to_string(),
                        })
                    }
                },
            }
        }
    }
}
