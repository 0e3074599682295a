//! # Contained Objects Finalizer
//!
//! Deletes the objects living in a resource's child namespace (apps of a
//! space, spaces of an org) before the namespace itself goes.
//!
//! Cleanup is bounded: once the resource has been terminating for longer than
//! the configured timeout the finalizer logs and reports success, so deletion
//! is never blocked forever. Whatever was not deleted by then is abandoned; no
//! separate sweep collects it.

use super::{deletion_elapsed, Finalizer};
use crate::constants;
use crate::controller::reconciler::{ReconcilerError, Requeue};
use crate::observability;
use crate::store::{kind_of, ObjectStore, StoredObject};
use async_trait::async_trait;
use kube::ResourceExt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Deletes every `C` in the child namespace of a `K`
pub struct ContainedObjectsFinalizer<K, C> {
    contained: Arc<dyn ObjectStore<C>>,
    timeout: Duration,
    _owner: PhantomData<fn(K)>,
}

impl<K, C> std::fmt::Debug for ContainedObjectsFinalizer<K, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainedObjectsFinalizer")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<K, C> ContainedObjectsFinalizer<K, C> {
    pub fn new(contained: Arc<dyn ObjectStore<C>>, timeout: Duration) -> Self {
        Self {
            contained,
            timeout,
            _owner: PhantomData,
        }
    }
}

#[async_trait]
impl<K, C> Finalizer<K> for ContainedObjectsFinalizer<K, C>
where
    K: StoredObject,
    C: StoredObject,
{
    async fn finalize(&self, obj: &mut K) -> Result<Requeue, ReconcilerError> {
        let namespace = obj.name_any();
        let elapsed = deletion_elapsed(obj.meta());
        if elapsed > self.timeout {
            warn!(
                "Timed out deleting {}s in namespace {} after {:?}, giving up",
                kind_of::<C>(),
                namespace,
                elapsed
            );
            observability::metrics::increment_finalizer_give_ups(&kind_of::<K>());
            return Ok(Requeue::Done);
        }

        let contained = self.contained.list(&namespace, None).await?;
        if contained.is_empty() {
            return Ok(Requeue::Done);
        }

        debug!("Deleting {} {}(s) in namespace {}", contained.len(), kind_of::<C>(), namespace);
        for item in contained.iter().filter(|c| c.meta().deletion_timestamp.is_none()) {
            match self.contained.delete(&namespace, &item.name_any()).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Requeue::After(constants::CONTAINED_OBJECTS_DELETION_REQUEUE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{AppState, CFApp, CFAppSpec, CFSpace, CFSpaceSpec};
    use crate::store::memory::MemoryStore;

    fn space_deleted_at(timestamp: &str) -> CFSpace {
        let mut space = CFSpace::new(
            "cf-space-1",
            CFSpaceSpec {
                display_name: "foo".to_string(),
            },
        );
        space.metadata.namespace = Some("cf-org-1".to_string());
        space.metadata.deletion_timestamp =
            serde_json::from_value(serde_json::json!(timestamp)).unwrap();
        space
    }

    fn app(name: &str, finalizer: Option<&str>) -> CFApp {
        let mut app = CFApp::new(
            name,
            CFAppSpec {
                display_name: name.to_string(),
                desired_state: AppState::Stopped,
            },
        );
        app.metadata.namespace = Some("cf-space-1".to_string());
        app.metadata.finalizers = finalizer.map(|f| vec![f.to_string()]);
        app
    }

    fn finalizer(apps: &Arc<MemoryStore<CFApp>>) -> ContainedObjectsFinalizer<CFSpace, CFApp> {
        ContainedObjectsFinalizer::new(
            Arc::clone(apps) as Arc<dyn ObjectStore<CFApp>>,
            Duration::from_secs(60),
        )
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    #[tokio::test]
    async fn test_no_contained_objects_is_done() {
        let apps = Arc::new(MemoryStore::<CFApp>::new());
        let result = finalizer(&apps)
            .finalize(&mut space_deleted_at(&now()))
            .await
            .unwrap();
        assert_eq!(result, Requeue::Done);
    }

    #[tokio::test]
    async fn test_deletes_contained_objects_and_requeues() {
        let apps = Arc::new(MemoryStore::<CFApp>::new());
        apps.insert(app("dora", None));
        // Held by its own finalizer: stays terminating across passes
        apps.insert(app("slow", Some("korifi.cloudfoundry.org/cfapp-finalizer")));
        let finalizer = finalizer(&apps);
        let mut space = space_deleted_at(&now());

        let first = finalizer.finalize(&mut space).await.unwrap();
        assert_eq!(first, Requeue::After(constants::CONTAINED_OBJECTS_DELETION_REQUEUE));
        assert_eq!(apps.names("cf-space-1"), vec!["slow".to_string()]);
        assert_eq!(apps.calls().deletes, 2);

        // Already terminating objects are not deleted again
        let second = finalizer.finalize(&mut space).await.unwrap();
        assert_eq!(second, Requeue::After(constants::CONTAINED_OBJECTS_DELETION_REQUEUE));
        assert_eq!(apps.calls().deletes, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_timeout() {
        let apps = Arc::new(MemoryStore::<CFApp>::new());
        apps.insert(app("stuck", Some("korifi.cloudfoundry.org/cfapp-finalizer")));

        let result = finalizer(&apps)
            .finalize(&mut space_deleted_at("2020-01-01T00:00:00Z"))
            .await
            .unwrap();

        assert_eq!(result, Requeue::Done);
        assert_eq!(apps.calls().deletes, 0);
        assert_eq!(apps.names("cf-space-1"), vec!["stuck".to_string()]);
    }
}
