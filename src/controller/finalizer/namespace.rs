//! # Namespace Finalizer
//!
//! Deletes the child namespace after the delegate is done and releases the
//! resource's finalizer token once the namespace is confirmed gone.

use super::{has_finalizer, remove_finalizer, Finalizer};
use crate::constants;
use crate::controller::reconciler::{NamespaceBacked, ReconcilerError, Requeue};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

pub struct NamespaceFinalizer<K> {
    namespaces: Arc<dyn ObjectStore<Namespace>>,
    delegate: Arc<dyn Finalizer<K>>,
}

impl<K> std::fmt::Debug for NamespaceFinalizer<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceFinalizer").finish_non_exhaustive()
    }
}

impl<K> NamespaceFinalizer<K> {
    pub fn new(namespaces: Arc<dyn ObjectStore<Namespace>>, delegate: Arc<dyn Finalizer<K>>) -> Self {
        Self {
            namespaces,
            delegate,
        }
    }
}

#[async_trait]
impl<K: NamespaceBacked> Finalizer<K> for NamespaceFinalizer<K> {
    async fn finalize(&self, obj: &mut K) -> Result<Requeue, ReconcilerError> {
        if !has_finalizer(obj.meta(), K::FINALIZER) {
            return Ok(Requeue::Done);
        }

        let requeue = self.delegate.finalize(obj).await?;
        if !requeue.is_done() {
            return Ok(requeue);
        }

        let name = obj.name_any();
        match self.namespaces.delete("", &name).await {
            Ok(()) => {
                debug!("Namespace {} deletion in progress", name);
                Ok(Requeue::After(constants::NAMESPACE_DELETION_REQUEUE))
            }
            Err(e) if e.is_not_found() => {
                remove_finalizer(obj.meta_mut(), K::FINALIZER);
                info!("Namespace {} is gone, removed finalizer {}", name, K::FINALIZER);
                Ok(Requeue::Done)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::finalizer::NoopFinalizer;
    use crate::crd::{CFOrg, CFOrgSpec};
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Delegate that requeues a fixed number of times before finishing
    struct Countdown {
        remaining: AtomicUsize,
    }

    #[async_trait]
    impl Finalizer<CFOrg> for Countdown {
        async fn finalize(&self, _obj: &mut CFOrg) -> Result<Requeue, ReconcilerError> {
            let remaining = self.remaining.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(Requeue::Done);
            }
            self.remaining.store(remaining - 1, Ordering::SeqCst);
            Ok(Requeue::After(std::time::Duration::from_millis(500)))
        }
    }

    fn org(with_token: bool) -> CFOrg {
        let mut org = CFOrg::new(
            "cf-org-1",
            CFOrgSpec {
                display_name: "foo".to_string(),
            },
        );
        org.metadata.namespace = Some("cf".to_string());
        if with_token {
            org.metadata.finalizers = Some(vec![constants::ORG_FINALIZER.to_string()]);
        }
        org
    }

    fn namespaces_with_child() -> Arc<MemoryStore<Namespace>> {
        let namespaces = Arc::new(MemoryStore::<Namespace>::new());
        let mut ns = Namespace::default();
        ns.metadata.name = Some("cf-org-1".to_string());
        namespaces.insert(ns);
        namespaces
    }

    #[tokio::test]
    async fn test_absent_token_is_a_no_op() {
        let namespaces = namespaces_with_child();
        let finalizer = NamespaceFinalizer::new(
            Arc::clone(&namespaces) as Arc<dyn ObjectStore<Namespace>>,
            Arc::new(NoopFinalizer),
        );

        let result = finalizer.finalize(&mut org(false)).await.unwrap();

        assert_eq!(result, Requeue::Done);
        assert_eq!(namespaces.calls().deletes, 0);
    }

    #[tokio::test]
    async fn test_token_removed_only_after_delegate_and_namespace_are_done() {
        let namespaces = namespaces_with_child();
        let finalizer = NamespaceFinalizer::new(
            Arc::clone(&namespaces) as Arc<dyn ObjectStore<Namespace>>,
            Arc::new(Countdown {
                remaining: AtomicUsize::new(1),
            }),
        );
        let mut org = org(true);

        // Delegate still busy: namespace untouched
        let first = finalizer.finalize(&mut org).await.unwrap();
        assert!(!first.is_done());
        assert_eq!(namespaces.calls().deletes, 0);
        assert!(has_finalizer(&org.metadata, constants::ORG_FINALIZER));

        // Delete issued: token kept until the namespace is confirmed gone
        let second = finalizer.finalize(&mut org).await.unwrap();
        assert_eq!(second, Requeue::After(constants::NAMESPACE_DELETION_REQUEUE));
        assert!(has_finalizer(&org.metadata, constants::ORG_FINALIZER));

        let third = finalizer.finalize(&mut org).await.unwrap();
        assert_eq!(third, Requeue::Done);
        assert!(!has_finalizer(&org.metadata, constants::ORG_FINALIZER));
    }

    #[tokio::test]
    async fn test_delegate_error_is_returned_verbatim() {
        struct Failing;

        #[async_trait]
        impl Finalizer<CFOrg> for Failing {
            async fn finalize(&self, _obj: &mut CFOrg) -> Result<Requeue, ReconcilerError> {
                Err(crate::store::StoreError::Watch("boom".to_string()).into())
            }
        }

        let namespaces = namespaces_with_child();
        let finalizer = NamespaceFinalizer::new(
            Arc::clone(&namespaces) as Arc<dyn ObjectStore<Namespace>>,
            Arc::new(Failing),
        );

        let err = finalizer.finalize(&mut org(true)).await.unwrap_err();

        assert!(matches!(err, ReconcilerError::Store(_)));
        assert_eq!(namespaces.calls().deletes, 0);
    }
}
