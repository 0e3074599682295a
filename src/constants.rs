//! # Constants
//!
//! Well-known label and annotation keys, finalizer tokens, requeue intervals
//! and configuration defaults shared across the controllers.

use std::time::Duration;

/// Field manager recorded on every write issued by the controllers
pub const FIELD_MANAGER: &str = "cf-controller";

// Child namespace metadata
pub const ORG_GUID_LABEL: &str = "korifi.cloudfoundry.org/org-guid";
pub const SPACE_GUID_LABEL: &str = "korifi.cloudfoundry.org/space-guid";
pub const ORG_NAME_ANNOTATION: &str = "cloudfoundry.org/org-name";
pub const SPACE_NAME_ANNOTATION: &str = "cloudfoundry.org/space-name";
pub const POD_SECURITY_ENFORCE_LABEL: &str = "pod-security.kubernetes.io/enforce";
pub const POD_SECURITY_AUDIT_LABEL: &str = "pod-security.kubernetes.io/audit";

// Finalizer tokens
pub const ORG_FINALIZER: &str = "korifi.cloudfoundry.org/cforg-finalizer";
pub const SPACE_FINALIZER: &str = "korifi.cloudfoundry.org/cfspace-finalizer";

// Propagation
/// Back-reference label stamped on every propagated copy; value is the source namespace
pub const PROPAGATED_FROM_LABEL: &str = "cloudfoundry.org/propagated-from";
pub const PROPAGATE_ROLE_BINDING_ANNOTATION: &str = "cloudfoundry.org/propagate-cf-role";
pub const PROPAGATE_SERVICE_ACCOUNT_ANNOTATION: &str = "cloudfoundry.org/propagate-service-account";
/// A propagated copy carrying `"false"` here survives removal of its source
pub const PROPAGATE_DELETION_ANNOTATION: &str = "cloudfoundry.org/propagate-deletion";
/// Metadata key prefixes owned by deployment tooling; never copied
pub const PROPAGATION_DENYLIST_PREFIXES: &[&str] = &["kapp.k14s.io/", "kubectl.kubernetes.io/"];

// Ready condition reasons
pub const REASON_READY: &str = "Ready";
pub const REASON_INITIALIZING: &str = "Initializing";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";
pub const REASON_NAMESPACE_CREATION: &str = "NamespaceCreation";
pub const REASON_NAMESPACE_NOT_READY: &str = "NamespaceNotReady";
pub const REASON_REGISTRY_SECRET_PROPAGATION: &str = "RegistrySecretPropagation";
pub const REASON_ROLE_BINDING_PROPAGATION: &str = "RoleBindingPropagation";
pub const REASON_SERVICE_ACCOUNT_PROPAGATION: &str = "ServiceAccountPropagation";

// Requeue intervals
pub const NAMESPACE_NOT_READY_REQUEUE: Duration = Duration::from_millis(100);
/// Pass that only recorded the finalizer token; provisioning waits for it to be stored
pub const FINALIZER_ADDED_REQUEUE: Duration = Duration::from_millis(100);
pub const CONTAINED_OBJECTS_DELETION_REQUEUE: Duration = Duration::from_millis(500);
pub const NAMESPACE_DELETION_REQUEUE: Duration = Duration::from_secs(1);

// Optimistic concurrency retry envelope for status/spec write-back
pub const CONFLICT_RETRY_STEPS: u32 = 5;
pub const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(10);

// Error policy backoff (seconds)
pub const ERROR_BACKOFF_MIN_SECS: u64 = 1;
pub const ERROR_BACKOFF_MAX_SECS: u64 = 300;

// Configuration defaults
pub const DEFAULT_ROOT_NAMESPACE: &str = "cf";
pub const DEFAULT_CONTAINER_REGISTRY_SECRET_NAMES: &str = "image-registry-credentials";
pub const DEFAULT_SPACE_FINALIZER_APP_DELETION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ORG_FINALIZER_SPACE_DELETION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_NAMESPACE_POD_SECURITY_LEVEL: &str = "restricted";
pub const DEFAULT_AWAITER_TIMEOUT_SECS: u64 = 30;

// HTTP server defaults
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
