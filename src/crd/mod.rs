//! # Custom Resource Definitions
//!
//! CRD types for the Cloud Foundry control plane.
//!
//! The schemas are plain data: all behaviour lives in the reconcilers. Each kind
//! exposes its status conditions and generation bookkeeping through
//! [`HasConditions`] and [`HasGeneration`], and the namespace-backed kinds
//! additionally implement [`NamespaceBacked`].

mod status;

pub use status::*;

use crate::constants;
use crate::controller::conditions::{HasConditions, HasGeneration};
use crate::controller::reconciler::NamespaceBacked;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CFOrg Custom Resource Definition
///
/// An org lives in the root namespace and owns a child namespace of the same
/// name, in which its spaces are created.
///
/// # Example
///
/// ```yaml
/// apiVersion: korifi.cloudfoundry.org/v1alpha1
/// kind: CFOrg
/// metadata:
///   name: cf-org-5f3c
///   namespace: cf
/// spec:
///   displayName: foo
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFOrg",
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    namespaced,
    status = "NamespaceBackedStatus",
    shortname = "cforg",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFOrgSpec {
    /// Human readable org name
    pub display_name: String,
}

/// CFSpace Custom Resource Definition
///
/// A space lives in its org's namespace and owns a child namespace of the same
/// name, in which its apps and tasks are created.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFSpace",
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    namespaced,
    status = "NamespaceBackedStatus",
    shortname = "cfspace",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFSpaceSpec {
    /// Human readable space name
    pub display_name: String,
}

/// CFApp Custom Resource Definition
///
/// The workload contained in a space namespace. Deleting a space first
/// deletes its apps.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFApp",
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    namespaced,
    status = "CFAppStatus",
    shortname = "cfapp",
    printcolumn = r#"{"name":"Display Name", "type":"string", "jsonPath":".spec.displayName"}, {"name":"State", "type":"string", "jsonPath":".status.actualState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFAppSpec {
    /// Human readable app name
    pub display_name: String,
    /// State requested by the user
    #[serde(default)]
    pub desired_state: AppState,
}

/// CFTask Custom Resource Definition
///
/// A one-off command run against an app. Synchronous callers block on its
/// `Started`, `Succeeded` or `Failed` conditions through the awaiter.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "CFTask",
    group = "korifi.cloudfoundry.org",
    version = "v1alpha1",
    namespaced,
    status = "CFTaskStatus",
    shortname = "cftask",
    printcolumn = r#"{"name":"Succeeded", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Succeeded\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CFTaskSpec {
    /// Command to run
    pub command: Vec<String>,
    /// Name of the CFApp the task runs against
    pub app_ref: String,
}

/// App lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AppState {
    Started,
    #[default]
    Stopped,
}

/// Task condition types
pub const TASK_INITIALIZED_CONDITION: &str = "Initialized";
pub const TASK_STARTED_CONDITION: &str = "Started";
pub const TASK_SUCCEEDED_CONDITION: &str = "Succeeded";
pub const TASK_FAILED_CONDITION: &str = "Failed";

macro_rules! impl_status_accessors {
    ($kind:ty, $status:ty) => {
        impl HasConditions for $kind {
            fn conditions(&self) -> &[Condition] {
                self.status
                    .as_ref()
                    .map(|s| s.conditions.as_slice())
                    .unwrap_or_default()
            }

            fn conditions_mut(&mut self) -> &mut Vec<Condition> {
                &mut self.status.get_or_insert_with(<$status>::default).conditions
            }
        }

        impl HasGeneration for $kind {
            fn observed_generation(&self) -> Option<i64> {
                self.status.as_ref().and_then(|s| s.observed_generation)
            }

            fn set_observed_generation(&mut self, generation: i64) {
                self.status
                    .get_or_insert_with(<$status>::default)
                    .observed_generation = Some(generation);
            }
        }
    };
}

impl_status_accessors!(CFOrg, NamespaceBackedStatus);
impl_status_accessors!(CFSpace, NamespaceBackedStatus);
impl_status_accessors!(CFApp, CFAppStatus);
impl_status_accessors!(CFTask, CFTaskStatus);

impl NamespaceBacked for CFOrg {
    const GUID_LABEL: &'static str = constants::ORG_GUID_LABEL;
    const NAME_ANNOTATION: &'static str = constants::ORG_NAME_ANNOTATION;
    const FINALIZER: &'static str = constants::ORG_FINALIZER;

    fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    fn set_guid(&mut self, guid: String) {
        self.status
            .get_or_insert_with(NamespaceBackedStatus::default)
            .guid = Some(guid);
    }
}

impl NamespaceBacked for CFSpace {
    const GUID_LABEL: &'static str = constants::SPACE_GUID_LABEL;
    const NAME_ANNOTATION: &'static str = constants::SPACE_NAME_ANNOTATION;
    const FINALIZER: &'static str = constants::SPACE_FINALIZER;

    fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    fn set_guid(&mut self, guid: String) {
        self.status
            .get_or_insert_with(NamespaceBackedStatus::default)
            .guid = Some(guid);
    }
}
