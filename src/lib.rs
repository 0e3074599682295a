//! CF Controller Library
//!
//! Reconciliation core for the Cloud Foundry control plane: namespace-backed
//! orgs and spaces, credential propagation into tenant namespaces, finalizers,
//! and condition awaiting.
//! Tests are included in the module files (e.g., `controller/reconciler/namespace.rs`).

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;

// Re-export CRD types for convenience
pub use crd::*;
