//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controllers, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text exposition
//! - `controller_metrics` - Reconcile, propagation, finalizer and awaiter metrics

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
