//! # Observability
//!
//! Prometheus metrics for the controllers. Logging goes through `tracing` and
//! is configured at startup in [`crate::runtime::initialization`].

pub mod metrics;
