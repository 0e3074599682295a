//! # Controller
//!
//! Reconciliation core and its supporting pieces.
//!
//! - `conditions` - status condition helpers and the Ready condition builder
//! - `labels` - metadata compiler for child namespaces
//! - `reconciler` - patching reconciler, namespace reconciler and propagation
//! - `finalizer` - deletion hooks consulted by the namespace reconciler
//! - `awaiter` - watch-based waiting for conditions
//! - `backoff` - Fibonacci backoff used by the error policy
//! - `server` - health and metrics HTTP endpoints

pub mod awaiter;
pub mod backoff;
pub mod conditions;
pub mod finalizer;
pub mod labels;
pub mod reconciler;
pub mod server;
