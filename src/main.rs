//! # CF Controller
//!
//! Kubernetes controllers backing Cloud Foundry orgs and spaces.
//!
//! ## Overview
//!
//! For every CFOrg and CFSpace the controller:
//!
//! 1. **Provisions a child namespace** named after the resource, labelled with its GUID
//! 2. **Propagates credentials** - registry secrets, flagged role bindings and service accounts
//! 3. **Prunes stale copies** whose source is gone or no longer flagged
//! 4. **Tears down on deletion** - contained objects first, then the namespace, then the finalizer
//!
//! Progress is reported exclusively through the resource's `Ready` condition.
//!
//! ## Endpoints
//!
//! - `/healthz`, `/readyz` - probes
//! - `/metrics` - Prometheus metrics

use anyhow::Result;
use cf_controller::runtime::initialization::initialize;
use cf_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(init_result).await
}
