//! Print the CRD manifests as a multi-document YAML stream
//!
//! Usage:
//!   cargo run --bin crdgen | kubectl apply -f -

use anyhow::{Context, Result};
use cf_controller::{CFApp, CFOrg, CFSpace, CFTask};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crds = [CFOrg::crd(), CFSpace::crd(), CFApp::crd(), CFTask::crd()];
    for crd in &crds {
        let yaml = serde_yaml::to_string(crd).context("Failed to serialize CRD")?;
        print!("---\n{yaml}");
    }
    Ok(())
}
