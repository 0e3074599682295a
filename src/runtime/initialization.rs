//! # Initialization
//!
//! Controller startup: rustls setup, tracing, metrics, HTTP server startup,
//! configuration and Kubernetes client setup.

use crate::config::{self, ControllerConfig, ServerConfig};
use crate::controller::reconciler::Stores;
use crate::controller::server::{start_server, ServerState};
use crate::crd::CFOrg;
use crate::observability;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub stores: Stores,
    pub controller_config: ControllerConfig,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Configuration loading
/// - Kubernetes client creation
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cf_controller=info".into()),
        )
        .init();

    info!("Starting CF controller v{}", env!("CARGO_PKG_VERSION"));

    observability::metrics::register_metrics()?;

    let (controller_config, server_config) = config::load_config();
    info!(
        root_namespace = %controller_config.root_namespace,
        registry_secrets = ?controller_config.container_registry_secret_names,
        "Loaded configuration"
    );

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });

    // Readiness probes should pass as soon as the controllers start
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    check_crd_queryable(&client, &controller_config.root_namespace).await;

    let stores = Stores::kube(&client);

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        stores,
        controller_config,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Log whether the CRDs are installed; the watch loop retries either way
async fn check_crd_queryable(client: &Client, root_namespace: &str) {
    let orgs: Api<CFOrg> = Api::namespaced(client.clone(), root_namespace);
    match orgs.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("CFOrg CRD is queryable"),
        Err(e) => {
            error!("CFOrg CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}
