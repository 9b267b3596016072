//! imgsweep
//!
//! Runs on a container host next to the Docker engine. Every container
//! creation refreshes the last-used time of its image; images left unused
//! for longer than the retention window are removed.

use std::sync::Arc;

use anyhow::{Context, Result};
use imgsweep_agent::config::Config;
use imgsweep_agent::docker::DockerClient;
use imgsweep_agent::{logging, ImageRuntime, Orchestrator, SystemClock};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    logging::init(&config.log_level, config.log_format);

    info!("Starting imgsweep");

    let policy = &config.policy;
    info!(
        retention_secs = policy.retention_secs,
        enforcing = policy.enforcing,
        prune_dangling = policy.prune_dangling,
        exclude_name_prefix = ?policy.exclusions.name_prefixes,
        exclude_name_suffix = ?policy.exclusions.name_suffixes,
        exclude_tag_prefix = ?policy.exclusions.tag_prefixes,
        exclude_tag_suffix = ?policy.exclusions.tag_suffixes,
        exclude_label = ?policy.exclusions.label_values,
        docker_socket = %config.docker_socket.display(),
        "Configuration loaded"
    );

    let client = DockerClient::from_config(&config);
    client
        .ensure_socket()
        .context("Docker socket is not available")?;

    let runtime: Arc<dyn ImageRuntime> = Arc::new(client);
    let mut orchestrator = Orchestrator::start(runtime, config.policy.clone(), Arc::new(SystemClock))
        .await
        .context("Docker engine is not reachable")?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for shutdown signal");
                // Keep the sender alive so the loop is not stopped by a closed channel.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    match orchestrator.subscribe_and_run(shutdown_rx).await {
        Ok(reason) => {
            info!(reason = ?reason, "imgsweep shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, reason = e.reason_code(), "imgsweep stopped");
            Err(e.into())
        }
    }
}
