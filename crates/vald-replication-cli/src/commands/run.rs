//! Run command - drives the replication controller until shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vald_replication::ReplicationController;
use vald_replication_config::ReplicationConfig;
use vald_replication_grpc::GrpcRecoveryClient;
use vald_replication_kube::PodWatcher;

pub fn run(config: &ReplicationConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("vald-replication")
        .build()
        .context("Failed to build async runtime")?;

    let handle = runtime.handle().clone();
    runtime.block_on(serve(config, handle))
}

async fn serve(config: &ReplicationConfig, handle: Handle) -> Result<()> {
    let controller_config = config.controller_config();

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let watcher = PodWatcher::new(client, &controller_config.namespace)
        .with_app_label(&config.kubernetes.app_label);
    let recovery = GrpcRecoveryClient::new(config.grpc.port)
        .with_connect_timeout(config.grpc.connect_timeout)
        .with_request_timeout(config.grpc.request_timeout);

    let controller =
        ReplicationController::new(controller_config, Arc::new(watcher), Arc::new(recovery))
            .context("Failed to create replication controller")?
            .with_runtime(handle);

    let cancel = CancellationToken::new();
    let mut errors = controller
        .start(cancel.clone())
        .await
        .context("Failed to start replication controller")?;

    info!(
        pods = ?controller.current_pod_ips().unwrap_or_default(),
        "watching agent pods"
    );

    tokio::spawn(cancel_on_signal(cancel));

    // Closes once every controller task has stopped.
    while let Some(err) = errors.recv().await {
        error!(error = %err, failed = ?err.failed_members(), "replication error");
    }

    let pending = controller.pending_recoveries();
    if !pending.is_empty() {
        warn!(
            pending = pending.len(),
            "stopping with recoveries still pending"
        );
    }
    info!("replication controller stopped");
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    wait_for_signal().await;
    info!("shutdown signal received");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
