use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use deployline_api::{ApiState, build_router};
use deployline_metrics::{InMemoryMetricSource, epoch_secs};
use deployline_rollout::{AliasRegistry, CanaryController, Provisioner};

use super::load_config;
use super::run::open_store;
use crate::provisioner::LocalProvisioner;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

pub async fn serve(
    port: u16,
    config_path: Option<&Path>,
    data_dir: &Path,
    metrics_retention: u64,
) -> anyhow::Result<()> {
    let aliases = AliasRegistry::new();
    let metrics = InMemoryMetricSource::new();
    let controller = CanaryController::new(aliases.clone(), Arc::new(metrics.clone()));

    if let Some(path) = config_path {
        seed_alias(path, data_dir, &aliases).await?;
    }

    // ── Background tasks ─────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pruned = metrics.clone();
    let prune_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        let mut shutdown = shutdown_rx;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let before = epoch_secs().saturating_sub(metrics_retention);
                    let dropped = pruned.prune(before).await;
                    if dropped > 0 {
                        debug!(dropped, "pruned expired datapoints");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });

    // ── REST API server ──────────────────────────────────────────
    let router = build_router(ApiState {
        controller: controller.clone(),
        metrics,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for CTRL+C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    controller.stop_all().await;
    let _ = prune_handle.await;

    info!("control plane stopped");
    Ok(())
}

/// Point the unit's alias at its most recently built artifact.
async fn seed_alias(
    config_path: &Path,
    data_dir: &Path,
    aliases: &AliasRegistry,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let unit = config.unit();
    let name = config.deploy_artifact()?;
    let store = open_store(data_dir)?;

    let Some(artifact) = store.latest(&name)? else {
        warn!(unit = %unit.name, artifact = %name, "no built artifact; alias not created");
        return Ok(());
    };
    let bytes = store.get(&artifact)?;
    let provisioner = LocalProvisioner::new(data_dir.join("versions"));
    let version = provisioner.create_version(&unit, &artifact, &bytes).await?;
    aliases.create(&unit.alias, version.clone()).await?;
    info!(unit = %unit.name, alias = %unit.alias, %version, "alias created");
    Ok(())
}
