use anyhow::Context;
use blockscout_service_launcher::{database, launcher::ConfigSettings};
use comp_depends_server::{run_maintainer, run_metrics_server, Settings};
use migration::Migrator;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const SERVICE_NAME: &str = "comp_depends";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");

    blockscout_service_launcher::tracing::init_logs(
        SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    let db_connection = database::initialize_postgres::<Migrator>(&settings.database)
        .await
        .context("database initialization failed")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = ?err, "failed to listen for shutdown signal");
                return;
            }
            tracing::info!("shutdown requested, finishing current notification");
            shutdown.cancel();
        }
    });

    let metrics_server = settings
        .metrics
        .enabled
        .then(|| run_metrics_server(&settings.metrics))
        .transpose()
        .context("failed to start metrics server")?;
    let Some(metrics_server) = metrics_server else {
        return run_maintainer(settings.maintainer, Arc::new(db_connection), shutdown).await;
    };

    let metrics_handle = metrics_server.handle();
    let metrics_server = tokio::spawn(metrics_server);
    let result = run_maintainer(settings.maintainer, Arc::new(db_connection), shutdown).await;
    metrics_handle.stop(true).await;
    if let Err(err) = metrics_server.await? {
        tracing::error!(error = %err, "metrics server failed");
    }
    result
}
