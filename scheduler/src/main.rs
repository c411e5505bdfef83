// Scheduler binary entry point: periodic trigger for due scheduled jobs

use anyhow::{Context, Result};
use common::bootstrap::init_scheduling_coordinator;
use common::config::Settings;
use common::telemetry;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// How long in-flight publications may run after a shutdown signal before
/// pending retry sleeps are cancelled
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    settings
        .validate()
        .context("Invalid configuration")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        settings.observability.tracing_endpoint.as_deref(),
    )?;
    telemetry::init_metrics(settings.observability.metrics_port)?;

    info!(
        poll_interval_seconds = settings.scheduler.poll_interval_seconds,
        batch_limit = settings.scheduler.batch_limit,
        worker_concurrency = settings.scheduler.worker_concurrency,
        "Starting Postline scheduler"
    );

    let (_db_pool, coordinator) = init_scheduling_coordinator(&settings).await?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let poll_interval = Duration::from_secs(settings.scheduler.poll_interval_seconds.max(1));

    let loop_coordinator = coordinator.clone();
    let mut trigger_loop = tokio::spawn(async move {
        loop_coordinator
            .run_trigger_loop(poll_interval, shutdown_rx)
            .await;
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        joined = &mut trigger_loop => {
            if let Err(e) = joined {
                error!(error = %e, "Trigger loop terminated unexpectedly");
            }
            telemetry::shutdown_tracer();
            return Ok(());
        }
    }

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut trigger_loop)
        .await
        .is_err()
    {
        warn!(
            in_flight = coordinator.publisher().executor().in_flight(),
            "Grace period elapsed, cancelling pending retries"
        );
        coordinator.publisher().executor().cancel_pending();
        if let Err(e) = trigger_loop.await {
            error!(error = %e, "Trigger loop terminated unexpectedly");
        }
    }

    telemetry::shutdown_tracer();
    info!("Scheduler stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }

    info!("Initiating graceful shutdown");
}
