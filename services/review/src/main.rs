use anyhow::{Context, Result};
use review_service::api::{start_api_server, supervise_api_server, AppState};
use review_service::{AssetUrlIssuer, Config, PgReviewStore, ReviewEngine, S3UrlSigner};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting review service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    let store = PgReviewStore::new(&config.database)
        .await
        .context("Failed to initialize review store")?;

    // Run migrations if enabled
    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let signer = S3UrlSigner::new(&config.blob)
        .await
        .context("Failed to initialize S3 URL signer")?;
    let issuer = AssetUrlIssuer::new(
        Arc::new(signer),
        config.blob.default_bucket.clone(),
        config.blob.url_validity_minutes,
    );

    let engine = Arc::new(ReviewEngine::new(
        Arc::new(store),
        issuer,
        config.review.clone(),
    ));

    let api_state = AppState { engine };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move { start_api_server(api_state, &api_config).await });

    info!("Review service started successfully");

    // Run until a shutdown signal, or fail if the API server stops first
    supervise_api_server(api_handle, shutdown_signal()).await?;

    info!("Review service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
