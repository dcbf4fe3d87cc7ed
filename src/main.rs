// Main entry point for the OCR task service

use ocr_workflow::{api, core::Config, services::EngineRegistry, utils::Metrics, BACKEND_FEATURES};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    let level = config.log_level().to_string().to_lowercase();
    let filter = EnvFilter::new(format!(
        "ocr_workflow={level},tower_http={level},ort=off"
    ));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== OCR WORKFLOW v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: max_active_tasks={} retention={}s max_upload={}MB backends_compiled={}",
        config.max_active_tasks(),
        config.retention().as_secs(),
        config.max_upload_bytes() / (1024 * 1024),
        BACKEND_FEATURES
    );

    // Probe recognition backends (blocking: subprocesses and model loading)
    info!("Initializing OCR engines...");
    let engine_config = config.engines.clone();
    let registry = tokio::task::spawn_blocking(move || EngineRegistry::initialize(&engine_config))
        .await
        .context("Engine initialization panicked")?;
    if !registry.is_ready() {
        anyhow::bail!("No OCR backend could be registered");
    }
    if !registry.has_text_backend() {
        warn!("Only the contour fallback is available; results will contain region counts, not text");
    }

    let metrics = Metrics::new();
    let state = api::AppState::new(config.clone(), Arc::new(registry), metrics);
    let app = api::router(state);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /                     - Root endpoint");
    info!("  GET  /health               - Health check");
    info!("  GET  /status               - Engine and task status");
    info!("  POST /upload               - Submit images (multipart/form-data)");
    info!("  GET  /progress/{{task_id}}   - Task progress and results");
    info!("  GET  /download/{{task_id}}   - Text report of a completed task");
    info!("  GET  /tasks                - Retained tasks");
    info!("  GET  /metrics              - Prometheus metrics");
    info!("  GET  /stats                - Detailed statistics");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
