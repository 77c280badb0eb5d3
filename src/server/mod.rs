//! HTTP front end for the prediction service

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServerSettings;

/// Serve `state` until ctrl+c
pub async fn run_server(settings: &ServerSettings, state: Arc<AppState>) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let health = state.service.health();
    if !health.model_loaded {
        warn!(
            uri = %state.service.production_uri(),
            "No production model loaded, predictions return 503 until a reload succeeds"
        );
    }

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    info!(
        address = %addr,
        model_loaded = health.model_loaded,
        model_version = ?health.model_version,
        log_requests = settings.log_requests,
        started_at = %start_time.to_rfc3339(),
        "Prediction server starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
