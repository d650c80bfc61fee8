//! HTTP surface and server assembly.
//!
//! Routes: the WebSocket upgrade, the read-only session lookup, and a
//! health probe. The lookup endpoint is the only way to observe a session
//! without joining it; it applies the same sanitization as any outbound
//! WebSocket message.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info};

use cadence_core::SystemClock;
use cadence_protocol::fields::format_session_id;

use crate::broker::Broker;
use crate::config::Config;
use crate::metrics;
use crate::ws::ws_handler;

/// Shared server state.
pub struct AppState {
    /// The session broker.
    pub broker: Arc<Broker>,
    /// Server configuration.
    pub config: Config,
}

/// Run the HTTP/WebSocket server until shutdown.
///
/// # Errors
///
/// Returns an error if a listener fails to bind or the server fails.
pub async fn run_server(config: Config) -> Result<()> {
    let broker = Arc::new(Broker::new(
        Arc::new(SystemClock),
        config.cleanup.interval_ms as i64,
        config.cleanup.session_timeout_ms as i64,
    ));
    let cleanup = broker.clone().spawn_cleanup();

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let state = Arc::new(AppState {
        broker: broker.clone(),
        config: config.clone(),
    });

    let mut app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/session/:session_id", get(session_lookup));
    if config.shared_listener() {
        app = app.route(&config.transport.websocket_path, get(ws_handler));
    }
    let app = app.with_state(state.clone());

    // A distinct WS_PORT gets its own listener serving only the upgrade.
    if !config.shared_listener() {
        let ws_app = Router::new()
            .route(&config.transport.websocket_path, get(ws_handler))
            .with_state(state);
        let ws_listener = TcpListener::bind((config.host.as_str(), config.ws_port())).await?;
        info!(
            "WebSocket endpoint: ws://{}:{}{}",
            config.host,
            config.ws_port(),
            config.transport.websocket_path
        );
        tokio::spawn(async move {
            if let Err(e) = axum::serve(ws_listener, ws_app)
                .with_graceful_shutdown(shutdown_signal())
                .await
            {
                tracing::error!("WebSocket listener failed: {}", e);
            }
        });
    } else {
        info!(
            "WebSocket endpoint: ws://{}:{}{}",
            config.host, config.port, config.transport.websocket_path
        );
    }

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Cadence server listening on {}:{}", config.host, config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Shutdown: stop the reaper and drop all in-memory sessions.
    cleanup.abort();
    broker.store().clear();
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `GET /api/session/:session_id` - sanitized session snapshot or 404.
async fn session_lookup(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let handle = format_session_id(&session_id)
        .and_then(|session_id| state.broker.store().get(&session_id));

    match handle {
        Some(handle) => {
            let mut session = handle.lock().await;
            debug!(session = %session.session_id, "Session lookup");
            Json(session.to_public().formatted()).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Session not found"})),
        )
            .into_response(),
    }
}
