//! HTTP surface: the `/ws` upgrade plus operational endpoints.

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{RelayConfig, ServerConfig};
use crate::metrics::{HealthStatus, RelayMetrics};
use crate::relay::{ConnectionRegistry, EventRouter, handle_connection};

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<EventRouter>,
    pub metrics: Arc<RelayMetrics>,
    pub relay_config: Arc<RelayConfig>,
    /// Cancelled when the server stops; every connection actor watches it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(relay_config: RelayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());
        let router = Arc::new(EventRouter::new(
            registry.clone(),
            metrics.clone(),
            relay_config.typing_ttl,
        ));
        Self {
            registry,
            router,
            metrics,
            relay_config: Arc::new(relay_config),
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Result<Router> {
    let cors = match cors_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {}", origin))?,
            )
            .allow_methods([Method::GET, Method::POST]),
        None => CorsLayer::permissive(),
    };

    Ok(Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/health/live", get(health_live_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors)
        .with_state(state))
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| {
        handle_connection(
            socket,
            state.router.clone(),
            state.metrics.clone(),
            (*state.relay_config).clone(),
            state.shutdown.clone(),
        )
    })
}

/// Health check endpoint - returns relay status
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.snapshot();
    Json(HealthStatus {
        status: "healthy".to_string(),
        connections: metrics.connections.active,
        rooms: state.registry.room_count() as u64,
        uptime_secs: metrics.uptime_secs,
    })
}

/// Metrics endpoint - returns detailed relay metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Liveness probe - returns 200 if the server is running
async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// A bound, not yet running relay.
pub struct RelayServer {
    listener: TcpListener,
    state: AppState,
    cors_origin: Option<String>,
}

impl RelayServer {
    pub async fn bind(server: &ServerConfig, relay: RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(server.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", server.bind_addr))?;
        Ok(Self {
            listener,
            state: AppState::new(relay),
            cors_origin: server.cors_origin.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `signal` resolves, then close every connection.
    pub async fn run(self, signal: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let state = self.state;
        let app = build_router(state.clone(), self.cors_origin.as_deref())?;

        let sweeper = state.router.spawn_typing_sweeper(
            state.relay_config.typing_sweep_interval,
            state.shutdown.clone(),
        );

        let shutdown = state.shutdown.clone();
        let server_result = axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                info!("Received shutdown signal, closing connections...");
                shutdown.cancel();
            })
            .await
            .context("Server error");

        state.shutdown.cancel();
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                warn!("Typing sweeper did not stop cleanly: {}", e);
            }
        }
        state.registry.shutdown();

        info!("Shutdown complete");
        server_result
    }
}
