//! `RinkcastServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, instrument};

use rinkcast_pipeline::PipelineStats;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::hub::BroadcastHub;
use crate::session::run_ws_session;
use crate::shutdown::ShutdownCoordinator;

/// Generates UUIDv7 request IDs.
#[derive(Clone)]
struct UuidV7RequestId;

impl MakeRequestId for UuidV7RequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::now_v7().to_string();
        axum::http::HeaderValue::from_str(&id)
            .ok()
            .map(RequestId::new)
    }
}

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub for frame fan-out.
    pub hub: Arc<BroadcastHub>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Server configuration.
    pub config: ServerConfig,
    /// Live pipeline counters.
    pub stats: Arc<PipelineStats>,
    /// Prometheus metrics handle for rendering.
    pub metrics_handle: Arc<PrometheusHandle>,
}

/// The broadcast server.
pub struct RinkcastServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    shutdown: Arc<ShutdownCoordinator>,
    stats: Arc<PipelineStats>,
    metrics_handle: Arc<PrometheusHandle>,
    start_time: Instant,
}

impl RinkcastServer {
    /// Create a new server.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        stats: Arc<PipelineStats>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            hub: Arc::new(BroadcastHub::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            stats,
            metrics_handle: Arc::new(metrics_handle),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes and middleware.
    #[must_use]
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            config: self.config.clone(),
            stats: self.stats.clone(),
            metrics_handle: self.metrics_handle.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_upgrade_handler))
            .with_state(state)
            // Outermost layers execute first on request, last on response.
            .layer(CatchPanicLayer::new())
            .layer(CompressionLayer::new())
            .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(30),
            ))
            .layer(SetRequestIdLayer::x_request_id(UuidV7RequestId))
            .layer(PropagateRequestIdLayer::x_request_id())
    }

    /// Bind to a TCP port and start serving. Returns the bound address and
    /// a join handle for the server task.
    #[instrument(skip_all, fields(host = %self.config.host, port = self.config.port))]
    pub async fn listen(
        &self,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "broadcast server started");

        let router = self.router();
        let shutdown_token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_token.cancelled().await;
                    info!("server shutdown initiated");
                })
                .await;
            info!("server shutdown complete");
        });

        Ok((bound_addr, handle))
    }

    /// Get the broadcast hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.hub.connection_count().await;
    let resp = health::health_check(state.start_time, connections, state.stats.snapshot());
    Json(resp)
}

/// GET /metrics — Prometheus text format.
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// GET /ws — WebSocket upgrade handler.
async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    // Enforce max_connections
    let current = state.hub.connection_count().await;
    if current >= state.config.max_connections {
        tracing::warn!(
            current,
            max = state.config.max_connections,
            "connection limit reached, rejecting WebSocket upgrade"
        );
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let subscriber_id = rinkcast_core::SubscriberId::new();
    let hub = state.hub;
    let config = state.config;
    let max_message_size = config.max_message_size;

    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, subscriber_id, hub, config)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
