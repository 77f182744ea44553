//! `SwitchboardServer`: Axum HTTP + WebSocket server over a shared registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use switchboard_core::{Dispatcher, Registry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::protocol::{ConnectParams, SessionContext};
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Fan-out over the shared registry.
    pub dispatcher: Dispatcher,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The switchboard server.
pub struct SwitchboardServer {
    config: Arc<ServerConfig>,
    dispatcher: Dispatcher,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl SwitchboardServer {
    /// Create a server over `registry`.
    pub fn new(config: ServerConfig, registry: Arc<Registry>) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(ShutdownCoordinator::new(Arc::clone(&registry))),
            dispatcher: Dispatcher::new(registry),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            config: Arc::clone(&self.config),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/stats", get(api::stats))
            .route("/api/publish", post(api::publish))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown is signalled.
    ///
    /// Returns the bound address (useful with port 0) and the server task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
            info!("server stopped accepting connections");
        });

        info!(addr = %local_addr, "switchboard server listening");
        Ok((local_addr, handle))
    }

    /// The dispatcher used for every delivery.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The shared registry.
    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }

    /// The shutdown coordinator that drains this server's connections.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }

    let ctx = SessionContext::from_params(params);
    let cancel = state.shutdown.token();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_session(socket, ctx, state.dispatcher, state.config, cancel))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.dispatcher.registry().stats();
    Json(health::health_check(state.start_time, &stats))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{Value, json};
    use std::time::Duration;
    use switchboard_core::ChannelTransport;
    use tower::ServiceExt;

    fn make_server() -> SwitchboardServer {
        SwitchboardServer::new(ServerConfig::default(), Arc::new(Registry::new()))
    }

    async fn body_json(resp: Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn publish_request(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/publish")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(server.registry().is_empty());
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let (transport, _rx) = ChannelTransport::channel(4, Duration::from_secs(1));
        server
            .registry()
            .connect("c1", Arc::new(transport), Some("u1"), Some("r1"));

        let resp = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 1);
        assert_eq!(json["users"], 1);
        assert_eq!(json["rooms"], 1);
    }

    #[tokio::test]
    async fn stats_endpoint_returns_snapshot() {
        let server = make_server();
        for (id, user, room) in [("c1", "u1", "r1"), ("c2", "u1", "r2")] {
            let (transport, _rx) = ChannelTransport::channel(4, Duration::from_secs(1));
            server
                .registry()
                .connect(id, Arc::new(transport), Some(user), Some(room));
        }

        let resp = server
            .router()
            .oneshot(Request::get("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let json = body_json(resp).await;
        assert_eq!(json["total_connections"], 2);
        assert_eq!(json["users_connected"], 1);
        assert_eq!(json["rooms_connected"], 2);
        assert_eq!(json["connections_by_user"]["u1"], 2);
    }

    #[tokio::test]
    async fn publish_delivers_to_room() {
        let server = make_server();
        let (transport, mut rx) = ChannelTransport::channel(4, Duration::from_secs(1));
        server
            .registry()
            .connect("c1", Arc::new(transport), None, Some("r1"));

        let resp = server
            .router()
            .oneshot(publish_request(&json!({
                "target": {"room": "r1"},
                "message": {"type": "system", "event": "notice", "data": {"text": "maintenance"}}
            })))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["targeted"], 1);
        assert_eq!(report["delivered"], 1);

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "system");
        assert_eq!(frame["data"]["text"], "maintenance");
        assert!(frame["timestamp"].is_string());
    }

    #[tokio::test]
    async fn publish_keeps_offsetless_timestamp_as_utc() {
        let server = make_server();
        let (transport, mut rx) = ChannelTransport::channel(4, Duration::from_secs(1));
        server.registry().connect("c1", Arc::new(transport), Some("u1"), None);

        let resp = server
            .router()
            .oneshot(publish_request(&json!({
                "target": {"connection": "c1"},
                "message": {"type": "system", "event": "notice", "timestamp": "2026-01-02T03:04:05"}
            })))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["timestamp"], "2026-01-02T03:04:05.000Z");
    }

    #[tokio::test]
    async fn publish_to_nobody_is_empty_report() {
        let resp = make_server()
            .router()
            .oneshot(publish_request(&json!({
                "target": {"user": "ghost"},
                "message": {"type": "system"}
            })))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let report = body_json(resp).await;
        assert_eq!(report["targeted"], 0);
        assert_eq!(report["failed"], json!([]));
    }

    #[tokio::test]
    async fn publish_rejects_bad_body() {
        let resp = make_server()
            .router()
            .oneshot(publish_request(&json!({"target": {"planet": "mars"}})))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "INVALID_REQUEST");
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let resp = make_server()
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_with_recorder_is_text() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let resp = make_server()
            .with_metrics(handle)
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn ws_without_upgrade_headers_is_rejected() {
        let resp = make_server()
            .router()
            .oneshot(Request::get("/ws?user_id=u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn listen_binds_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn listen_on_bad_host_is_bind_error() {
        let config = ServerConfig {
            host: "256.0.0.1".into(),
            ..ServerConfig::default()
        };
        let server = SwitchboardServer::new(config, Arc::new(Registry::new()));
        let err = server.listen().await.unwrap_err();
        assert_matches!(err, ServerError::Bind { .. });
    }
}
