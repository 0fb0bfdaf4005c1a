//! Peer Cache Server
//!
//! Serves `GET <base-path><group>/<key>` to other nodes, plus health,
//! per-group stats and Prometheus metrics for operators.

use crate::domain::ports::FetchResponse;
use crate::error::{Error, ErrorClass, Result};
use crate::group::{GroupRegistry, GroupStatsSnapshot};
use crate::transport::codec;
use crate::transport::pool::DEFAULT_BASE_PATH;
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the cache server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
    /// Path prefix for peer requests, must match the pool's
    pub base_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8001)),
            base_path: DEFAULT_BASE_PATH.to_string(),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

/// Per-group stats response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatsResponse {
    pub group: String,
    pub cache_entries: usize,
    pub cache_bytes: u64,
    pub stats: GroupStatsSnapshot,
}

fn error_response(status: StatusCode, error: &str, message: String) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: error.into(),
            message,
        }),
    )
        .into_response()
}

// =============================================================================
// Router
// =============================================================================

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: Arc<GroupRegistry>,
}

/// Build the peer-facing router
pub fn build_router(registry: Arc<GroupRegistry>, base_path: &str) -> Router {
    let state = AppState { registry };

    Router::new()
        .route(&format!("{}:group/:key", base_path), get(serve_peer_get))
        .route("/stats/:group", get(group_stats))
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Answer a peer fetch from this node's group
async fn serve_peer_get(
    State(state): State<AppState>,
    Path((group_name, key)): Path<(String, String)>,
) -> Response {
    debug!(group = %group_name, key = %key, "Peer request");

    let Some(group) = state.registry.get_group(&group_name) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            Error::GroupNotFound { name: group_name }.to_string(),
        );
    };
    group.record_server_request();

    let view = match group.get(&key).await {
        Ok(view) => view,
        Err(e) if e.class() == ErrorClass::Validation => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", e.to_string());
        }
        Err(e) => {
            error!(group = %group_name, key = %key, error = %e, "Peer request failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "load_failed",
                e.to_string(),
            );
        }
    };

    let response = FetchResponse {
        value: view.byte_slice().into(),
    };
    match codec::encode_response(&response) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, codec::CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "encode_failed",
            e.to_string(),
        ),
    }
}

/// Stats for one group
async fn group_stats(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.get_group(&name) {
        Some(group) => (
            StatusCode::OK,
            Json(GroupStatsResponse {
                group: name,
                cache_entries: group.cache_len(),
                cache_bytes: group.cache_bytes(),
                stats: group.stats(),
            }),
        )
            .into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            Error::GroupNotFound { name }.to_string(),
        ),
    }
}

/// Prometheus text exposition of all groups
async fn metrics(State(state): State<AppState>) -> Response {
    match render_metrics(&state.registry) {
        Ok((content_type, body)) => {
            (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics_failed",
            e.to_string(),
        ),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

fn render_metrics(registry: &GroupRegistry) -> Result<(String, Vec<u8>)> {
    use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, TextEncoder};

    let metrics_err = |e: prometheus::Error| Error::Internal(format!("metrics: {}", e));

    let events = IntCounterVec::new(
        Opts::new("peercache_group_events_total", "Group pipeline events"),
        &["group", "event"],
    )
    .map_err(metrics_err)?;
    let entries = IntGaugeVec::new(
        Opts::new("peercache_cache_entries", "Entries held in the group cache"),
        &["group"],
    )
    .map_err(metrics_err)?;
    let bytes = IntGaugeVec::new(
        Opts::new("peercache_cache_bytes", "Bytes held in the group cache"),
        &["group"],
    )
    .map_err(metrics_err)?;

    let metrics = prometheus::Registry::new();
    metrics.register(Box::new(events.clone())).map_err(metrics_err)?;
    metrics.register(Box::new(entries.clone())).map_err(metrics_err)?;
    metrics.register(Box::new(bytes.clone())).map_err(metrics_err)?;

    for name in registry.names() {
        let Some(group) = registry.get_group(&name) else {
            continue;
        };
        for (event, value) in group.stats().counters() {
            events.with_label_values(&[name.as_str(), event]).inc_by(value);
        }
        entries
            .with_label_values(&[name.as_str()])
            .set(group.cache_len() as i64);
        bytes
            .with_label_values(&[name.as_str()])
            .set(group.cache_bytes() as i64);
    }

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&metrics.gather(), &mut buffer)
        .map_err(metrics_err)?;

    Ok((encoder.format_type().to_string(), buffer))
}

// =============================================================================
// Cache Server
// =============================================================================

/// HTTP server exposing this node's groups to its peers
pub struct CacheServer {
    config: ServerConfig,
    registry: Arc<GroupRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl CacheServer {
    /// Create a new cache server
    pub fn new(config: ServerConfig, registry: Arc<GroupRegistry>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            shutdown_tx,
        }
    }

    /// Router serving this node's groups
    pub fn router(&self) -> Router {
        build_router(self.registry.clone(), &self.config.base_path)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind cache server: {}", e)))?;

        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Internal(format!("Failed to read local address: {}", e)))?;
        info!("Cache server listening on {}{}", addr, self.config.base_path);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Cache server shutting down");
            })
            .await
            .map_err(|e| Error::Internal(format!("Cache server error: {}", e)))?;

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{FetchRequest, GetterFn, GetterRef, PeerGetter, PeerPicker};
    use crate::transport::client::HttpGetter;
    use crate::transport::pool::{HttpPool, PoolConfig};
    use assert_matches::assert_matches;

    fn scores_getter(node: &'static str) -> GetterRef {
        Arc::new(GetterFn::new(move |key: String| async move {
            match key.as_str() {
                "Tom" => Ok("630".as_bytes().to_vec()),
                "Jack" => Ok("589".as_bytes().to_vec()),
                "missing" => Err(anyhow::anyhow!("{} not exist", key)),
                _ => Ok(format!("{}:{}", node, key).into_bytes()),
            }
        }))
    }

    /// Bind an ephemeral port and serve `registry` on it
    async fn spawn_server(registry: Arc<GroupRegistry>) -> (String, Arc<CacheServer>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = Arc::new(CacheServer::new(ServerConfig::default(), registry));

        let handle = server.clone();
        tokio::spawn(async move { handle.serve(listener).await });

        (url, server)
    }

    fn getter_for(url: &str) -> HttpGetter {
        HttpGetter::new(format!("{}{}", url, DEFAULT_BASE_PATH), reqwest::Client::new())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8001);
        assert_eq!(config.base_path, "/_peercache/");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serves_group_value() {
        let registry = GroupRegistry::new();
        let group = registry.new_group("scores", 2 << 10, scores_getter("a")).unwrap();
        let (url, server) = spawn_server(registry).await;

        let getter = getter_for(&url);
        let response = getter.get(&FetchRequest::new("scores", "Tom")).await.unwrap();
        assert_eq!(&response.value[..], b"630");

        // Served values populate the owner's cache
        assert_eq!(group.cache_len(), 1);
        assert_eq!(group.stats().server_requests, 1);

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_escaped_key_round_trips() {
        let registry = GroupRegistry::new();
        registry.new_group("scores", 0, scores_getter("a")).unwrap();
        let (url, server) = spawn_server(registry).await;

        let getter = getter_for(&url);
        let response = getter
            .get(&FetchRequest::new("scores", "a b/c?d"))
            .await
            .unwrap();
        assert_eq!(&response.value[..], b"a:a b/c?d");

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_group_is_not_found() {
        let (url, server) = spawn_server(GroupRegistry::new()).await;

        let result = getter_for(&url)
            .get(&FetchRequest::new("nope", "Tom"))
            .await;
        assert_matches!(result, Err(Error::PeerStatus { status: 404, .. }));

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_failure_is_server_error() {
        let registry = GroupRegistry::new();
        registry.new_group("scores", 0, scores_getter("a")).unwrap();
        let (url, server) = spawn_server(registry).await;

        let result = getter_for(&url)
            .get(&FetchRequest::new("scores", "missing"))
            .await;
        assert_matches!(result, Err(Error::PeerStatus { status: 500, .. }));

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stats_and_metrics_endpoints() {
        let registry = GroupRegistry::new();
        let group = registry.new_group("scores", 0, scores_getter("a")).unwrap();
        group.get("Tom").await.unwrap();
        group.get("Tom").await.unwrap();
        let (url, server) = spawn_server(registry).await;

        let client = reqwest::Client::new();
        let body = client
            .get(format!("{}/stats/scores", url))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["group"], "scores");
        assert_eq!(stats["cacheEntries"], 1);
        assert_eq!(stats["stats"]["gets"], 2);
        assert_eq!(stats["stats"]["cacheHits"], 1);

        let missing = client
            .get(format!("{}/stats/nope", url))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        let text = client
            .get(format!("{}/metrics", url))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("peercache_group_events_total{event=\"gets\",group=\"scores\"} 2"));
        assert!(text.contains("peercache_cache_entries{group=\"scores\"} 1"));

        let health = client.get(format!("{}/health", url)).send().await.unwrap();
        assert!(health.status().is_success());

        server.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_nodes_route_by_owner() {
        let listener_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url_a = format!("http://{}", listener_a.local_addr().unwrap());
        let url_b = format!("http://{}", listener_b.local_addr().unwrap());
        let peers = [url_a.clone(), url_b.clone()];

        let registry_a = GroupRegistry::new();
        let group_a = registry_a.new_group("scores", 2 << 10, scores_getter("a")).unwrap();
        let pool_a = HttpPool::new(url_a.clone(), PoolConfig::default()).unwrap();
        pool_a.set(&peers);
        group_a.register_peers(pool_a.clone()).unwrap();

        let registry_b = GroupRegistry::new();
        let group_b = registry_b.new_group("scores", 2 << 10, scores_getter("b")).unwrap();
        let pool_b = HttpPool::new(url_b.clone(), PoolConfig::default()).unwrap();
        pool_b.set(&peers);
        group_b.register_peers(pool_b.clone()).unwrap();

        let server_a = Arc::new(CacheServer::new(ServerConfig::default(), registry_a));
        let server_b = Arc::new(CacheServer::new(ServerConfig::default(), registry_b));
        let (a, b) = (server_a.clone(), server_b.clone());
        tokio::spawn(async move { a.serve(listener_a).await });
        tokio::spawn(async move { b.serve(listener_b).await });

        // A key that A's ring assigns to B
        let key = (0..1000)
            .map(|i| format!("key-{}", i))
            .find(|k| pool_a.pick_peer(k).is_some())
            .unwrap();

        let value = group_a.get(&key).await.unwrap();
        assert_eq!(value.to_string(), format!("b:{}", key));

        // The owner caches it, the requester does not
        assert_eq!(group_b.cache_len(), 1);
        assert_eq!(group_a.cache_len(), 0);
        assert_eq!(group_a.stats().peer_loads, 1);
        assert_eq!(group_b.stats().server_requests, 1);

        server_a.shutdown();
        server_b.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dead_peer_falls_back_to_local() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let self_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        // Peer address that refuses connections
        let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_url = format!("http://{}", dead.local_addr().unwrap());
        drop(dead);

        let registry = GroupRegistry::new();
        let group = registry.new_group("scores", 2 << 10, scores_getter("a")).unwrap();
        let pool = HttpPool::new(self_url, PoolConfig::default()).unwrap();
        pool.set([dead_url]);
        group.register_peers(pool).unwrap();

        let value = group.get("Sam").await.unwrap();
        assert_eq!(value.to_string(), "a:Sam");
        assert_eq!(group.stats().peer_errors, 1);
        assert_eq!(group.cache_len(), 1);
    }
}
