//! Tracker HTTP Server
//!
//! Plain HTTP + JSON surface over the swarm registry:
//! - `GET /announce` registers the caller and returns the rest of the swarm
//! - `GET /scrape` reports swarm sizes
//! - `GET /tracker/stats` reports registry totals
//!
//! There is no authentication. Run it on a trusted network only.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use swarmcast_core::{PeerTracker, TrackerError};
use swarmcast_types::PeerInfo;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

// ============================================================================
// Request/Response types
// ============================================================================

/// Announce query. Everything is optional here so missing fields can be
/// reported as a JSON 400 instead of a bare extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct AnnounceQuery {
    pub info_hash: Option<String>,
    pub peer_id: Option<String>,
    pub port: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceResponse {
    /// Seconds the client should wait before re-announcing
    pub interval: u32,
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeQuery {
    pub info_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeFile {
    pub complete: usize,
    pub incomplete: usize,
    /// Mirrors `complete`
    pub downloaded: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub files: BTreeMap<String, ScrapeFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub torrents: usize,
    pub total_peers: usize,
    pub message: String,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct ApiErrorBody {
    code: u16,
    error: String,
}

/// Error returned by a handler, rendered as `{code, error}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        match e {
            TrackerError::Validation(message) => Self::bad_request(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            code: self.status.as_u16(),
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Tracker Server
// ============================================================================

pub struct TrackerServer {
    tracker: Arc<PeerTracker>,
    addr: SocketAddr,
}

impl TrackerServer {
    pub fn new(tracker: Arc<PeerTracker>, addr: SocketAddr) -> Self {
        Self { tracker, addr }
    }

    /// Serve until `shutdown` is cancelled, then drain open connections
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let app = router(self.tracker);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Tracker listening on http://{}", listener.local_addr()?);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!("Tracker server stopped");
        Ok(())
    }
}

pub fn router(tracker: Arc<PeerTracker>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/announce", get(handle_announce))
        .route("/scrape", get(handle_scrape))
        .route("/tracker/stats", get(handle_stats))
        .layer(cors)
        .with_state(tracker)
}

// ============================================================================
// HTTP Handlers
// ============================================================================

type SharedTracker = Arc<PeerTracker>;

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing required parameter: {}", name)))
}

async fn handle_announce(
    State(tracker): State<SharedTracker>,
    remote: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<AnnounceQuery>,
) -> Result<Json<AnnounceResponse>, ApiError> {
    let info_hash = required(query.info_hash, "info_hash")?;
    let peer_id = required(query.peer_id, "peer_id")?;
    let port = required(query.port, "port")?;
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid port: {}", port)))?;

    let ip = query
        .ip
        .filter(|ip| !ip.is_empty())
        .or_else(|| remote.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    let peers = tracker.announce(&info_hash, &peer_id, &ip, port)?;

    Ok(Json(AnnounceResponse {
        interval: tracker.config().announce_interval_secs,
        peers: peers.iter().map(|p| p.info()).collect(),
    }))
}

async fn handle_scrape(
    State(tracker): State<SharedTracker>,
    Query(query): Query<ScrapeQuery>,
) -> Json<ScrapeResponse> {
    let hashes = query.info_hash.filter(|h| !h.is_empty()).map(|h| vec![h]);
    let report = tracker.scrape(hashes.as_deref());

    let files = report
        .into_iter()
        .map(|(hash, stat)| {
            (
                hash,
                ScrapeFile {
                    complete: stat.complete,
                    incomplete: stat.incomplete,
                    downloaded: stat.complete,
                },
            )
        })
        .collect();

    Json(ScrapeResponse { files })
}

async fn handle_stats(State(tracker): State<SharedTracker>) -> Json<StatsResponse> {
    let stats = tracker.stats();
    Json(StatsResponse {
        torrents: stats.swarm_count,
        total_peers: stats.total_peer_count,
        message: "Private P2P Tracker - Local Network Only".to_string(),
    })
}
