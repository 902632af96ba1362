//! Shared types for Swarmcast
//!
//! This crate contains the data structures shared by the core library,
//! the tracker server and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// Tracker Types
// ============================================================================

/// Wire view of a peer as returned by `/announce`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub ip: String,
    pub port: u16,
    pub peer_id: String,
}

/// Swarm size as reported by a scrape.
///
/// Every peer counts as a full seeder, so `incomplete` is always 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmScrape {
    pub complete: usize,
    pub incomplete: usize,
}

/// Scrape results keyed by content hash
pub type ScrapeReport = BTreeMap<String, SwarmScrape>;

/// Aggregate registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub swarm_count: usize,
    pub total_peer_count: usize,
}

/// Tracker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Re-announce interval handed to peers, in seconds
    pub announce_interval_secs: u32,
    /// How often stale peers are swept
    pub sweep_interval: Duration,
    /// A peer older than this is considered gone
    pub peer_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            announce_interval_secs: 60,
            sweep_interval: Duration::from_secs(5 * 60),
            peer_ttl: Duration::from_secs(10 * 60),
        }
    }
}

// ============================================================================
// Engine Types
// ============================================================================

/// One file of an engine download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineFile {
    pub path: String,
    pub length: u64,
    pub completed_length: u64,
    pub selected: bool,
}

/// Normalized result of `tellStatus`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub gid: String,
    /// Raw engine state: active, waiting, paused, error, complete, removed
    pub status: String,
    pub total_length: u64,
    pub completed_length: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub connections: u64,
    pub files: Vec<EngineFile>,
    pub error_message: Option<String>,
}

impl EngineStatus {
    /// Fraction downloaded in [0, 1]; 0 when the total is unknown
    pub fn progress(&self) -> f64 {
        progress_ratio(self.completed_length, self.total_length)
    }

    pub fn is_complete(&self) -> bool {
        self.status == "complete"
    }

    /// Engine states that end a download unsuccessfully
    pub fn is_failed(&self) -> bool {
        self.status == "error" || self.status == "removed"
    }
}

/// Result of `getVersion`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineVersion {
    pub version: String,
    pub enabled_features: Vec<String>,
}

/// Result of `getGlobalStat`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStat {
    pub download_speed: u64,
    pub upload_speed: u64,
    pub num_active: u64,
    pub num_waiting: u64,
    pub num_stopped: u64,
}

/// Computes `completed / total`, clamped to [0, 1] and 0 for an unknown total
pub fn progress_ratio(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed.min(total) as f64 / total as f64).clamp(0.0, 1.0)
}

// ============================================================================
// Session Types
// ============================================================================

/// Lifecycle of a download session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Pending,
    Active,
    /// Polling gave up after repeated RPC failures; the engine may still be working
    Stalled,
    Complete,
    Error,
    Removed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Removed)
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Pending, Active)
                | (Pending, Removed)
                | (Active, Complete)
                | (Active, Error)
                | (Active, Stalled)
                | (Active, Removed)
                | (Stalled, Removed)
        )
    }
}

/// A download submitted to the engine and tracked by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSession {
    pub gid: String,
    pub resource_uri: String,
    pub state: SessionState,
    pub total_bytes: u64,
    pub completed_bytes: u64,
    pub speed_bytes_per_sec: u64,
    pub num_peers: u64,
    pub files: Vec<EngineFile>,
    pub error_message: Option<String>,
    /// Media file chosen for hand-off once the download completed
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DownloadSession {
    pub fn new(gid: String, resource_uri: String) -> Self {
        Self {
            gid,
            resource_uri,
            state: SessionState::Pending,
            total_bytes: 0,
            completed_bytes: 0,
            speed_bytes_per_sec: 0,
            num_peers: 0,
            files: Vec::new(),
            error_message: None,
            file_path: None,
            created_at: Utc::now(),
        }
    }

    pub fn progress(&self) -> f64 {
        progress_ratio(self.completed_bytes, self.total_bytes)
    }
}

/// Options passed along with `addUri`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Engine options, e.g. `{"dir": "/downloads"}`
    #[serde(default)]
    pub engine_options: BTreeMap<String, String>,
}

// ============================================================================
// Configuration
// ============================================================================

/// Where and how to reach the download engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub endpoint: String,
    pub secret: Option<String>,
    /// Namespace of the RPC methods, e.g. `aria2` for `aria2.addUri`
    pub method_prefix: String,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6800/jsonrpc".to_string(),
            secret: None,
            method_prefix: "aria2".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Orchestrator settings, swappable at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub engine: EngineConfig,
    /// Forwarded to the engine as the `dir` option when set
    pub download_dir: Option<String>,
    pub poll_interval_ms: u64,
    /// Consecutive failed polls tolerated before a session is marked stalled
    pub poll_failure_limit: u32,
    /// Suffixes that identify a playable media file, matched case-insensitively
    pub media_extensions: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            download_dir: None,
            poll_interval_ms: 1000,
            poll_failure_limit: 0,
            media_extensions: default_media_extensions(),
        }
    }
}

pub fn default_media_extensions() -> Vec<String> {
    [".mp4", ".mkv", ".avi", ".mov", ".wmv", ".flv", ".webm"]
        .into_iter()
        .map(String::from)
        .collect()
}

// ============================================================================
// Event Types
// ============================================================================

/// Notifications emitted by the orchestrator to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    DownloadProgress {
        gid: String,
        progress: f64,
        download_speed: u64,
        num_peers: u64,
        ready: bool,
        status: String,
        files: Vec<EngineFile>,
    },
    #[serde(rename_all = "camelCase")]
    DownloadComplete { gid: String, file_path: String },
    DownloadError { gid: String, error: String },
}

impl SessionEvent {
    /// Channel name used by the UI layer
    pub fn name(&self) -> &'static str {
        match self {
            Self::DownloadProgress { .. } => "download-progress",
            Self::DownloadComplete { .. } => "download-complete",
            Self::DownloadError { .. } => "download-error",
        }
    }

    pub fn gid(&self) -> &str {
        match self {
            Self::DownloadProgress { gid, .. }
            | Self::DownloadComplete { gid, .. }
            | Self::DownloadError { gid, .. } => gid,
        }
    }

    /// Completion and error notifications end a session
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::DownloadProgress { .. })
    }
}
