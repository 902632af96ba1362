//! Download orchestration against a remote engine
//!
//! - `manager`: session registry and the public orchestrator API
//! - `poll_task`: per-session status loop
//! - `media`: picks the playable file of a finished download

mod manager;
mod media;
mod poll_task;

pub use manager::DownloadOrchestrator;
pub use media::select_media_file;

use crate::error::EngineError;
use crate::rpc::RpcClient;
use parking_lot::RwLock;
use std::sync::Arc;
use swarmcast_types::{DownloadSession, OrchestratorConfig, SessionState};
use tracing::{debug, warn};

/// Configuration together with the client built from it. Swapped as a
/// whole so a tick never sees a client from one config and settings from
/// another.
pub(crate) struct EngineHandle {
    pub(crate) config: OrchestratorConfig,
    pub(crate) client: RpcClient,
}

impl EngineHandle {
    pub(crate) fn new(config: OrchestratorConfig) -> Result<Self, EngineError> {
        if config.poll_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        let client = RpcClient::new(&config.engine)?;
        Ok(Self { config, client })
    }
}

pub(crate) type SharedEngine = Arc<RwLock<Arc<EngineHandle>>>;

/// Move `session` to `next` if the lifecycle allows it
pub(crate) fn transition(session: &mut DownloadSession, next: SessionState) -> bool {
    if session.state.can_transition_to(next) {
        debug!(gid = %session.gid, from = ?session.state, to = ?next, "Session state change");
        session.state = next;
        true
    } else {
        warn!(gid = %session.gid, from = ?session.state, to = ?next, "Ignoring invalid state change");
        false
    }
}
