//! Download Orchestrator - tracks downloads running on the remote engine
//!
//! This is the top-level coordinator that:
//! - Submits URIs to the engine and registers a session per GID
//! - Owns one poll task per session and the cancellation of it
//! - Holds the swappable engine configuration

use super::poll_task::PollTask;
use super::{transition, EngineHandle, SharedEngine};
use crate::error::EngineError;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use swarmcast_types::{
    DownloadSession, EngineStatus, EngineVersion, GlobalStat, OrchestratorConfig, SessionEvent,
    SessionState, SubmitOptions,
};
use tokio::sync::{broadcast, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handle to a tracked session
struct SessionHandle {
    record: Arc<Mutex<DownloadSession>>,
    cancel: CancellationToken,
    /// Taken on shutdown
    task: Option<JoinHandle<()>>,
}

/// Orchestrator shared by the UI layer. Cloning is cheap and every clone
/// sees the same sessions.
#[derive(Clone)]
pub struct DownloadOrchestrator {
    engine: SharedEngine,
    sessions: Arc<AsyncRwLock<HashMap<String, SessionHandle>>>,
    event_tx: broadcast::Sender<SessionEvent>,
    /// Parent of every session token
    shutdown: CancellationToken,
}

impl DownloadOrchestrator {
    /// Create an orchestrator; fails when the configuration is unusable
    pub fn new(config: OrchestratorConfig) -> Result<Self, EngineError> {
        let handle = EngineHandle::new(config)?;
        let (event_tx, _) = broadcast::channel(1024);

        Ok(Self {
            engine: Arc::new(RwLock::new(Arc::new(handle))),
            sessions: Arc::new(AsyncRwLock::new(HashMap::new())),
            event_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn engine(&self) -> Arc<EngineHandle> {
        self.engine.read().clone()
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Hand `resource_uri` to the engine and start following it.
    /// Nothing is registered when the engine refuses the URI or the
    /// orchestrator has been shut down.
    pub async fn submit(&self, resource_uri: &str, options: SubmitOptions) -> Result<String, EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShutDown);
        }
        let engine = self.engine();

        let mut engine_options = options.engine_options;
        if let Some(dir) = &engine.config.download_dir {
            engine_options
                .entry("dir".to_string())
                .or_insert_with(|| dir.clone());
        }

        info!("Submitting download: {}", resource_uri);
        let gid = engine.client.add_uri(resource_uri, &engine_options).await?;

        let mut sessions = self.sessions.write().await;
        if self.shutdown.is_cancelled() {
            drop(sessions);
            warn!(gid = %gid, "Shut down while submitting; removing download from engine");
            if let Err(e) = engine.client.remove(&gid).await {
                debug!(gid = %gid, error = %e, "Engine remove after shutdown failed");
            }
            return Err(EngineError::ShutDown);
        }

        let mut session = DownloadSession::new(gid.clone(), resource_uri.to_string());
        transition(&mut session, SessionState::Active);
        let record = Arc::new(Mutex::new(session));
        let cancel = self.shutdown.child_token();

        let task = PollTask::new(
            gid.clone(),
            Arc::clone(&record),
            cancel.clone(),
            Arc::clone(&self.engine),
            self.event_tx.clone(),
        );
        let task = tokio::spawn(task.run());

        let previous = sessions.insert(
            gid.clone(),
            SessionHandle {
                record,
                cancel,
                task: Some(task),
            },
        );
        drop(sessions);
        if let Some(previous) = previous {
            warn!(gid = %gid, "Engine reused a GID; dropping the older session");
            previous.cancel.cancel();
        }

        info!(gid = %gid, "Download submitted");
        Ok(gid)
    }

    /// Stop following `gid` and ask the engine to remove it.
    ///
    /// A live session is marked removed before the engine is called, so a
    /// status response already in flight is thrown away. Cancelling a
    /// finished session never fails and emits nothing.
    pub async fn cancel(&self, gid: &str) -> Result<(), EngineError> {
        let tracked = {
            let sessions = self.sessions.read().await;
            sessions
                .get(gid)
                .map(|handle| (Arc::clone(&handle.record), handle.cancel.clone()))
        };
        let engine = self.engine();

        let Some((record, cancel)) = tracked else {
            info!(gid, "Removing untracked download");
            engine.client.remove(gid).await?;
            return Ok(());
        };

        let was_live = {
            let mut session = record.lock();
            if session.state.is_terminal() {
                false
            } else {
                transition(&mut session, SessionState::Removed);
                cancel.cancel();
                true
            }
        };

        if was_live {
            info!(gid, "Cancelling download");
            engine.client.remove(gid).await?;
        } else if let Err(e) = engine.client.remove(gid).await {
            debug!(gid, error = %e, "Engine remove for finished session failed");
        }
        Ok(())
    }

    /// Ask the engine for the current status of `gid`. Session state is not
    /// touched.
    pub async fn get_status(&self, gid: &str) -> Result<EngineStatus, EngineError> {
        self.engine().client.tell_status(gid).await
    }

    pub async fn session(&self, gid: &str) -> Option<DownloadSession> {
        let sessions = self.sessions.read().await;
        sessions.get(gid).map(|handle| handle.record.lock().clone())
    }

    /// Snapshot of every session, oldest first
    pub async fn sessions(&self) -> Vec<DownloadSession> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<DownloadSession> = sessions
            .values()
            .map(|handle| handle.record.lock().clone())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Drop a finished session from the registry and return its last
    /// snapshot. Live sessions stay tracked; cancel them first.
    pub async fn forget(&self, gid: &str) -> Option<DownloadSession> {
        let mut sessions = self.sessions.write().await;
        let snapshot = sessions.get(gid)?.record.lock().clone();
        if !snapshot.state.is_terminal() {
            return None;
        }
        sessions.remove(gid);
        debug!(gid, "Session forgotten");
        Some(snapshot)
    }

    /// Drop every finished session; returns how many went
    pub async fn forget_finished(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.record.lock().state.is_terminal());
        before - sessions.len()
    }

    /// Sessions still being polled
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|handle| handle.record.lock().state == SessionState::Active)
            .count()
    }

    /// Stop every poll task and wait for them to exit. No events are emitted
    /// and session states are left as they were.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = {
            let mut sessions = self.sessions.write().await;
            sessions
                .values_mut()
                .filter_map(|handle| handle.task.take())
                .collect()
        };

        info!("Stopping {} poll task(s)", tasks.len());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Poll task ended abnormally: {}", e);
            }
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn config(&self) -> OrchestratorConfig {
        self.engine.read().config.clone()
    }

    /// Replace the configuration. Running sessions use the new endpoint and
    /// secret from their next tick on.
    pub fn update_config(&self, config: OrchestratorConfig) -> Result<(), EngineError> {
        let handle = EngineHandle::new(config)?;
        info!(endpoint = %handle.client.endpoint(), "Engine configuration updated");
        *self.engine.write() = Arc::new(handle);
        Ok(())
    }

    // ========================================================================
    // Engine
    // ========================================================================

    pub async fn engine_version(&self) -> Result<EngineVersion, EngineError> {
        self.engine().client.get_version().await
    }

    /// Downloads the engine reports as active, tracked or not
    pub async fn active_downloads(&self) -> Result<Vec<EngineStatus>, EngineError> {
        self.engine().client.tell_active().await
    }

    pub async fn global_stat(&self) -> Result<GlobalStat, EngineError> {
        self.engine().client.get_global_stat().await
    }

    /// Check that the engine answers and log what it supports
    pub async fn test_connection(&self) -> Result<EngineVersion, EngineError> {
        let engine = self.engine();
        match engine.client.get_version().await {
            Ok(version) => {
                info!(
                    endpoint = %engine.client.endpoint(),
                    "Connected to engine {} (features: {})",
                    version.version,
                    version.enabled_features.join(", ")
                );
                Ok(version)
            }
            Err(e) => {
                warn!(endpoint = %engine.client.endpoint(), "Engine connection failed: {}", e);
                Err(e)
            }
        }
    }
}
