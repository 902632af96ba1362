//! Poll task - follows one engine download until it ends
//!
//! One task per session. Each tick sleeps for the poll interval, then asks
//! the engine for the download's status; the next tick only starts once that
//! call has resolved. Responses are applied under the session lock after
//! re-checking the cancellation token, so nothing is emitted for a session
//! once `cancel` has marked it removed.

use super::{media::select_media_file, transition, SharedEngine};
use crate::error::EngineError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use swarmcast_types::{DownloadSession, EngineStatus, SessionEvent, SessionState};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum Tick {
    Continue,
    Stop,
}

pub(crate) struct PollTask {
    gid: String,
    record: Arc<Mutex<DownloadSession>>,
    cancel: CancellationToken,
    engine: SharedEngine,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl PollTask {
    pub(crate) fn new(
        gid: String,
        record: Arc<Mutex<DownloadSession>>,
        cancel: CancellationToken,
        engine: SharedEngine,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            gid,
            record,
            cancel,
            engine,
            event_tx,
        }
    }

    pub(crate) async fn run(self) {
        debug!(gid = %self.gid, "Polling started");
        let mut failures: u32 = 0;

        loop {
            let interval = Duration::from_millis(self.engine.read().config.poll_interval_ms.max(1));
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            // Picks up configuration swaps between ticks
            let engine = self.engine.read().clone();
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = engine.client.tell_status(&self.gid) => result,
            };

            match result {
                Ok(status) => {
                    failures = 0;
                    if let Tick::Stop = self.apply(&status, &engine.config.media_extensions) {
                        break;
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(
                        gid = %self.gid,
                        error = %e,
                        transport = e.is_transport(),
                        failures,
                        "Status poll failed"
                    );
                    if !e.is_retryable() || failures > engine.config.poll_failure_limit {
                        self.stall(&e);
                        break;
                    }
                }
            }
        }

        debug!(gid = %self.gid, "Polling stopped");
    }

    fn apply(&self, status: &EngineStatus, media_extensions: &[String]) -> Tick {
        let mut session = self.record.lock();
        if self.cancel.is_cancelled() || session.state != SessionState::Active {
            debug!(gid = %self.gid, state = ?session.state, "Discarding late status");
            return Tick::Stop;
        }

        session.total_bytes = status.total_length;
        session.completed_bytes = status.completed_length;
        session.speed_bytes_per_sec = status.download_speed;
        session.num_peers = status.connections;
        session.files = status.files.clone();

        self.emit(SessionEvent::DownloadProgress {
            gid: self.gid.clone(),
            progress: session.progress(),
            download_speed: status.download_speed,
            num_peers: status.connections,
            ready: status.is_complete(),
            status: status.status.clone(),
            files: status.files.clone(),
        });

        if status.is_complete() {
            transition(&mut session, SessionState::Complete);
            match select_media_file(&status.files, media_extensions) {
                Some(file) => {
                    info!(gid = %self.gid, path = %file.path, "Download complete");
                    session.file_path = Some(file.path.clone());
                    self.emit(SessionEvent::DownloadComplete {
                        gid: self.gid.clone(),
                        file_path: file.path.clone(),
                    });
                }
                None => warn!(
                    gid = %self.gid,
                    files = status.files.len(),
                    "Download complete but no media file found"
                ),
            }
            return Tick::Stop;
        }

        if status.is_failed() {
            let error = status
                .error_message
                .clone()
                .unwrap_or_else(|| "Download failed".to_string());
            warn!(gid = %self.gid, status = %status.status, error = %error, "Download failed");
            transition(&mut session, SessionState::Error);
            session.error_message = Some(error.clone());
            self.emit(SessionEvent::DownloadError {
                gid: self.gid.clone(),
                error,
            });
            return Tick::Stop;
        }

        Tick::Continue
    }

    fn stall(&self, error: &EngineError) {
        let mut session = self.record.lock();
        if self.cancel.is_cancelled() || session.state != SessionState::Active {
            return;
        }
        if transition(&mut session, SessionState::Stalled) {
            session.error_message = Some(error.to_string());
            warn!(gid = %self.gid, "Gave up polling; session stalled");
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}
