//! Progress bar utilities for followed downloads

use crate::output::format_speed;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Arc;
use swarmcast_types::{EngineFile, SessionEvent};
use tokio::sync::RwLock;

/// Manages progress bars for multiple downloads
pub struct DownloadProgress {
    multi: MultiProgress,
    bars: Arc<RwLock<HashMap<String, ProgressBar>>>,
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a progress bar for a download
    pub async fn add_download(&self, gid: &str, label: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(0));

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        pb.set_style(style);
        pb.set_prefix(label.to_string());
        pb.set_message("waiting for engine");

        self.bars.write().await.insert(gid.to_string(), pb.clone());
        pb
    }

    /// Update a progress bar from an event
    pub async fn handle_event(&self, event: &SessionEvent) {
        let bars = self.bars.read().await;
        let Some(pb) = bars.get(event.gid()) else {
            return;
        };

        match event {
            SessionEvent::DownloadProgress {
                download_speed,
                num_peers,
                files,
                ..
            } => {
                let (completed, total) = byte_totals(files);
                if total > 0 {
                    pb.set_length(total);
                    pb.set_position(completed);
                }
                pb.set_message(format!(
                    "{} {} peers",
                    format_speed(*download_speed),
                    num_peers
                ));
            }

            SessionEvent::DownloadComplete { file_path, .. } => {
                pb.finish_with_message(format!(
                    "{} Ready: {}",
                    style("✓").green().bold(),
                    file_path
                ));
            }

            SessionEvent::DownloadError { error, .. } => {
                pb.abandon_with_message(format!("{} Failed: {}", style("✗").red().bold(), error));
            }
        }
    }

    /// End a bar that finished without a terminal event
    pub async fn finish(&self, gid: &str, message: String) {
        if let Some(pb) = self.bars.write().await.remove(gid) {
            if !pb.is_finished() {
                pb.abandon_with_message(message);
            }
        }
    }

    /// Clear all progress bars
    pub async fn clear(&self) {
        for pb in self.bars.write().await.drain() {
            pb.1.finish_and_clear();
        }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Completed and total bytes over the selected files, or every file when
/// the engine marks none as selected
fn byte_totals(files: &[EngineFile]) -> (u64, u64) {
    let selected: Vec<&EngineFile> = files.iter().filter(|f| f.selected).collect();
    let counted: Vec<&EngineFile> = if selected.is_empty() {
        files.iter().collect()
    } else {
        selected
    };
    counted.iter().fold((0, 0), |(done, total), f| {
        (done + f.completed_length, total + f.length)
    })
}
