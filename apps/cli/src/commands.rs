//! CLI command implementations

use crate::output::{format_bytes, format_eta, format_progress, format_speed, print_output};
use crate::progress::DownloadProgress;
use crate::{config, ConfigAction, EngineAction, OutputFormat};
use anyhow::{anyhow, Result};
use console::style;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use swarmcast_core::{content_id_for_path, magnet_uri, DownloadOrchestrator};
use swarmcast_types::{
    DownloadSession, EngineStatus, OrchestratorConfig, SessionEvent, SessionState, SubmitOptions,
};
use tokio::sync::broadcast::{self, error::RecvError};

// ============================================================================
// Download Commands
// ============================================================================

pub async fn add_download(
    settings: OrchestratorConfig,
    uri: &str,
    dir: Option<String>,
    options: Vec<String>,
    wait: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut submit = SubmitOptions::default();
    for option in &options {
        let (key, value) = parse_option(option)?;
        submit.engine_options.insert(key, value);
    }
    if let Some(dir) = dir {
        submit.engine_options.insert("dir".to_string(), dir);
    }

    let orchestrator = DownloadOrchestrator::new(settings)?;
    // Subscribe first so no event slips by between submit and follow
    let events = orchestrator.subscribe();
    let gid = orchestrator.submit(uri, submit).await?;

    if !wait {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&serde_json::json!({ "gid": gid }))?);
            }
            OutputFormat::Human | OutputFormat::Table => {
                println!("{} Submitted download", style("✓").green().bold());
                println!("  GID: {}", style(&gid).cyan());
            }
        }
        orchestrator.shutdown().await;
        return Ok(());
    }

    let result = follow(&orchestrator, &gid, &short_label(uri), events, format).await;
    orchestrator.shutdown().await;
    result
}

/// Follow `gid` until it ends, stalls or the user interrupts
async fn follow(
    orchestrator: &DownloadOrchestrator,
    gid: &str,
    label: &str,
    mut events: broadcast::Receiver<SessionEvent>,
    format: OutputFormat,
) -> Result<()> {
    let progress = match format {
        OutputFormat::Json => None,
        OutputFormat::Human | OutputFormat::Table => Some(DownloadProgress::new()),
    };
    if let Some(progress) = &progress {
        progress.add_download(gid, label).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let (Some(progress), true) = (&progress, event.gid() == gid) {
                        progress.handle_event(&event).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => tracing::debug!("Skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let state = orchestrator.session(gid).await.map(|s| s.state);
                if state.map_or(true, |s| s.is_terminal() || s == SessionState::Stalled) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }

    // Events emitted before the final state became visible
    while let Ok(event) = events.try_recv() {
        if let (Some(progress), true) = (&progress, event.gid() == gid) {
            progress.handle_event(&event).await;
        }
    }

    let session = orchestrator
        .session(gid)
        .await
        .ok_or_else(|| anyhow!("Session {} disappeared", gid))?;

    if interrupted {
        if let Some(progress) = &progress {
            progress.clear().await;
        }
        println!(
            "{} Stopped following {}; the engine keeps downloading",
            style("○").dim(),
            gid
        );
        return Ok(());
    }

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&session)?);
    }

    finish_session(progress.as_ref(), &session).await
}

async fn finish_session(progress: Option<&DownloadProgress>, session: &DownloadSession) -> Result<()> {
    match session.state {
        SessionState::Complete => {
            if session.file_path.is_none() {
                end_bar(
                    progress,
                    &session.gid,
                    format!(
                        "{} Complete, but no playable media file was found",
                        style("!").yellow().bold()
                    ),
                )
                .await;
            }
            Ok(())
        }
        SessionState::Error => Err(anyhow!(
            "Download failed: {}",
            session.error_message.as_deref().unwrap_or("Download failed")
        )),
        SessionState::Stalled => {
            end_bar(
                progress,
                &session.gid,
                format!("{} Lost contact with the engine", style("✗").red().bold()),
            )
            .await;
            Err(anyhow!(
                "Stopped polling {}: {}",
                session.gid,
                session.error_message.as_deref().unwrap_or("engine unreachable")
            ))
        }
        SessionState::Removed => {
            end_bar(progress, &session.gid, format!("{} Removed", style("○").dim())).await;
            Ok(())
        }
        SessionState::Pending | SessionState::Active => Ok(()),
    }
}

async fn end_bar(progress: Option<&DownloadProgress>, gid: &str, message: String) {
    if let Some(progress) = progress {
        progress.finish(gid, message).await;
    }
}

pub async fn list_downloads(settings: OrchestratorConfig, format: OutputFormat) -> Result<()> {
    let orchestrator = DownloadOrchestrator::new(settings)?;
    let active = orchestrator.active_downloads().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&active)?);
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct DownloadRow {
                gid: String,
                name: String,
                size: String,
                progress: String,
                speed: String,
                peers: u64,
            }

            let rows: Vec<DownloadRow> = active
                .iter()
                .map(|s| DownloadRow {
                    gid: s.gid.clone(),
                    name: truncate(&display_name(s), 30),
                    size: format_bytes(s.total_length),
                    progress: format_progress(s.progress()),
                    speed: format_speed(s.download_speed),
                    peers: s.connections,
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            if active.is_empty() {
                println!("{}", style("No active downloads").dim());
            } else {
                for status in &active {
                    print_status_summary(status, false);
                }
                println!();
                println!("{} active download(s)", style(active.len()).bold());
            }
        }
    }

    Ok(())
}

pub async fn show_status(settings: OrchestratorConfig, gid: &str, format: OutputFormat) -> Result<()> {
    let orchestrator = DownloadOrchestrator::new(settings)?;
    let status = orchestrator.get_status(gid).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        _ => print_status_summary(&status, true),
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct Removal {
    gid: String,
    removed: bool,
}

impl fmt::Display for Removal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Download {} removed", style("✓").green().bold(), self.gid)
    }
}

pub async fn cancel_download(settings: OrchestratorConfig, gid: &str, format: OutputFormat) -> Result<()> {
    let orchestrator = DownloadOrchestrator::new(settings)?;
    orchestrator.cancel(gid).await?;
    print_output(
        &Removal {
            gid: gid.to_string(),
            removed: true,
        },
        format,
    )
}

fn print_status_summary(status: &EngineStatus, detailed: bool) {
    let status_icon = match status.status.as_str() {
        "complete" => style("✓").green(),
        "active" => style("↓").cyan(),
        "paused" => style("⏸").yellow(),
        "error" => style("✗").red(),
        "removed" => style("○").dim(),
        _ => style("·").dim(),
    };

    println!(
        "{} {} {} [{}]",
        status_icon,
        style(display_name(status)).bold(),
        style(format_progress(status.progress())).dim(),
        style(&status.status).dim()
    );

    if detailed {
        println!("    GID: {}", status.gid);
        println!(
            "    Size: {} / {}",
            format_bytes(status.completed_length),
            format_bytes(status.total_length)
        );
        println!(
            "    Speed: {} down, {} up, {} peer(s)",
            format_speed(status.download_speed),
            format_speed(status.upload_speed),
            status.connections
        );
        println!(
            "    ETA: {}",
            format_eta(
                status.total_length.saturating_sub(status.completed_length),
                status.download_speed
            )
        );
        for file in &status.files {
            println!("    File: {}", file.path);
        }
        if let Some(ref error) = status.error_message {
            println!("    Error: {}", style(error).red());
        }
        println!();
    }
}

// ============================================================================
// Engine Commands
// ============================================================================

pub async fn engine_action(
    settings: OrchestratorConfig,
    action: EngineAction,
    format: OutputFormat,
) -> Result<()> {
    let orchestrator = DownloadOrchestrator::new(settings)?;

    match action {
        EngineAction::Version => {
            let version = orchestrator.test_connection().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&version)?),
                _ => {
                    println!("{} Connected to engine", style("✓").green().bold());
                    println!("  Version: {}", version.version);
                    println!("  Features: {}", version.enabled_features.join(", "));
                }
            }
        }
        EngineAction::Stats => {
            let stat = orchestrator.global_stat().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stat)?),
                _ => {
                    println!("Engine statistics:");
                    println!("  Download: {}", format_speed(stat.download_speed));
                    println!("  Upload: {}", format_speed(stat.upload_speed));
                    println!(
                        "  Active: {}  Waiting: {}  Stopped: {}",
                        stat.num_active, stat.num_waiting, stat.num_stopped
                    );
                }
            }
        }
    }

    Ok(())
}

// ============================================================================
// Magnet Links
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MagnetLink {
    content_id: String,
    magnet_uri: String,
}

impl fmt::Display for MagnetLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.magnet_uri)
    }
}

pub fn build_magnet(
    path: &Path,
    name: Option<String>,
    web_seed: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow!("Path is not valid UTF-8: {}", path.display()))?;
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot derive a name from {}; pass --name", path.display()))?,
    };

    let link = MagnetLink {
        content_id: content_id_for_path(path_str),
        magnet_uri: magnet_uri(path_str, &name, web_seed.as_deref()),
    };
    print_output(&link, format)
}

// ============================================================================
// Config Commands
// ============================================================================

pub fn config_action(path: &Path, action: Option<ConfigAction>, format: OutputFormat) -> Result<()> {
    match action {
        None | Some(ConfigAction::Show) => {
            let settings = config::load(path)?;

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&settings)?);
                }
                _ => {
                    println!("Swarmcast Configuration ({}):", path.display());
                    println!();
                    for key in config::KEYS {
                        let mut value = config::get_key(&settings, key)?;
                        if *key == "secret" && !value.is_empty() {
                            value = "********".to_string();
                        }
                        println!("  {}: {}", key, value);
                    }
                }
            }
        }

        Some(ConfigAction::Get { key }) => {
            let settings = config::load(path)?;
            println!("{}", config::get_key(&settings, &key)?);
        }

        Some(ConfigAction::Set { key, value }) => {
            let mut settings = config::load(path)?;
            config::set_key(&mut settings, &key, &value)?;
            // Refuse to write a config the orchestrator would reject
            let _validated = DownloadOrchestrator::new(settings.clone())?;
            config::save(path, &settings)?;
            println!("{} Config updated", style("✓").green().bold());
        }

        Some(ConfigAction::Path) => {
            println!("{}", path.display());
        }

        Some(ConfigAction::Reset) => {
            use dialoguer::Confirm;

            let confirmed = Confirm::new()
                .with_prompt("Reset all settings to defaults?")
                .default(false)
                .interact()?;

            if confirmed {
                config::save(path, &OrchestratorConfig::default())?;
                println!("{} Settings reset to defaults", style("✓").green().bold());
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_option(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(anyhow!("Invalid option '{}', expected KEY=VALUE", raw)),
    }
}

/// First file name of a download, or its GID while the engine has no files
fn display_name(status: &EngineStatus) -> String {
    status
        .files
        .first()
        .and_then(|f| Path::new(&f.path).file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| status.gid.clone())
}

/// Short label for a URI: the magnet display name when present
fn short_label(uri: &str) -> String {
    let name = uri
        .strip_prefix("magnet:?")
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("dn="))
        })
        .map(|dn| dn.replace('+', " "))
        .unwrap_or_else(|| uri.rsplit('/').next().unwrap_or(uri).to_string());
    truncate(&name, 30)
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
