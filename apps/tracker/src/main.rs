//! Swarmcast Tracker - private swarm tracker
//!
//! Serves the announce/scrape endpoints and sweeps stale peers in the
//! background until interrupted.

mod server;

use anyhow::Result;
use clap::Parser;
use server::TrackerServer;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use swarmcast_core::PeerTracker;
use swarmcast_types::TrackerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Swarmcast tracker
#[derive(Parser)]
#[command(name = "swarmcast-tracker")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind
    #[arg(long, env = "SWARMCAST_TRACKER_BIND", default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "SWARMCAST_TRACKER_PORT", default_value_t = 3000)]
    port: u16,

    /// Re-announce interval handed to clients (seconds)
    #[arg(long, default_value_t = 60)]
    announce_interval: u32,

    /// How often stale peers are swept (seconds)
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    sweep_interval: u64,

    /// Peers silent for longer than this are dropped (seconds)
    #[arg(long, default_value_t = 600)]
    peer_ttl: u64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let tracker = Arc::new(PeerTracker::new(TrackerConfig {
        announce_interval_secs: args.announce_interval,
        sweep_interval: Duration::from_secs(args.sweep_interval),
        peer_ttl: Duration::from_secs(args.peer_ttl),
    }));

    let shutdown = CancellationToken::new();
    let sweeper = tracker.spawn_sweeper(shutdown.clone());

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutting down");
                signal.cancel();
            }
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let addr = SocketAddr::new(args.bind, args.port);
    let result = TrackerServer::new(Arc::clone(&tracker), addr)
        .run(shutdown.clone())
        .await;

    shutdown.cancel();
    let _ = sweeper.await;
    result
}
