//! Swarmcast Core - peer tracking and remote download orchestration
//!
//! This crate provides the two halves of Swarmcast:
//! - `tracker`: an in-memory swarm registry with periodic stale-peer sweeps
//! - `orchestrator`: submits URIs to a JSON-RPC download engine and follows
//!   each download until it completes, fails or is cancelled

mod error;
pub mod magnet;
pub mod orchestrator;
pub mod rpc;
pub mod tracker;

#[cfg(test)]
mod test_support;

pub use error::*;
pub use magnet::{content_id_for_path, magnet_uri};
pub use orchestrator::{select_media_file, DownloadOrchestrator};
pub use rpc::RpcClient;
pub use tracker::{Peer, PeerTracker};

pub use swarmcast_types as types;
