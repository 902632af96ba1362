//! Peer Tracker - in-memory swarm registry
//!
//! Peers announce themselves for a content hash and get back the other
//! members of that swarm. There is a single peer class: every peer is
//! treated as a seeder, so scrapes always report `incomplete = 0`.
//!
//! The registry sits behind one mutex, which serializes every operation on a
//! swarm. Nothing here suspends. The tracker performs no authentication;
//! restricting who can reach it is up to the operator.

mod sweeper;

use crate::error::TrackerError;
use parking_lot::Mutex;
use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};
use swarmcast_types::{PeerInfo, ScrapeReport, SwarmScrape, TrackerConfig, TrackerStats};
use tracing::{debug, info, warn};

/// Shortest period the sweeper runs at
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// A peer registered in one swarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub peer_id: String,
    pub ip: String,
    pub port: u16,
    pub last_seen: Instant,
}

impl Peer {
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            ip: self.ip.clone(),
            port: self.port,
            peer_id: self.peer_id.clone(),
        }
    }
}

/// Peers of one content hash, in first-announce order
#[derive(Debug, Default)]
struct Swarm {
    peers: Vec<Peer>,
}

impl Swarm {
    fn upsert(&mut self, peer: Peer) {
        match self.peers.iter_mut().find(|p| p.peer_id == peer.peer_id) {
            Some(existing) => *existing = peer,
            None => self.peers.push(peer),
        }
    }
}

/// Swarm registry shared by the tracker endpoints and the sweeper
#[derive(Debug)]
pub struct PeerTracker {
    config: TrackerConfig,
    swarms: Mutex<HashMap<String, Swarm>>,
    /// Scheduled sweeps left to fail on purpose
    #[cfg(test)]
    failing_sweeps: AtomicUsize,
}

impl Default for PeerTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl PeerTracker {
    /// Create an empty registry. A sweep interval below
    /// [`MIN_SWEEP_INTERVAL`] is raised to it.
    pub fn new(mut config: TrackerConfig) -> Self {
        if config.sweep_interval < MIN_SWEEP_INTERVAL {
            warn!(
                "Sweep interval {:?} too short; using {:?}",
                config.sweep_interval, MIN_SWEEP_INTERVAL
            );
            config.sweep_interval = MIN_SWEEP_INTERVAL;
        }

        Self {
            config,
            swarms: Mutex::new(HashMap::new()),
            #[cfg(test)]
            failing_sweeps: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Register or refresh `peer_id` in the swarm for `content_hash` and
    /// return every other peer of that swarm.
    pub fn announce(
        &self,
        content_hash: &str,
        peer_id: &str,
        ip: &str,
        port: u16,
    ) -> Result<Vec<Peer>, TrackerError> {
        self.announce_at(content_hash, peer_id, ip, port, Instant::now())
    }

    pub(crate) fn announce_at(
        &self,
        content_hash: &str,
        peer_id: &str,
        ip: &str,
        port: u16,
        now: Instant,
    ) -> Result<Vec<Peer>, TrackerError> {
        if content_hash.is_empty() {
            return Err(TrackerError::Validation("info_hash is required".to_string()));
        }
        if peer_id.is_empty() {
            return Err(TrackerError::Validation("peer_id is required".to_string()));
        }
        if port == 0 {
            return Err(TrackerError::Validation("port must be in 1..=65535".to_string()));
        }

        let mut swarms = self.swarms.lock();
        let swarm = swarms.entry(content_hash.to_string()).or_default();
        swarm.upsert(Peer {
            peer_id: peer_id.to_string(),
            ip: ip.to_string(),
            port,
            last_seen: now,
        });

        debug!(
            swarm = %short_hash(content_hash),
            peer_id,
            peers = swarm.peers.len(),
            "Peer announced"
        );

        Ok(swarm
            .peers
            .iter()
            .filter(|p| p.peer_id != peer_id)
            .cloned()
            .collect())
    }

    /// Peer counts for the given hashes, or for every swarm when `None`.
    /// Unknown hashes are left out of the report.
    pub fn scrape(&self, content_hashes: Option<&[String]>) -> ScrapeReport {
        let swarms = self.swarms.lock();
        let entry = |swarm: &Swarm| SwarmScrape {
            complete: swarm.peers.len(),
            incomplete: 0,
        };

        match content_hashes {
            Some(hashes) => hashes
                .iter()
                .filter_map(|hash| swarms.get(hash).map(|s| (hash.clone(), entry(s))))
                .collect(),
            None => swarms
                .iter()
                .map(|(hash, swarm)| (hash.clone(), entry(swarm)))
                .collect(),
        }
    }

    /// Drop a peer; the swarm goes with it once empty. Returns whether the
    /// peer was registered.
    pub fn remove_peer(&self, content_hash: &str, peer_id: &str) -> bool {
        let mut swarms = self.swarms.lock();
        let Some(swarm) = swarms.get_mut(content_hash) else {
            return false;
        };

        let before = swarm.peers.len();
        swarm.peers.retain(|p| p.peer_id != peer_id);
        let removed = swarm.peers.len() != before;
        if removed {
            info!(swarm = %short_hash(content_hash), peer_id, "Peer removed");
        }

        if swarm.peers.is_empty() {
            swarms.remove(content_hash);
            info!(swarm = %short_hash(content_hash), "Swarm removed (no peers)");
        }
        removed
    }

    /// Remove peers not seen within the configured TTL. Returns how many
    /// peers were dropped.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.config.peer_ttl;
        let mut swarms = self.swarms.lock();
        let mut removed = 0;

        swarms.retain(|_, swarm| {
            let before = swarm.peers.len();
            swarm
                .peers
                .retain(|p| now.saturating_duration_since(p.last_seen) <= ttl);
            removed += before - swarm.peers.len();
            !swarm.peers.is_empty()
        });

        removed
    }

    pub fn stats(&self) -> TrackerStats {
        let swarms = self.swarms.lock();
        TrackerStats {
            swarm_count: swarms.len(),
            total_peer_count: swarms.values().map(|s| s.peers.len()).sum(),
        }
    }
}

/// First eight characters of a hash, for log lines
fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::assert_ok;

    const HASH: &str = "abc123def4567890abc123def4567890abc123de";

    fn ids(peers: &[Peer]) -> Vec<&str> {
        peers.iter().map(|p| p.peer_id.as_str()).collect()
    }

    #[test]
    fn first_announce_returns_nobody_then_others_are_listed() {
        let tracker = PeerTracker::default();

        let peers = assert_ok!(tracker.announce(HASH, "peerA", "10.0.0.2", 51413));
        assert!(peers.is_empty());

        let peers = assert_ok!(tracker.announce(HASH, "peerB", "10.0.0.3", 51413));
        assert_eq!(peers.len(), 1);
        assert_eq!(
            peers[0].info(),
            PeerInfo {
                ip: "10.0.0.2".to_string(),
                port: 51413,
                peer_id: "peerA".to_string(),
            }
        );
    }

    #[test]
    fn zero_sweep_interval_is_raised_to_minimum() {
        let tracker = PeerTracker::new(TrackerConfig {
            sweep_interval: Duration::ZERO,
            ..TrackerConfig::default()
        });
        assert_eq!(tracker.config().sweep_interval, MIN_SWEEP_INTERVAL);

        let tracker = PeerTracker::default();
        assert_eq!(tracker.config().sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn reannounce_updates_in_place_and_keeps_order() {
        let tracker = PeerTracker::default();
        for peer in ["a", "b", "c"] {
            tracker.announce(HASH, peer, "10.0.0.1", 6881).unwrap();
        }
        // "a" moves to a new address but keeps its slot
        tracker.announce(HASH, "a", "10.0.0.9", 7000).unwrap();

        let peers = tracker.announce(HASH, "d", "10.0.0.4", 6881).unwrap();
        assert_eq!(ids(&peers), vec!["a", "b", "c"]);
        assert_eq!(peers[0].ip, "10.0.0.9");
        assert_eq!(peers[0].port, 7000);

        let report = tracker.scrape(Some(&[HASH.to_string()]));
        assert_eq!(report[HASH].complete, 4);
        assert_eq!(report[HASH].incomplete, 0);
    }

    #[test]
    fn announcer_is_never_in_its_own_result() {
        let tracker = PeerTracker::default();
        for round in 0..3 {
            for peer in ["x", "y", "z"] {
                let peers = tracker.announce(HASH, peer, "10.0.0.1", 6881 + round).unwrap();
                assert!(!ids(&peers).contains(&peer));
            }
        }
        assert_eq!(tracker.stats().total_peer_count, 3);
    }

    #[test]
    fn invalid_announces_do_not_mutate() {
        let tracker = PeerTracker::default();
        assert!(matches!(
            tracker.announce("", "peer", "10.0.0.1", 6881),
            Err(TrackerError::Validation(_))
        ));
        assert!(tracker.announce(HASH, "", "10.0.0.1", 6881).is_err());
        assert!(tracker.announce(HASH, "peer", "10.0.0.1", 0).is_err());
        assert_eq!(tracker.stats(), TrackerStats::default());
    }

    #[test]
    fn scrape_all_and_unknown_hashes() {
        let tracker = PeerTracker::default();
        tracker.announce("h1", "a", "10.0.0.1", 1).unwrap();
        tracker.announce("h2", "a", "10.0.0.1", 1).unwrap();
        tracker.announce("h2", "b", "10.0.0.2", 1).unwrap();

        let all = tracker.scrape(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all["h2"].complete, 2);

        let some = tracker.scrape(Some(&["h1".to_string(), "missing".to_string()]));
        assert_eq!(some.len(), 1);
        assert!(some.contains_key("h1"));
    }

    #[test]
    fn removing_last_peer_drops_the_swarm() {
        let tracker = PeerTracker::default();
        tracker.announce(HASH, "a", "10.0.0.1", 1).unwrap();
        tracker.announce(HASH, "b", "10.0.0.2", 1).unwrap();

        assert!(tracker.remove_peer(HASH, "a"));
        assert!(!tracker.remove_peer(HASH, "a"));
        assert_eq!(tracker.scrape(None)[HASH].complete, 1);

        assert!(tracker.remove_peer(HASH, "b"));
        assert!(tracker.scrape(Some(&[HASH.to_string()])).is_empty());
        assert_eq!(tracker.stats().swarm_count, 0);
        assert!(!tracker.remove_peer("nope", "a"));
    }

    #[test]
    fn sweep_removes_only_stale_peers() {
        let tracker = PeerTracker::default();
        let start = Instant::now();
        tracker.announce_at("old", "stale", "10.0.0.1", 1, start).unwrap();
        tracker.announce_at("mixed", "stale", "10.0.0.1", 1, start).unwrap();
        tracker
            .announce_at("mixed", "fresh", "10.0.0.2", 1, start + Duration::from_secs(5 * 60))
            .unwrap();

        let later = start + Duration::from_secs(11 * 60);
        assert_eq!(tracker.sweep_at(later), 2);

        let report = tracker.scrape(None);
        assert!(!report.contains_key("old"));
        assert_eq!(report["mixed"].complete, 1);
        assert_eq!(
            tracker.stats(),
            TrackerStats {
                swarm_count: 1,
                total_peer_count: 1
            }
        );

        // Nothing left to clean
        assert_eq!(tracker.sweep_at(later), 0);
        assert_eq!(tracker.stats().total_peer_count, 1);
    }

    #[test]
    fn peer_exactly_at_ttl_survives() {
        let tracker = PeerTracker::default();
        let start = Instant::now();
        tracker.announce_at(HASH, "a", "10.0.0.1", 1, start).unwrap();
        assert_eq!(tracker.sweep_at(start + Duration::from_secs(10 * 60)), 0);
        assert_eq!(tracker.sweep_at(start + Duration::from_secs(10 * 60 + 1)), 1);
    }

    #[test]
    fn short_hash_is_char_safe() {
        assert_eq!(short_hash("abcdef0123456789"), "abcdef01");
        assert_eq!(short_hash("abc"), "abc");
        assert_eq!(short_hash("ééééé"), "éééé");
    }
}
