use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::message::{Message, PeerAddress};

/// Failed connection attempts after which a peer is no longer retried.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;
/// Silence (seconds) after which an exhausted peer is evicted.
pub const PEER_EVICTION_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Discovered,
    Connecting,
    Connected,
    Disconnected,
}

/// A known remote node.
#[derive(Debug)]
pub struct Peer {
    pub peer_id: String,
    pub address: String,
    pub port: u16,
    pub state: PeerState,
    pub last_seen: DateTime<Utc>,
    pub connection_attempts: u32,
    connection: Option<(u64, mpsc::Sender<Message>)>,
}

/// Serializable view of a [`Peer`] for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerInfo {
    pub peer_id: String,
    pub address: String,
    pub port: u16,
    pub state: PeerState,
    pub is_connected: bool,
    pub last_seen: String,
    pub connection_attempts: u32,
}

impl Peer {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        let address = address.into();
        Self {
            peer_id: format!("{address}:{port}"),
            address,
            port,
            state: PeerState::Discovered,
            last_seen: Utc::now(),
            connection_attempts: 0,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == PeerState::Connected
    }

    pub fn mark_connecting(&mut self) {
        self.state = PeerState::Connecting;
    }

    /// Attach a live connection. `conn_id` identifies it so that a stale
    /// connection cannot later tear down a newer one.
    pub fn mark_connected(&mut self, conn_id: u64, outbox: mpsc::Sender<Message>) {
        self.state = PeerState::Connected;
        self.connection = Some((conn_id, outbox));
        self.connection_attempts = 0;
        self.last_seen = Utc::now();
    }

    pub fn mark_failed(&mut self) {
        self.connection_attempts += 1;
        self.state = PeerState::Disconnected;
        self.connection = None;
    }

    pub fn mark_disconnected(&mut self) {
        self.state = PeerState::Disconnected;
        self.connection = None;
    }

    /// Drop the connection only if it is still the one identified by `conn_id`.
    pub fn connection_lost(&mut self, conn_id: u64) -> bool {
        match &self.connection {
            Some((current, _)) if *current == conn_id => {
                self.mark_disconnected();
                true
            }
            _ => false,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.state, PeerState::Discovered | PeerState::Disconnected)
            && self.connection_attempts < MAX_CONNECT_ATTEMPTS
    }

    /// Disconnected, out of retries and silent for longer than the eviction window.
    pub fn is_dead(&self, now: DateTime<Utc>) -> bool {
        self.state == PeerState::Disconnected
            && self.connection_attempts >= MAX_CONNECT_ATTEMPTS
            && now - self.last_seen > ChronoDuration::seconds(PEER_EVICTION_SECS)
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            peer_id: self.peer_id.clone(),
            address: self.address.clone(),
            port: self.port,
            state: self.state,
            is_connected: self.is_connected(),
            last_seen: self.last_seen.to_rfc3339(),
            connection_attempts: self.connection_attempts,
        }
    }
}

/// Live connection handle of a connected peer.
#[derive(Debug, Clone)]
pub struct Outbox {
    pub peer_id: String,
    pub conn_id: u64,
    pub sender: mpsc::Sender<Message>,
}

/// Peer table keyed by `host:port`.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, Peer>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the peer is already known.
    pub fn insert(&mut self, peer: Peer) -> bool {
        if self.peers.contains_key(&peer.peer_id) {
            return false;
        }
        self.peers.insert(peer.peer_id.clone(), peer);
        true
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &str) -> Option<&Peer> {
        self.peers.get(peer_id)
    }

    pub fn get_mut(&mut self, peer_id: &str) -> Option<&mut Peer> {
        self.peers.get_mut(peer_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.values().filter(|p| p.is_connected()).count()
    }

    /// Outboxes of connected peers, minus `except` when given.
    pub fn outboxes(&self, except: Option<&str>) -> Vec<Outbox> {
        self.peers
            .values()
            .filter(|p| p.is_connected() && Some(p.peer_id.as_str()) != except)
            .filter_map(|p| {
                p.connection.as_ref().map(|(conn_id, sender)| Outbox {
                    peer_id: p.peer_id.clone(),
                    conn_id: *conn_id,
                    sender: sender.clone(),
                })
            })
            .collect()
    }

    pub fn reconnect_candidates(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|p| p.should_retry())
            .map(|p| p.peer_id.clone())
            .collect()
    }

    /// Remove every dead peer and return their ids.
    pub fn evict_dead(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let dead: Vec<String> = self
            .peers
            .values()
            .filter(|p| p.is_dead(now))
            .map(|p| p.peer_id.clone())
            .collect();
        for id in &dead {
            self.peers.remove(id);
        }
        dead
    }

    pub fn disconnect_all(&mut self) {
        for peer in self.peers.values_mut() {
            peer.mark_disconnected();
        }
    }

    pub fn addresses(&self) -> Vec<PeerAddress> {
        let mut out: Vec<PeerAddress> = self
            .peers
            .values()
            .map(|p| PeerAddress {
                address: p.address.clone(),
                port: p.port,
            })
            .collect();
        out.sort_by(|a, b| (&a.address, a.port).cmp(&(&b.address, b.port)));
        out
    }

    pub fn infos(&self) -> Vec<PeerInfo> {
        let mut out: Vec<PeerInfo> = self.peers.values().map(Peer::info).collect();
        out.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        out
    }
}
