//! Transport-side peer tracking for the UDP adapter
//!
//! This module handles the network half of a connection's life, including:
//! - Allocating connection IDs for new peers
//! - Mapping peer addresses back to their connection
//! - Liveness tracking and timeout detection
//!
//! It knows nothing about teams or spawns. Every ID it hands out is passed
//! to the session coordinator, which decides whether the peer is admitted.

use log::info;
use shared::ConnectionId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A peer the transport is currently talking to
#[derive(Debug)]
pub struct Client {
    /// Connection handle allocated by the transport
    pub id: ConnectionId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
}

impl Client {
    /// Creates a peer record marked as recently active
    pub fn new(id: ConnectionId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
        }
    }

    /// Records activity from this peer
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Checks if the peer has exceeded the connection timeout
    ///
    /// Returns true if no packets have been received from this peer
    /// within the specified timeout duration, indicating a likely disconnect.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Address book of connected peers
///
/// IDs are never reused within one server run, so a late disconnect for an
/// old connection can never release a newer one.
pub struct ClientManager {
    /// Connected peers indexed by connection ID
    clients: HashMap<ConnectionId, Client>,
    /// Next ID handed to a new peer
    next_connection_id: u64,
}

impl ClientManager {
    /// Creates an empty address book. IDs start from 1.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_connection_id: 1,
        }
    }

    /// Registers a new peer and returns its connection ID
    pub fn add_client(&mut self, addr: SocketAddr) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        info!("Peer {} connected from {}", id, addr);
        self.clients.insert(id, Client::new(id, addr));
        id
    }

    /// Forgets a peer
    ///
    /// Returns true if the peer was found and removed, false if it was
    /// already gone.
    pub fn remove_client(&mut self, id: ConnectionId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Finds a connection ID by network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.clients
            .values()
            .find(|client| client.addr == addr)
            .map(|client| client.id)
    }

    /// Records activity for a peer. Returns false for unknown IDs.
    pub fn touch(&mut self, id: ConnectionId) -> bool {
        if let Some(client) = self.clients.get_mut(&id) {
            client.touch();
            true
        } else {
            false
        }
    }

    /// Removes and returns every peer silent for longer than `timeout`
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<ConnectionId> {
        let timed_out: Vec<ConnectionId> = self
            .clients
            .values()
            .filter(|client| client.is_timed_out(timeout))
            .map(|client| client.id)
            .collect();

        for id in &timed_out {
            info!("Peer {} timed out", id);
            self.clients.remove(id);
        }

        timed_out
    }

    /// Gets all connection IDs and their network addresses
    pub fn get_client_addrs(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.clients
            .values()
            .map(|client| (client.id, client.addr))
            .collect()
    }

    /// Returns the number of tracked peers
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no peers are tracked
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
