//! ClientSession - Per-connection state
//!
//! Each client connection to a service has its own session, owned by the
//! broker thread forwarding that connection.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Unique identifier for a client connection
pub type ClientId = usize;

/// Created when a client connects and dropped when it disconnects.
#[derive(Debug)]
pub struct ClientSession {
    pub id: ClientId,
    pub peer: SocketAddr,
    /// Batches answered on this connection
    pub batches: u64,
    /// Batches whose response stream was cut short
    pub interrupted: u64,
    connected_at: Instant,
}

impl ClientSession {
    pub fn new(id: ClientId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            batches: 0,
            interrupted: 0,
            connected_at: Instant::now(),
        }
    }

    pub fn record_batch(&mut self, complete: bool) {
        self.batches += 1;
        if !complete {
            self.interrupted += 1;
        }
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
