//! Connection handle held by the game task.

use crate::entity::PlayerId;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Server-assigned connection identifier.
pub type ConnectionId = u64;

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Already-encoded frame bytes.
    Frame(Bytes),
    /// Send a close frame and shut the socket.
    Close,
}

/// A connected socket as seen by the game task.
///
/// This is the only link between a connection and its player.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    /// Player owned by this connection, if it has joined.
    pub player: Option<PlayerId>,
    /// Name leased from the name pool, returned when the connection leaves.
    pub pool_name: Option<String>,
    /// Last time any frame arrived.
    pub last_seen: Instant,
    /// When the outstanding ping was sent, if no frame arrived since.
    pub ping_sent_at: Option<Instant>,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        addr: SocketAddr,
        tx: mpsc::Sender<Outbound>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            addr,
            player: None,
            pool_name: None,
            last_seen: now,
            ping_sent_at: None,
            tx,
        }
    }

    /// Queue frame bytes. Returns false if the writer is gone or backed up.
    #[inline]
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.try_send(Outbound::Frame(frame)).is_ok()
    }

    /// Ask the writer to close the socket.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }

    /// Record a sign of life.
    #[inline]
    pub fn touch(&mut self, now: Instant) {
        self.last_seen = now;
        self.ping_sent_at = None;
    }

    /// Record an outgoing ping unless one is already outstanding.
    pub fn mark_pinged(&mut self, now: Instant) {
        if self.ping_sent_at.is_none() {
            self.ping_sent_at = Some(now);
        }
    }

    #[inline]
    pub fn awaiting_pong(&self) -> bool {
        self.ping_sent_at.is_some()
    }

    /// Whether a ping has gone unanswered for at least `timeout`.
    pub fn is_unresponsive(&self, now: Instant, timeout: Duration) -> bool {
        self.ping_sent_at
            .is_some_and(|sent| now.saturating_duration_since(sent) >= timeout)
    }
}
