//! Connection registry and name pool.

use super::connection::{ConnectionHandle, ConnectionId};
use bytes::Bytes;
use protocol::ServerMessage;
use rand::Rng;
use std::collections::HashMap;
use tracing::warn;

/// Longest accepted host label.
pub const MAX_HOST_LENGTH: usize = 32;
/// Longest accepted chat line.
pub const MAX_CHAT_LENGTH: usize = 120;

/// Trim, drop control characters and cut to `max` characters.
pub fn sanitize_text(raw: &str, max: usize) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(max)
        .collect();
    cleaned.trim().to_string()
}

/// Cleaned host label, or `None` if nothing printable remains.
pub fn sanitize_host(raw: Option<&str>) -> Option<String> {
    let host = sanitize_text(raw?, MAX_HOST_LENGTH);
    (!host.is_empty()).then_some(host)
}

/// Fallback name used once the pool is exhausted.
pub fn generated_name<R: Rng>(rng: &mut R) -> String {
    format!("Player-{:04X}", rng.random::<u16>())
}

/// Names handed out without replacement.
#[derive(Debug, Clone)]
pub struct NamePool {
    members: Vec<String>,
    available: Vec<String>,
}

impl NamePool {
    pub fn new(names: &[String]) -> Self {
        let mut members: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !name.trim().is_empty() && !members.contains(name) {
                members.push(name.clone());
            }
        }
        Self {
            available: members.clone(),
            members,
        }
    }

    /// Take a random unused name.
    pub fn take<R: Rng>(&mut self, rng: &mut R) -> Option<String> {
        if self.available.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.available.len());
        Some(self.available.swap_remove(index))
    }

    /// Return a name to the pool. Names that never came from the pool, or
    /// are already available, are ignored.
    pub fn release(&mut self, name: String) {
        if self.members.contains(&name) && !self.available.contains(&name) {
            self.available.push(name);
        }
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }
}

/// All open connections.
#[derive(Debug)]
pub struct Registry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    pub names: NamePool,
    /// Connections whose outbound queue rejected a frame.
    stale: Vec<ConnectionId>,
}

impl Registry {
    pub fn new(names: &[String]) -> Self {
        Self {
            connections: HashMap::new(),
            names: NamePool::new(names),
            stale: Vec::new(),
        }
    }

    pub fn insert(&mut self, handle: ConnectionHandle) {
        self.connections.insert(handle.id, handle);
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.remove(&id)
    }

    #[inline]
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionHandle> {
        self.connections.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut ConnectionHandle> {
        self.connections.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.connections.values()
    }

    pub fn handles_mut(&mut self) -> impl Iterator<Item = &mut ConnectionHandle> {
        self.connections.values_mut()
    }

    /// Queue already-encoded bytes for one connection.
    pub fn send_frame(&mut self, id: ConnectionId, frame: Bytes) {
        if let Some(handle) = self.connections.get(&id) {
            if !handle.send(frame) {
                self.stale.push(id);
            }
        }
    }

    /// Serialize and send a message to one connection.
    pub fn send(&mut self, id: ConnectionId, message: &ServerMessage) {
        match message.to_frame() {
            Ok(frame) => self.send_frame(id, frame),
            Err(e) => warn!("Failed to encode message for {}: {}", id, e),
        }
    }

    /// Queue the same bytes for every connection.
    pub fn broadcast_frame(&mut self, frame: Bytes) {
        for handle in self.connections.values() {
            if !handle.send(frame.clone()) {
                self.stale.push(handle.id);
            }
        }
    }

    /// Serialize and frame once, then fan out to every connection.
    pub fn broadcast(&mut self, message: &ServerMessage) {
        match message.to_frame() {
            Ok(frame) => self.broadcast_frame(frame),
            Err(e) => warn!("Failed to encode broadcast: {}", e),
        }
    }

    /// Drain connections that could not keep up.
    pub fn take_stale(&mut self) -> Vec<ConnectionId> {
        let mut stale = std::mem::take(&mut self.stale);
        stale.sort_unstable();
        stale.dedup();
        stale
    }
}
