//! Snapshot and delta encoding of player state.
//!
//! The tracker remembers the last tuple sent for every player so the
//! per-tick delta carries only players whose tuple changed.

use crate::config::Config;
use crate::entity::{Player, PlayerId};
use crate::world::World;
use protocol::ServerMessage;
use protocol::messages::DeltaEntry;
use std::collections::HashMap;
use std::time::Instant;

#[inline]
fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// Minimal per-player tuple with coordinates and hitbox rounded to one decimal.
pub fn delta_entry(player: &Player, config: &Config) -> DeltaEntry {
    DeltaEntry(
        player.id.to_string(),
        round1(player.position.x),
        round1(player.position.y),
        player.display_score(),
        player.alive,
        player.boosting,
        round1(player.hitbox(&config.player)),
    )
}

/// Last tuple sent per player.
#[derive(Debug, Default)]
pub struct SyncTracker {
    last_sent: HashMap<PlayerId, DeltaEntry>,
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a `delta` with every tuple that differs from the last one sent.
    ///
    /// Returns `None` when nothing changed. Players no longer in the world
    /// are dropped from the baseline.
    pub fn delta(&mut self, world: &World, config: &Config) -> Option<ServerMessage> {
        self.last_sent.retain(|id, _| world.players.contains_key(id));

        let mut changed = Vec::new();
        for id in world.player_ids() {
            let Some(player) = world.player(id) else {
                continue;
            };
            let entry = delta_entry(player, config);
            if self.last_sent.get(&id) != Some(&entry) {
                self.last_sent.insert(id, entry.clone());
                changed.push(entry);
            }
        }

        if changed.is_empty() {
            None
        } else {
            Some(ServerMessage::Delta { players: changed })
        }
    }

    /// Build a full `state` snapshot and make it the new baseline.
    pub fn snapshot(&mut self, world: &World, config: &Config, now: Instant) -> ServerMessage {
        self.last_sent.clear();
        for player in world.players.values() {
            self.last_sent.insert(player.id, delta_entry(player, config));
        }
        ServerMessage::State {
            players: world.player_views(&config.player, now),
            config: config.tuning(),
        }
    }

    /// Drop a departed player from the baseline.
    pub fn forget(&mut self, id: PlayerId) {
        self.last_sent.remove(&id);
    }
}
