//! World state management.
//!
//! Owns the players, the orbs and the random generator shared by every
//! placement decision.

use crate::config::PlayerConfig;
use crate::entity::{Orb, Player, PlayerId};
use glam::Vec2;
use protocol::messages::{OrbView, PlayerView};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::time::Instant;

/// The authoritative game world.
#[derive(Debug)]
pub struct World {
    /// Side length of the square arena.
    pub arena_size: f32,
    /// Completed simulation steps.
    pub tick: u64,
    pub players: HashMap<PlayerId, Player>,
    pub orbs: Vec<Orb>,
    rng: StdRng,
}

impl World {
    /// Create an empty world. A seed makes every random placement reproducible.
    pub fn new(arena_size: f32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            arena_size,
            tick: 0,
            players: HashMap::with_capacity(32),
            orbs: Vec::with_capacity(256),
            rng,
        }
    }

    #[inline]
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Random position at least `margin` away from every edge.
    pub fn random_position(&mut self, margin: f32) -> Vec2 {
        let margin = margin.max(0.0);
        if margin * 2.0 >= self.arena_size {
            let center = self.arena_size / 2.0;
            return Vec2::new(center, center);
        }
        let max = self.arena_size - margin;
        Vec2::new(
            self.rng.random_range(margin..max),
            self.rng.random_range(margin..max),
        )
    }

    #[inline]
    pub fn random_heading(&mut self) -> f32 {
        self.rng.random_range(0.0..TAU)
    }

    /// Fresh id not used by any current player.
    pub fn next_player_id(&mut self) -> PlayerId {
        loop {
            let id = PlayerId(self.rng.random());
            if !self.players.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    #[inline]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    #[inline]
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Player ids in a stable order.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.players.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Every known player, alive or dead, ordered by id.
    pub fn player_views(&self, config: &PlayerConfig, now: Instant) -> Vec<PlayerView> {
        self.player_ids()
            .into_iter()
            .filter_map(|id| self.players.get(&id))
            .map(|p| p.view(config, now))
            .collect()
    }

    pub fn orb_views(&self) -> Vec<OrbView> {
        self.orbs.iter().map(Orb::view).collect()
    }
}
