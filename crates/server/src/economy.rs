//! Orb economy: replenishment, death drops and pickup.

use crate::config::OrbConfig;
use crate::entity::Orb;
use crate::world::World;
use glam::Vec2;
use rand::Rng;
use std::f32::consts::TAU;

impl World {
    /// Add ordinary orbs until the population reaches the target.
    ///
    /// Bonus orbs count toward the population. Returns how many were added.
    pub fn replenish_orbs(&mut self, config: &OrbConfig) -> usize {
        let missing = config.target.saturating_sub(self.orbs.len());
        for _ in 0..missing {
            let position = self.random_position(config.margin);
            self.orbs.push(Orb::ordinary(position, config.value));
        }
        missing
    }

    /// Drop every orb and build a fresh ordinary population.
    pub fn regenerate_orbs(&mut self, config: &OrbConfig) {
        self.orbs.clear();
        self.replenish_orbs(config);
    }

    /// Scatter bonus orbs on a ring around a death position.
    ///
    /// The count is proportional to `score` and capped; the ring sits
    /// `ring_spacing` outside `radius`. Returns how many were spawned.
    pub fn scatter_bonus_orbs(
        &mut self,
        center: Vec2,
        score: f32,
        radius: f32,
        config: &OrbConfig,
    ) -> usize {
        let count = ((score.max(0.0) * config.bonus_per_point).floor() as usize)
            .min(config.max_bonus_per_death);
        if count == 0 {
            return 0;
        }

        let ring = radius + config.ring_spacing;
        let phase = self.rng().random_range(0.0..TAU);
        let low = config.margin.min(self.arena_size / 2.0);
        let high = self.arena_size - low;
        for i in 0..count {
            let angle = phase + TAU * i as f32 / count as f32;
            let position = (center + Vec2::from_angle(angle) * ring)
                .clamp(Vec2::splat(low), Vec2::splat(high));
            self.orbs.push(Orb::bonus(position, config.bonus_value));
        }
        count
    }

    /// Remove every orb within `reach` of `position`.
    ///
    /// Returns the total value collected and the number of orbs removed.
    pub fn collect_orbs(&mut self, position: Vec2, reach: f32) -> (u32, usize) {
        let reach_sq = reach * reach;
        let before = self.orbs.len();
        let mut value = 0;
        self.orbs.retain(|orb| {
            if orb.position.distance_squared(position) < reach_sq {
                value += orb.value;
                false
            } else {
                true
            }
        });
        (value, before - self.orbs.len())
    }
}
