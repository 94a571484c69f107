//! Player entity.

use crate::config::{Config, PlayerConfig, TrailConfig};
use glam::Vec2;
use protocol::messages::PlayerView;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Opaque player identifier, shown to clients as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One historical head position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    pub position: Vec2,
    pub at: Instant,
}

/// Number of trail points kept for a given score.
///
/// Grows with score and never drops below `min_length`.
pub fn retention(score: f32, trail: &TrailConfig) -> usize {
    let raw = trail.base_length as f32 + trail.length_per_point * score.max(0.0);
    let cap = trail.max_length.max(trail.min_length);
    (raw as usize).clamp(trail.min_length, cap)
}

/// A participant in the arena.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub avatar: String,
    pub host: Option<String>,
    pub position: Vec2,
    /// Heading in radians.
    pub heading: f32,
    pub boosting: bool,
    pub score: f32,
    pub alive: bool,
    /// Oldest point at the front.
    pub trail: VecDeque<TrailPoint>,
    pub invulnerable_until: Instant,
    pub dead_until: Instant,
}

impl Player {
    /// Create an alive player with a fresh invulnerability window.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PlayerId,
        name: String,
        avatar: String,
        host: Option<String>,
        position: Vec2,
        heading: f32,
        now: Instant,
        invulnerability: Duration,
    ) -> Self {
        Self {
            id,
            name,
            avatar,
            host,
            position,
            heading,
            boosting: false,
            score: 0.0,
            alive: true,
            trail: VecDeque::new(),
            invulnerable_until: now + invulnerability,
            dead_until: now,
        }
    }

    /// Current linear speed.
    #[inline]
    pub fn speed(&self, config: &PlayerConfig) -> f32 {
        if self.boosting {
            config.boost_speed
        } else {
            config.speed
        }
    }

    /// Collision radius derived from score.
    #[inline]
    pub fn hitbox(&self, config: &PlayerConfig) -> f32 {
        (config.base_radius + config.radius_growth * self.score.max(0.0).sqrt())
            .min(config.max_radius)
    }

    /// Half of the trail's visual thickness.
    #[inline]
    pub fn half_width(&self, config: &Config) -> f32 {
        self.hitbox(&config.player) * config.trail.width_factor
    }

    #[inline]
    pub fn is_invulnerable(&self, now: Instant) -> bool {
        now < self.invulnerable_until
    }

    /// Integer score as shown to clients.
    #[inline]
    pub fn display_score(&self) -> u32 {
        self.score.max(0.0).floor() as u32
    }

    /// Transition to dead. Returns false if the player was already dead.
    pub fn kill(&mut self, now: Instant, respawn_delay: Duration) -> bool {
        if !self.alive {
            return false;
        }
        self.alive = false;
        self.boosting = false;
        self.dead_until = now + respawn_delay;
        true
    }

    /// Re-enter the arena at `position` with score 0 and an empty trail.
    pub fn respawn(
        &mut self,
        position: Vec2,
        heading: f32,
        now: Instant,
        invulnerability: Duration,
    ) {
        self.position = position;
        self.heading = heading;
        self.boosting = false;
        self.score = 0.0;
        self.alive = true;
        self.trail.clear();
        self.invulnerable_until = now + invulnerability;
    }

    /// Append the current position and drop the oldest points beyond `keep`.
    pub fn push_trail(&mut self, at: Instant, keep: usize) {
        self.trail.push_back(TrailPoint {
            position: self.position,
            at,
        });
        while self.trail.len() > keep {
            self.trail.pop_front();
        }
    }

    /// Public attributes sent in `spawn`, `welcome`, `state` and `reset`.
    pub fn view(&self, config: &PlayerConfig, now: Instant) -> PlayerView {
        PlayerView {
            id: self.id.to_string(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            host: self.host.clone(),
            x: self.position.x,
            y: self.position.y,
            angle: self.heading,
            score: self.display_score(),
            alive: self.alive,
            boosting: self.boosting,
            invulnerable: self.is_invulnerable(now),
            hitbox: self.hitbox(config),
        }
    }
}
