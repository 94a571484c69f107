//! Head and trail collision detection.
//!
//! Trails are hit-tested by sampling: starting from the newest point and
//! walking backwards, every `stride`-th point is tested until the owner's
//! sample budget runs out. Sampling density is tunable through
//! `[collision]` in the config.

use crate::config::Config;
use crate::entity::{PlayerId, TrailPoint};
use crate::world::World;
use glam::Vec2;
use std::collections::VecDeque;
use std::time::Instant;

/// What killed a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Touched another player's head.
    Head(PlayerId),
    /// Touched another player's trail.
    Trail(PlayerId),
    /// Touched its own trail (only with `self_collision`).
    OwnTrail,
}

/// A lethal contact found by [`find_hits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub victim: PlayerId,
    pub cause: Cause,
}

/// Trail points skipped between two samples.
#[inline]
pub fn trail_stride(half_width: f32, sample_spacing: f32, speed: f32) -> usize {
    if speed <= 0.0 {
        return 1;
    }
    ((half_width * sample_spacing / speed).floor() as usize).max(1)
}

/// Number of samples tested on a trail whose owner has `score`.
#[inline]
pub fn sample_budget(score: f32, config: &Config) -> usize {
    config.collision.samples_base
        + (config.collision.samples_per_point * score.max(0.0)).floor() as usize
}

/// Points at the head end of a player's own trail that are always within
/// reach of its head and must be ignored for self collision.
#[inline]
pub fn self_grace(hitbox: f32, half_width: f32, speed: f32) -> usize {
    if speed <= 0.0 {
        return usize::MAX;
    }
    (2.0 * (hitbox + half_width) / speed).ceil() as usize + 1
}

/// Whether two circles overlap.
#[inline]
pub fn circles_touch(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let r = ra + rb;
    a.distance_squared(b) < r * r
}

/// Test `head` against sampled points of `trail`, newest first.
///
/// `skip` newest points are ignored before sampling starts.
pub fn hits_trail(
    head: Vec2,
    reach: f32,
    trail: &VecDeque<TrailPoint>,
    skip: usize,
    stride: usize,
    budget: usize,
) -> bool {
    let reach_sq = reach * reach;
    trail
        .iter()
        .rev()
        .skip(skip)
        .step_by(stride.max(1))
        .take(budget)
        .any(|point| point.position.distance_squared(head) < reach_sq)
}

/// Find every alive, vulnerable player touching another player's head or
/// trail (or its own trail when enabled).
///
/// All tests use the positions at the time of the call, so two heads meeting
/// head-on are both reported.
pub fn find_hits(world: &World, config: &Config, now: Instant) -> Vec<Hit> {
    let ids = world.player_ids();
    let mut hits = Vec::new();

    for &a_id in &ids {
        let Some(a) = world.player(a_id) else {
            continue;
        };
        if !a.alive || a.is_invulnerable(now) {
            continue;
        }
        let a_hitbox = a.hitbox(&config.player);

        let mut cause = None;
        for &b_id in &ids {
            if b_id == a_id {
                continue;
            }
            let Some(b) = world.player(b_id) else {
                continue;
            };
            if !b.alive {
                continue;
            }

            let b_hitbox = b.hitbox(&config.player);
            if circles_touch(a.position, a_hitbox, b.position, b_hitbox) {
                cause = Some(Cause::Head(b_id));
                break;
            }

            let half_width = b.half_width(config);
            let stride = trail_stride(
                half_width,
                config.collision.sample_spacing,
                config.player.speed,
            );
            let budget = sample_budget(b.score, config);
            if hits_trail(a.position, a_hitbox + half_width, &b.trail, 0, stride, budget) {
                cause = Some(Cause::Trail(b_id));
                break;
            }
        }

        if cause.is_none() && config.collision.self_collision {
            let half_width = a.half_width(config);
            let skip = self_grace(a_hitbox, half_width, config.player.speed);
            let stride = trail_stride(
                half_width,
                config.collision.sample_spacing,
                config.player.speed,
            );
            let budget = sample_budget(a.score, config);
            if hits_trail(a.position, a_hitbox + half_width, &a.trail, skip, stride, budget) {
                cause = Some(Cause::OwnTrail);
            }
        }

        if let Some(cause) = cause {
            hits.push(Hit { victim: a_id, cause });
        }
    }

    hits
}
