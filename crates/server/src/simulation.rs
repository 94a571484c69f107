//! Fixed-rate simulation step.
//!
//! Per tick, every alive player moves, decays score while boosting, checks
//! the arena edge, extends its trail and picks up orbs. Then collisions are
//! resolved, the orb population is replenished and due respawns happen.

use crate::collision::{self, Cause};
use crate::config::Config;
use crate::entity::{PlayerId, retention};
use crate::world::World;
use glam::Vec2;
use std::time::{Duration, Instant};
use tracing::debug;

/// What happened during one step, for broadcasting.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutcome {
    /// Players that died this tick, each exactly once.
    pub deaths: Vec<PlayerId>,
    /// Players that came back to life this tick.
    pub respawns: Vec<PlayerId>,
    /// Whether any orb was removed or added.
    pub orbs_changed: bool,
    /// Last player that picked up an orb, with its new integer score.
    pub scorer: Option<(PlayerId, u32)>,
}

/// Kill a player, dropping bonus orbs around it.
///
/// Returns the number of bonus orbs dropped, or `None` if the player is
/// unknown or already dead.
pub fn kill(world: &mut World, id: PlayerId, config: &Config, now: Instant) -> Option<usize> {
    let respawn_delay = Duration::from_millis(config.player.respawn_delay_ms);
    let player = world.player_mut(id)?;
    if !player.kill(now, respawn_delay) {
        return None;
    }
    let (center, score, radius) = (
        player.position,
        player.score,
        player.hitbox(&config.player),
    );
    Some(world.scatter_bonus_orbs(center, score, radius, &config.orbs))
}

/// Advance the world by one tick.
pub fn step(world: &mut World, config: &Config, now: Instant) -> TickOutcome {
    let mut outcome = TickOutcome::default();
    let size = world.arena_size;

    for id in world.player_ids() {
        let Some(player) = world.player_mut(id) else {
            continue;
        };
        if !player.alive {
            continue;
        }

        let speed = player.speed(&config.player);
        player.position += Vec2::from_angle(player.heading) * speed;
        if player.boosting {
            player.score = (player.score - config.player.boost_decay).max(0.0);
        }

        let r = player.hitbox(&config.player);
        let p = player.position;
        if p.x < r || p.y < r || p.x > size - r || p.y > size - r {
            if player.is_invulnerable(now) {
                let low = r.min(size / 2.0);
                player.position = p.clamp(Vec2::splat(low), Vec2::splat(size - low));
            } else {
                if let Some(dropped) = kill(world, id, config, now) {
                    debug!("Player {} hit the arena edge", id);
                    outcome.deaths.push(id);
                    outcome.orbs_changed |= dropped > 0;
                }
                continue;
            }
        }

        let keep = retention(player.score, &config.trail);
        player.push_trail(now, keep);

        let (position, reach) = (player.position, r + config.orbs.radius);
        let (value, count) = world.collect_orbs(position, reach);
        if count > 0 {
            outcome.orbs_changed = true;
            if let Some(player) = world.player_mut(id) {
                player.score += value as f32;
                outcome.scorer = Some((id, player.display_score()));
            }
        }
    }

    for hit in collision::find_hits(world, config, now) {
        if let Some(dropped) = kill(world, hit.victim, config, now) {
            match hit.cause {
                Cause::Head(other) => {
                    debug!("Player {} collided head-on with {}", hit.victim, other)
                }
                Cause::Trail(other) => {
                    debug!("Player {} hit the trail of {}", hit.victim, other)
                }
                Cause::OwnTrail => debug!("Player {} hit its own trail", hit.victim),
            }
            outcome.deaths.push(hit.victim);
            outcome.orbs_changed |= dropped > 0;
        }
    }

    if world.replenish_orbs(&config.orbs) > 0 {
        outcome.orbs_changed = true;
    }

    let invulnerability = Duration::from_millis(config.player.invulnerability_ms);
    for id in world.player_ids() {
        let due = world
            .player(id)
            .is_some_and(|p| !p.alive && now >= p.dead_until);
        if !due {
            continue;
        }
        let position = world.random_position(config.arena.spawn_margin);
        let heading = world.random_heading();
        if let Some(player) = world.player_mut(id) {
            player.respawn(position, heading, now, invulnerability);
            outcome.respawns.push(id);
        }
    }

    world.tick += 1;
    outcome
}

/// Respawn every player and rebuild the orb field.
pub fn reset(world: &mut World, config: &Config, now: Instant) {
    let invulnerability = Duration::from_millis(config.player.invulnerability_ms);
    for id in world.player_ids() {
        let position = world.random_position(config.arena.spawn_margin);
        let heading = world.random_heading();
        if let Some(player) = world.player_mut(id) {
            player.respawn(position, heading, now, invulnerability);
        }
    }
    world.regenerate_orbs(&config.orbs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Orb, Player};
    use std::f32::consts::PI;

    const TICK: Duration = Duration::from_millis(33);

    fn config() -> Config {
        let mut config = Config::default();
        config.orbs.target = 0;
        config
    }

    fn spawn(
        world: &mut World,
        raw: u64,
        position: Vec2,
        heading: f32,
        now: Instant,
        invulnerable: bool,
    ) -> PlayerId {
        let id = PlayerId(raw);
        let window = if invulnerable {
            Duration::from_secs(60)
        } else {
            Duration::ZERO
        };
        world.add_player(Player::new(
            id,
            format!("p{raw}"),
            "cat".into(),
            None,
            position,
            heading,
            now,
            window,
        ));
        id
    }

    #[test]
    fn test_motion_integrates_heading() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(1000.0, 1000.0), PI / 2.0, now, false);

        step(&mut world, &config, now);
        let p = world.player(id).unwrap();
        assert!((p.position.x - 1000.0).abs() < 1e-3);
        assert!((p.position.y - 1003.0).abs() < 1e-3);
        assert_eq!(p.trail.len(), 1);
        assert_eq!(world.tick, 1);
    }

    #[test]
    fn test_boost_speed_and_decay_bounded_at_zero() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(1000.0, 1000.0), 0.0, now, false);
        {
            let p = world.player_mut(id).unwrap();
            p.boosting = true;
            p.score = 0.06;
        }
        step(&mut world, &config, now);
        let p = world.player(id).unwrap();
        assert!((p.position.x - (1000.0 + config.player.boost_speed)).abs() < 1e-3);
        assert!((p.score - 0.01).abs() < 1e-5);

        step(&mut world, &config, now);
        assert_eq!(world.player(id).unwrap().score, 0.0);
    }

    #[test]
    fn test_trail_bounded_by_retention() {
        let config = config();
        let mut now = Instant::now();
        let mut world = World::new(100_000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(500.0, 50_000.0), 0.0, now, false);

        for _ in 0..200 {
            now += TICK;
            step(&mut world, &config, now);
            let p = world.player(id).unwrap();
            assert!(p.trail.len() <= retention(p.score, &config.trail));
        }
        let p = world.player(id).unwrap();
        assert_eq!(p.trail.len(), config.trail.min_length);
        assert_eq!(p.trail.back().unwrap().position, p.position);
    }

    #[test]
    fn test_orb_at_head_is_collected() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(1000.0, 1000.0), 0.0, now, false);
        let head = Vec2::new(1000.0 + config.player.speed, 1000.0);
        world.orbs.push(Orb::ordinary(head, 1));
        world.orbs.push(Orb::bonus(head, 5));
        world.orbs.push(Orb::ordinary(Vec2::new(1500.0, 1500.0), 1));

        let outcome = step(&mut world, &config, now);
        assert!(outcome.orbs_changed);
        assert_eq!(outcome.scorer, Some((id, 6)));
        assert_eq!(world.player(id).unwrap().score, 6.0);
        assert_eq!(world.orbs.len(), 1);
    }

    #[test]
    fn test_replenish_restores_target() {
        let mut config = config();
        config.orbs.target = 50;
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let outcome = step(&mut world, &config, now);
        assert!(outcome.orbs_changed);
        assert_eq!(world.orbs.len(), 50);

        let outcome = step(&mut world, &config, now);
        assert!(!outcome.orbs_changed);
        assert_eq!(world.orbs.len(), 50);
    }

    #[test]
    fn test_edge_kills_only_when_vulnerable() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let shielded = spawn(&mut world, 1, Vec2::new(9.0, 500.0), PI, now, true);
        let exposed = spawn(&mut world, 2, Vec2::new(9.0, 1500.0), PI, now, false);

        let outcome = step(&mut world, &config, now);
        assert_eq!(outcome.deaths, vec![exposed]);

        let p = world.player(shielded).unwrap();
        assert!(p.alive);
        assert!(p.position.x >= p.hitbox(&config.player));
        assert!(!world.player(exposed).unwrap().alive);
    }

    #[test]
    fn test_death_reported_once_and_respawn_waits() {
        let mut config = config();
        config.player.respawn_delay_ms = 500;
        let start = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(5.0, 1000.0), PI, start, false);
        world.player_mut(id).unwrap().score = 10.0;

        let outcome = step(&mut world, &config, start);
        assert_eq!(outcome.deaths, vec![id]);
        assert!(world.orbs.iter().any(|o| o.bonus));
        let died_at = start;

        let mut now = start;
        let mut respawned_at = None;
        for _ in 0..40 {
            now += TICK;
            let outcome = step(&mut world, &config, now);
            assert!(outcome.deaths.is_empty());
            if outcome.respawns.contains(&id) {
                respawned_at = Some(now);
                break;
            }
        }
        let respawned_at = respawned_at.unwrap();
        assert!(respawned_at >= died_at + Duration::from_millis(500));
        assert!(respawned_at < died_at + Duration::from_millis(500) + TICK);

        let p = world.player(id).unwrap();
        assert!(p.alive);
        assert_eq!(p.score, 0.0);
        assert!(p.trail.is_empty());
        assert!(p.is_invulnerable(respawned_at));
    }

    #[test]
    fn test_dead_players_do_not_move() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(1000.0, 1000.0), 0.0, now, false);
        world.player_mut(id).unwrap().kill(now, Duration::from_secs(10));

        step(&mut world, &config, now);
        assert_eq!(world.player(id).unwrap().position, Vec2::new(1000.0, 1000.0));
    }

    #[test]
    fn test_kill_unknown_or_dead_is_noop() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        assert_eq!(kill(&mut world, PlayerId(99), &config, now), None);
        let id = spawn(&mut world, 1, Vec2::new(1000.0, 1000.0), 0.0, now, false);
        assert_eq!(kill(&mut world, id, &config, now), Some(0));
        assert_eq!(kill(&mut world, id, &config, now), None);
    }

    #[test]
    fn test_zero_score_death_leaves_orbs_unchanged() {
        let mut config = config();
        config.orbs.target = 10;
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        world.replenish_orbs(&config.orbs);
        let before = world.orbs.clone();
        let id = spawn(&mut world, 1, Vec2::new(9.0, 1000.0), PI, now, false);

        let outcome = step(&mut world, &config, now);
        assert_eq!(outcome.deaths, vec![id]);
        assert!(!outcome.orbs_changed);
        assert_eq!(world.orbs, before);
    }

    #[test]
    fn test_scoring_death_reports_orb_change() {
        let config = config();
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let id = spawn(&mut world, 1, Vec2::new(9.0, 1000.0), PI, now, false);
        world.player_mut(id).unwrap().score = 10.0;

        let outcome = step(&mut world, &config, now);
        assert_eq!(outcome.deaths, vec![id]);
        assert!(outcome.orbs_changed);
    }

    #[test]
    fn test_reset_respawns_everyone() {
        let mut config = config();
        config.orbs.target = 20;
        let now = Instant::now();
        let mut world = World::new(2000.0, Some(1));
        let a = spawn(&mut world, 1, Vec2::new(1000.0, 1000.0), 0.0, now, false);
        let b = spawn(&mut world, 2, Vec2::new(500.0, 500.0), 0.0, now, false);
        world.player_mut(a).unwrap().score = 40.0;
        kill(&mut world, b, &config, now);
        world.orbs.push(Orb::bonus(Vec2::splat(10.0), 5));

        reset(&mut world, &config, now);
        for id in [a, b] {
            let p = world.player(id).unwrap();
            assert!(p.alive);
            assert_eq!(p.score, 0.0);
            assert!(p.is_invulnerable(now));
        }
        assert_eq!(world.orbs.len(), 20);
        assert!(world.orbs.iter().all(|o| !o.bonus));
    }
}
