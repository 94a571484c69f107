//! Server configuration.

use protocol::messages::TuningView;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub trail: TrailConfig,
    #[serde(default)]
    pub collision: CollisionConfig,
    #[serde(default)]
    pub orbs: OrbConfig,
}

impl Config {
    /// Load configuration from `path`, writing a default file if it is missing.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            Ok(default_config)
        }
    }

    /// Ticks per second implied by the tick interval.
    pub fn tick_rate(&self) -> u32 {
        (1000.0 / self.server.tick_interval_ms.max(1) as f64).round() as u32
    }

    /// Tuning values sent to clients in `hello`, `welcome` and `state`.
    pub fn tuning(&self) -> TuningView {
        TuningView {
            tick_rate: self.tick_rate(),
            speed: self.player.speed,
            boost_speed: self.player.boost_speed,
            respawn_delay_ms: self.player.respawn_delay_ms,
            invulnerability_ms: self.player.invulnerability_ms,
            max_players: self.server.max_players,
            orb_value: self.orbs.value,
            bonus_orb_value: self.orbs.bonus_value,
            orb_radius: self.orbs.radius,
            trail_width: self.trail.width_factor,
            self_collision: self.collision.self_collision,
        }
    }
}

/// Server networking and scheduling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum open connections (players and spectators).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Maximum joined players.
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Full snapshot interval in milliseconds.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_ms: u64,
    /// Ping interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Close connections that stay silent after a ping.
    #[serde(default = "default_close_unresponsive")]
    pub close_unresponsive: bool,
    /// Seconds a pinged connection has to show a sign of life.
    #[serde(default = "default_pong_timeout")]
    pub pong_timeout_secs: u64,
    /// Largest accepted frame payload.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Largest accepted upgrade request head.
    #[serde(default = "default_max_handshake_bytes")]
    pub max_handshake_bytes: usize,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            max_players: default_max_players(),
            tick_interval_ms: default_tick_interval(),
            snapshot_interval_ms: default_snapshot_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            close_unresponsive: default_close_unresponsive(),
            pong_timeout_secs: default_pong_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
            max_handshake_bytes: default_max_handshake_bytes(),
            seed: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    64
}
fn default_ip_limit() -> usize {
    16
}
fn default_max_players() -> usize {
    16
}
fn default_tick_interval() -> u64 {
    33
}
fn default_snapshot_interval() -> u64 {
    1000
}
fn default_heartbeat_interval() -> u64 {
    15
}
fn default_close_unresponsive() -> bool {
    true
}
fn default_pong_timeout() -> u64 {
    10
}
fn default_max_frame_bytes() -> usize {
    64 * 1024
}
fn default_max_handshake_bytes() -> usize {
    8 * 1024
}

/// Arena configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArenaConfig {
    /// Side length of the square arena.
    #[serde(default = "default_arena_size")]
    pub size: f32,
    /// Distance from the edges kept free when placing players.
    #[serde(default = "default_spawn_margin")]
    pub spawn_margin: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            size: default_arena_size(),
            spawn_margin: default_spawn_margin(),
        }
    }
}

fn default_arena_size() -> f32 {
    2000.0
}
fn default_spawn_margin() -> f32 {
    100.0
}

/// Player movement, size and lifecycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_speed")]
    pub speed: f32,
    #[serde(default = "default_player_boost_speed")]
    pub boost_speed: f32,
    /// Score lost per tick while boosting.
    #[serde(default = "default_player_boost_decay")]
    pub boost_decay: f32,
    #[serde(default = "default_player_base_radius")]
    pub base_radius: f32,
    /// Hitbox growth per square root of score.
    #[serde(default = "default_player_radius_growth")]
    pub radius_growth: f32,
    #[serde(default = "default_player_max_radius")]
    pub max_radius: f32,
    #[serde(default = "default_player_respawn_delay")]
    pub respawn_delay_ms: u64,
    #[serde(default = "default_player_invulnerability")]
    pub invulnerability_ms: u64,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Pool of names handed out to `auto` joins.
    #[serde(default = "default_player_names")]
    pub names: Vec<String>,
    /// Accepted avatar symbols.
    #[serde(default = "default_player_avatars")]
    pub avatars: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: default_player_speed(),
            boost_speed: default_player_boost_speed(),
            boost_decay: default_player_boost_decay(),
            base_radius: default_player_base_radius(),
            radius_growth: default_player_radius_growth(),
            max_radius: default_player_max_radius(),
            respawn_delay_ms: default_player_respawn_delay(),
            invulnerability_ms: default_player_invulnerability(),
            max_name_length: default_max_name_length(),
            names: default_player_names(),
            avatars: default_player_avatars(),
        }
    }
}

fn default_player_speed() -> f32 {
    3.0
}
fn default_player_boost_speed() -> f32 {
    5.5
}
fn default_player_boost_decay() -> f32 {
    0.05
}
fn default_player_base_radius() -> f32 {
    8.0
}
fn default_player_radius_growth() -> f32 {
    0.6
}
fn default_player_max_radius() -> f32 {
    28.0
}
fn default_player_respawn_delay() -> u64 {
    2000
}
fn default_player_invulnerability() -> u64 {
    1500
}
fn default_max_name_length() -> usize {
    16
}
fn default_player_names() -> Vec<String> {
    [
        "Ping", "Packet", "Router", "Switch", "Subnet", "Gateway", "Socket", "Proxy", "Bridge",
        "Relay", "Beacon", "Frame", "Hub", "Node", "Latency", "Jitter",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_player_avatars() -> Vec<String> {
    ["cat", "robot", "packet"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Trail retention and width.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrailConfig {
    /// Retained points at score 0.
    #[serde(default = "default_trail_base_length")]
    pub base_length: usize,
    /// Extra retained points per point of score.
    #[serde(default = "default_trail_length_per_point")]
    pub length_per_point: f32,
    /// Floor for retention.
    #[serde(default = "default_trail_min_length")]
    pub min_length: usize,
    /// Ceiling for retention.
    #[serde(default = "default_trail_max_length")]
    pub max_length: usize,
    /// Half width of the trail as a fraction of the hitbox radius.
    #[serde(default = "default_trail_width_factor")]
    pub width_factor: f32,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            base_length: default_trail_base_length(),
            length_per_point: default_trail_length_per_point(),
            min_length: default_trail_min_length(),
            max_length: default_trail_max_length(),
            width_factor: default_trail_width_factor(),
        }
    }
}

fn default_trail_base_length() -> usize {
    30
}
fn default_trail_length_per_point() -> f32 {
    2.0
}
fn default_trail_min_length() -> usize {
    30
}
fn default_trail_max_length() -> usize {
    400
}
fn default_trail_width_factor() -> f32 {
    0.4
}

/// Trail hit-test sampling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollisionConfig {
    /// Test a player's head against its own trail.
    #[serde(default)]
    pub self_collision: bool,
    /// Sample stride in units of trail half width per step length.
    #[serde(default = "default_sample_spacing")]
    pub sample_spacing: f32,
    /// Samples tested on a score 0 trail.
    #[serde(default = "default_samples_base")]
    pub samples_base: usize,
    /// Extra samples per point of the trail owner's score.
    #[serde(default = "default_samples_per_point")]
    pub samples_per_point: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            self_collision: false,
            sample_spacing: default_sample_spacing(),
            samples_base: default_samples_base(),
            samples_per_point: default_samples_per_point(),
        }
    }
}

fn default_sample_spacing() -> f32 {
    1.0
}
fn default_samples_base() -> usize {
    40
}
fn default_samples_per_point() -> f32 {
    2.0
}

/// Orb economy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrbConfig {
    /// Population maintained by replenishment.
    #[serde(default = "default_orb_target")]
    pub target: usize,
    #[serde(default = "default_orb_value")]
    pub value: u32,
    #[serde(default = "default_orb_bonus_value")]
    pub bonus_value: u32,
    #[serde(default = "default_orb_radius")]
    pub radius: f32,
    /// Distance from the edges kept free when placing orbs.
    #[serde(default = "default_orb_margin")]
    pub margin: f32,
    /// Bonus orbs dropped per point of the victim's score.
    #[serde(default = "default_orb_bonus_per_point")]
    pub bonus_per_point: f32,
    #[serde(default = "default_orb_max_bonus")]
    pub max_bonus_per_death: usize,
    /// Gap between the victim's hitbox and the bonus ring.
    #[serde(default = "default_orb_ring_spacing")]
    pub ring_spacing: f32,
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            target: default_orb_target(),
            value: default_orb_value(),
            bonus_value: default_orb_bonus_value(),
            radius: default_orb_radius(),
            margin: default_orb_margin(),
            bonus_per_point: default_orb_bonus_per_point(),
            max_bonus_per_death: default_orb_max_bonus(),
            ring_spacing: default_orb_ring_spacing(),
        }
    }
}

fn default_orb_target() -> usize {
    150
}
fn default_orb_value() -> u32 {
    1
}
fn default_orb_bonus_value() -> u32 {
    5
}
fn default_orb_radius() -> f32 {
    4.0
}
fn default_orb_margin() -> f32 {
    20.0
}
fn default_orb_bonus_per_point() -> f32 {
    0.5
}
fn default_orb_max_bonus() -> usize {
    30
}
fn default_orb_ring_spacing() -> f32 {
    20.0
}
