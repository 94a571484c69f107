//! Game state and main loop.
//!
//! A single task owns [`GameState`]. Connection tasks feed it [`Event`]s and
//! the scheduler decides when ticks, snapshots, pings and liveness checks
//! run, so message handling and ticks never interleave.

use super::connection::{ConnectionHandle, ConnectionId, Outbound};
use super::registry::{self, MAX_CHAT_LENGTH, Registry};
use crate::config::Config;
use crate::entity::{Player, PlayerId};
use crate::scheduler::Scheduler;
use crate::simulation::{self, TickOutcome};
use crate::sync::SyncTracker;
use crate::world::World;
use bytes::Bytes;
use protocol::frame;
use protocol::messages::{AdminAction, ClientMessage, JoinRequest, RejectReason, ServerMessage};
use rand::seq::IndexedRandom;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How often unanswered pings are checked.
const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Periodic work run by the game task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Tick,
    Snapshot,
    Heartbeat,
    Liveness,
}

/// Input from connection tasks.
#[derive(Debug)]
pub enum Event {
    /// Handshake completed.
    Connected {
        id: ConnectionId,
        addr: SocketAddr,
        tx: mpsc::Sender<Outbound>,
    },
    /// One text frame.
    Message { id: ConnectionId, text: String },
    /// Ping frame to be answered with the same payload.
    Ping { id: ConnectionId, payload: Bytes },
    /// Pong or any other frame that only proves the peer is alive.
    Pong { id: ConnectionId },
    /// Socket closed, failed or sent a close frame.
    Disconnected { id: ConnectionId },
}

/// Main game state.
pub struct GameState {
    pub config: Config,
    pub world: World,
    pub registry: Registry,
    sync: SyncTracker,
    scheduler: Scheduler<Task>,
}

impl GameState {
    /// Build the world, seed the orb field and schedule periodic tasks from `now`.
    pub fn new(config: Config, now: Instant) -> Self {
        let mut world = World::new(config.arena.size, config.server.seed);
        world.replenish_orbs(&config.orbs);
        info!(
            "World initialized: {}x{} arena, {} orbs",
            world.arena_size,
            world.arena_size,
            world.orbs.len()
        );

        let mut scheduler = Scheduler::new();
        scheduler.every(
            Task::Tick,
            Duration::from_millis(config.server.tick_interval_ms),
            now,
        );
        scheduler.every(
            Task::Snapshot,
            Duration::from_millis(config.server.snapshot_interval_ms),
            now,
        );
        scheduler.every(
            Task::Heartbeat,
            Duration::from_secs(config.server.heartbeat_interval_secs),
            now,
        );
        if config.server.close_unresponsive {
            scheduler.every(Task::Liveness, LIVENESS_CHECK_INTERVAL, now);
        }

        Self {
            registry: Registry::new(&config.player.names),
            config,
            world,
            sync: SyncTracker::new(),
            scheduler,
        }
    }

    /// Earliest instant at which [`GameState::run_due`] has work.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Apply one event from a connection task.
    pub fn handle_event(&mut self, event: Event, now: Instant) {
        match event {
            Event::Connected { id, addr, tx } => self.connect(id, addr, tx, now),
            Event::Message { id, text } => {
                self.touch(id, now);
                self.dispatch(id, &text, now);
            }
            Event::Ping { id, payload } => {
                self.touch(id, now);
                self.registry.send_frame(id, frame::pong(&payload));
            }
            Event::Pong { id } => self.touch(id, now),
            Event::Disconnected { id } => self.disconnect(id),
        }
        self.reap();
    }

    /// Run every scheduled task that is due at `now`.
    pub fn run_due(&mut self, now: Instant) {
        for task in self.scheduler.due(now) {
            match task {
                Task::Tick => self.tick(now),
                Task::Snapshot => self.snapshot(now),
                Task::Heartbeat => self.heartbeat(now),
                Task::Liveness => self.check_liveness(now),
            }
        }
        self.reap();
    }

    fn touch(&mut self, id: ConnectionId, now: Instant) {
        if let Some(handle) = self.registry.get_mut(id) {
            handle.touch(now);
        }
    }

    /// Register a connection and greet it with the current arena.
    pub fn connect(
        &mut self,
        id: ConnectionId,
        addr: SocketAddr,
        tx: mpsc::Sender<Outbound>,
        now: Instant,
    ) {
        self.registry.insert(ConnectionHandle::new(id, addr, tx, now));
        info!("Connection {} opened from {}", id, addr);

        let hello = ServerMessage::Hello {
            arena_size: self.world.arena_size,
            orbs: self.world.orb_views(),
            config: self.config.tuning(),
            players: self.world.player_views(&self.config.player, now),
        };
        self.registry.send(id, &hello);
    }

    /// Unregister a connection and remove its player. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: ConnectionId) {
        let Some(handle) = self.registry.remove(id) else {
            return;
        };
        handle.close();

        if let Some(name) = handle.pool_name {
            self.registry.names.release(name);
        }
        match handle.player {
            Some(player_id) => {
                if let Some(player) = self.world.remove_player(player_id) {
                    info!("Player {} ({}) left from {}", player.name, player_id, handle.addr);
                }
                self.sync.forget(player_id);
                self.registry.broadcast(&ServerMessage::Despawn {
                    id: player_id.to_string(),
                });
            }
            None => info!("Connection {} from {} closed", id, handle.addr),
        }
    }

    /// Disconnect every connection whose outbound queue rejected a frame.
    fn reap(&mut self) {
        loop {
            let stale = self.registry.take_stale();
            if stale.is_empty() {
                break;
            }
            for id in stale {
                warn!("Connection {} is not keeping up, closing", id);
                self.disconnect(id);
            }
        }
    }

    /// Parse and route one application message.
    pub fn dispatch(&mut self, id: ConnectionId, text: &str, now: Instant) {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring message from connection {}: {}", id, e);
                return;
            }
        };

        match message {
            ClientMessage::Join(request) => self.join(id, request, false, now),
            ClientMessage::Auto(request) => self.join(id, request, true, now),
            ClientMessage::Input { angle, boost } => self.input(id, angle, boost),
            ClientMessage::Admin { action } => self.admin(action, now),
            ClientMessage::Chat { text } => self.chat(id, &text),
        }
    }

    fn join(&mut self, id: ConnectionId, request: JoinRequest, auto: bool, now: Instant) {
        let Some(handle) = self.registry.get(id) else {
            return;
        };
        if handle.player.is_some() {
            debug!("Connection {} already owns a player, ignoring join", id);
            return;
        }
        let addr = handle.addr;

        if self.world.players.len() >= self.config.server.max_players {
            info!("Rejecting join from {}: server full", addr);
            self.registry.send(
                id,
                &ServerMessage::Reject {
                    reason: RejectReason::Full,
                },
            );
            return;
        }

        let requested = if auto {
            String::new()
        } else {
            registry::sanitize_text(
                request.name.as_deref().unwrap_or_default(),
                self.config.player.max_name_length,
            )
        };
        let (name, pool_name) = if requested.is_empty() {
            match self.registry.names.take(self.world.rng()) {
                Some(name) => (name.clone(), Some(name)),
                None => (registry::generated_name(self.world.rng()), None),
            }
        } else {
            (requested, None)
        };

        let avatars = &self.config.player.avatars;
        let avatar = match request.avatar {
            Some(avatar) if avatars.contains(&avatar) => avatar,
            _ => avatars
                .choose(self.world.rng())
                .cloned()
                .unwrap_or_else(|| "packet".to_string()),
        };
        let host = registry::sanitize_host(request.host.as_deref());

        let player_id = self.world.next_player_id();
        let position = self.world.random_position(self.config.arena.spawn_margin);
        let heading = self.world.random_heading();
        let player = Player::new(
            player_id,
            name,
            avatar,
            host,
            position,
            heading,
            now,
            Duration::from_millis(self.config.player.invulnerability_ms),
        );
        let view = player.view(&self.config.player, now);
        info!("Player {} ({}) joined from {}", player.name, player_id, addr);
        self.world.add_player(player);

        if let Some(handle) = self.registry.get_mut(id) {
            handle.player = Some(player_id);
            handle.pool_name = pool_name;
        }

        let welcome = ServerMessage::Welcome {
            id: player_id.to_string(),
            arena_size: self.world.arena_size,
            players: self.world.player_views(&self.config.player, now),
            orbs: self.world.orb_views(),
            config: self.config.tuning(),
        };
        self.registry.send(id, &welcome);
        self.registry.broadcast(&ServerMessage::Spawn { player: view });
    }

    fn player_of(&self, id: ConnectionId) -> Option<PlayerId> {
        self.registry.get(id).and_then(|handle| handle.player)
    }

    fn input(&mut self, id: ConnectionId, angle: Option<f32>, boost: Option<bool>) {
        let Some(player_id) = self.player_of(id) else {
            return;
        };
        let Some(player) = self.world.player_mut(player_id) else {
            return;
        };
        if let Some(angle) = angle.filter(|a| a.is_finite()) {
            player.heading = angle;
        }
        if let Some(boost) = boost {
            player.boosting = boost && player.alive;
        }
    }

    fn admin(&mut self, action: AdminAction, now: Instant) {
        match action {
            AdminAction::Reset => {
                simulation::reset(&mut self.world, &self.config, now);
                info!("Arena reset: {} players respawned", self.world.players.len());
                let reset = ServerMessage::Reset {
                    players: self.world.player_views(&self.config.player, now),
                    orbs: self.world.orb_views(),
                    arena_size: self.world.arena_size,
                };
                self.registry.broadcast(&reset);
            }
            AdminAction::Unknown => debug!("Ignoring unknown admin action"),
        }
    }

    fn chat(&mut self, id: ConnectionId, text: &str) {
        let Some(player_id) = self.player_of(id) else {
            return;
        };
        let Some(player) = self.world.player(player_id) else {
            return;
        };
        let text = registry::sanitize_text(text, MAX_CHAT_LENGTH);
        if text.is_empty() {
            return;
        }
        let chat = ServerMessage::Chat {
            id: player_id.to_string(),
            name: player.name.clone(),
            text,
        };
        self.registry.broadcast(&chat);
    }

    /// Advance the simulation and broadcast what changed.
    pub fn tick(&mut self, now: Instant) {
        let started = Instant::now();
        let outcome = simulation::step(&mut self.world, &self.config, now);
        self.broadcast_outcome(outcome, now);

        let elapsed = started.elapsed();
        let budget = Duration::from_millis(self.config.server.tick_interval_ms).mul_f64(0.9);
        if elapsed > budget {
            warn!(
                "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} players, {} orbs",
                self.world.tick,
                elapsed.as_secs_f64() * 1000.0,
                budget.as_secs_f64() * 1000.0,
                self.world.players.len(),
                self.world.orbs.len()
            );
        }
    }

    fn broadcast_outcome(&mut self, outcome: TickOutcome, now: Instant) {
        for id in &outcome.deaths {
            info!("Player {} died", id);
            self.registry.broadcast(&ServerMessage::Death { id: id.to_string() });
        }

        for id in &outcome.respawns {
            if let Some(player) = self.world.player(*id) {
                let view = player.view(&self.config.player, now);
                self.registry.broadcast(&ServerMessage::Spawn { player: view });
            }
        }

        if outcome.orbs_changed {
            let (id, score) = match outcome.scorer {
                Some((id, score)) => (Some(id.to_string()), Some(score)),
                None => (None, None),
            };
            self.registry.broadcast(&ServerMessage::Orbs {
                orbs: self.world.orb_views(),
                id,
                score,
            });
        }

        if let Some(delta) = self.sync.delta(&self.world, &self.config) {
            self.registry.broadcast(&delta);
        }
    }

    /// Broadcast a full `state` snapshot.
    pub fn snapshot(&mut self, now: Instant) {
        let state = self.sync.snapshot(&self.world, &self.config, now);
        self.registry.broadcast(&state);
    }

    /// Ping every connection.
    pub fn heartbeat(&mut self, now: Instant) {
        self.registry.broadcast_frame(frame::ping());
        for handle in self.registry.handles_mut() {
            handle.mark_pinged(now);
        }
    }

    /// Close connections that stayed silent after a ping.
    pub fn check_liveness(&mut self, now: Instant) {
        let timeout = Duration::from_secs(self.config.server.pong_timeout_secs);
        let silent: Vec<ConnectionId> = self
            .registry
            .handles()
            .filter(|handle| handle.is_unresponsive(now, timeout))
            .map(|handle| handle.id)
            .collect();
        for id in silent {
            info!("Connection {} did not answer ping, closing", id);
            self.disconnect(id);
        }
    }
}

/// Run the game loop until every event sender is gone.
pub async fn run_game_loop(mut game: GameState, mut events: mpsc::Receiver<Event>) {
    loop {
        let deadline = game
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(1));

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => game.handle_event(event, Instant::now()),
                None => {
                    info!("Event channel closed, stopping game loop");
                    break;
                }
            },
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                game.run_due(Instant::now());
            }
        }
    }
}
