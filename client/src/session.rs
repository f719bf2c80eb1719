//! ReplicationSession: binds inbound wire events to store/player mutation
//! and outbound local intents to the active channel, re-binding itself to
//! whichever channel is active after each server handoff.

use crate::channel::{ChannelError, ChannelEvent, Subscription};
use crate::entity::Entity;
use crate::gc::GarbageCollector;
use crate::input::{steer, InputManager};
use crate::pool::ConnectionPool;
use crate::render::Renderer;
use crate::store::{EntityStore, WorldEvent};
use log::{info, warn};
use shared::{
    ClientEvent, EntityId, EntityUpdate, PlayerUpdate, ServerEndpoint, ServerEvent, MOVE_TICK_MS,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant};

/// Why the run loop returned control to the bootstrap layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The active channel dropped; the world view has been cleared.
    Disconnected,
    /// No channel is bound (connect was never called, or binding failed).
    ChannelGone,
}

pub struct ReplicationSession {
    pool: ConnectionPool,
    store: EntityStore,
    input: InputManager,
    gc: GarbageCollector,
    events: mpsc::UnboundedSender<WorldEvent>,
    renderer: Option<Renderer>,

    sub: Option<Subscription>,
    local_id: Option<EntityId>,
    auth_token: Option<String>,
    /// Presence has been announced on the current active channel. Gates
    /// every other outbound intent so `new-player` is always first.
    announced: bool,
}

impl ReplicationSession {
    pub fn new(
        pool: ConnectionPool,
        store: EntityStore,
        events: mpsc::UnboundedSender<WorldEvent>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            pool,
            store,
            input: InputManager::new(),
            gc: GarbageCollector::new(),
            events,
            renderer: None,
            sub: None,
            local_id: None,
            auth_token,
            announced: false,
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn local_id(&self) -> Option<&EntityId> {
        self.local_id.as_ref()
    }

    /// Resumes a previous identity, so the next announcement re-sends the
    /// known id instead of requesting a new player.
    pub fn set_local_id(&mut self, id: EntityId) {
        self.local_id = Some(id);
    }

    pub fn input_mut(&mut self) -> &mut InputManager {
        &mut self.input
    }

    /// Opens (or reuses) the channel to `endpoint`, makes it active and
    /// binds to it. The presence announcement follows the channel's
    /// `Connected` lifecycle event.
    pub fn connect(&mut self, endpoint: &ServerEndpoint) -> Result<(), ChannelError> {
        self.pool.connect(endpoint);
        self.sub = Some(self.pool.bind_active()?);
        self.announced = false;
        Ok(())
    }

    fn announce(&mut self) {
        let event = match &self.local_id {
            Some(id) => {
                info!("Switched to new socket server, sending id: {}", id);
                ClientEvent::NewPlayer {
                    id: Some(id.clone()),
                    auth_token: None,
                }
            }
            None => {
                info!("Connected to first socket server, sending new player request");
                ClientEvent::NewPlayer {
                    id: None,
                    auth_token: self.auth_token.clone(),
                }
            }
        };
        self.announced = true;
        self.emit(event);
    }

    fn emit(&self, event: ClientEvent) {
        if let Some(handle) = self.pool.active() {
            if let Err(e) = handle.emit(event) {
                warn!("Failed to emit on active channel: {}", e);
            }
        } else {
            warn!("No active channel to emit on");
        }
    }

    /// Dispatches one lifecycle or message event from the active channel.
    pub fn handle_channel_event(&mut self, event: ChannelEvent) -> Option<ExitReason> {
        match event {
            ChannelEvent::Connected => {
                self.announce();
                None
            }
            ChannelEvent::Disconnected => {
                self.on_disconnect();
                Some(ExitReason::Disconnected)
            }
            ChannelEvent::Message(event) => {
                self.handle_server_event(event);
                None
            }
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            // Aliases by contract: both are update-or-create
            ServerEvent::EntitySighted(update) | ServerEvent::EntityUpdated(update) => {
                self.on_entity_update(update)
            }
            ServerEvent::PlayerUpdated(update) => self.on_player_update(update),
            ServerEvent::EntityRemoved { id } => {
                self.store.remove(&id);
            }
            ServerEvent::OnDeckUpdated { servers } => self.pool.prepare_on_deck(&servers),
            ServerEvent::ServerHandoff { address, port } => {
                self.on_server_handoff(ServerEndpoint::new(address, port))
            }
        }
    }

    fn on_entity_update(&mut self, update: EntityUpdate) {
        // The authoritative channel for the local player is player-updated;
        // its broadcast echo on the generic entity channel is skipped so
        // stale self-reported state never overwrites server corrections.
        if self.local_id.as_deref() == Some(update.id.as_str()) {
            return;
        }
        self.store.upsert(&update);
    }

    fn on_player_update(&mut self, update: PlayerUpdate) {
        match self.local_id.clone() {
            None => self.seed_player(update),
            Some(id) if id == update.id => {
                let merged = match self.store.by_id_mut(&id) {
                    Some(player) => {
                        player.apply_player(&update);
                        true
                    }
                    None => false,
                };
                if merged {
                    self.store.notify_upserted(&id);
                } else {
                    warn!("Local player {} missing from store; reseeding", id);
                    self.seed_player(update);
                }
            }
            Some(old_id) => {
                // Authoritative identity change, valid only because it came
                // from the currently-active channel
                info!("Local player id changed from {} to {}", old_id, update.id);
                self.store.remove(&old_id);
                self.seed_player(update);
            }
        }
    }

    fn seed_player(&mut self, update: PlayerUpdate) {
        let mut player = Entity::new_player(update.id.clone());
        player.apply_player(&update);
        self.local_id = Some(update.id.clone());
        let snapshot = self.store.seed(player).clone();
        let _ = self.events.send(WorldEvent::LocalPlayerReady(snapshot));
    }

    fn on_server_handoff(&mut self, endpoint: ServerEndpoint) {
        info!(
            "Transferring session to {}:{}",
            endpoint.address, endpoint.port
        );
        let old_sub = self.sub.take();
        self.announced = false;
        match self.pool.handoff(&endpoint, old_sub) {
            Ok((sub, _promoted)) => {
                self.sub = Some(sub);
                // Announcement follows the new channel's Connected event,
                // already queued when a pre-warmed handle was promoted
            }
            Err(e) => warn!("Handoff to {} failed: {}", endpoint.canonical_url(), e),
        }
    }

    fn on_disconnect(&mut self) {
        info!("Disconnected from socket server");
        self.announced = false;
        self.store.clear();
        let _ = self.events.send(WorldEvent::Disconnected);
        // local_id is kept: reconnecting resumes the same identity
    }

    /// One movement tick: dead-reckon remote entities, steer the local
    /// player, and emit `move-player` iff something actually changed.
    pub fn tick_movement(&mut self, dt_ms: f32) {
        self.store.advance(dt_ms);

        let id = match self.local_id.clone() {
            Some(id) => id,
            None => return,
        };
        let keys = self.input.keys();
        let moved = match self.store.by_id_mut(&id) {
            Some(player) => {
                if steer(player, keys, dt_ms) {
                    Some((player.x, player.y, player.heading))
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some((x, y, heading)) = moved {
            if self.announced {
                self.emit(ClientEvent::MovePlayer { x, y, heading });
            }
        }
    }

    /// One relevance sweep.
    pub fn tick_gc(&mut self) {
        let removed = self.gc.sweep(&mut self.store, self.local_id.as_ref());
        if !removed.is_empty() {
            info!("Evicted {} entities out of view range", removed.len());
        }
    }

    /// Emits the primary action intent for a clicked entity.
    pub fn primary_action(&mut self, target_id: EntityId, x: f32, y: f32) {
        if !self.announced {
            return;
        }
        let action_id = self.input.selected_action();
        info!("Player primary action {} on {}", action_id, target_id);
        self.emit(ClientEvent::PrimaryAction {
            target_id,
            x,
            y,
            action_id,
        });
    }

    /// Receives and dispatches the next event from the active channel.
    /// Test seam for deterministic stepping; the run loop interleaves this
    /// with the periodic ticks.
    pub async fn process_next_event(&mut self) -> Option<ExitReason> {
        let mut sub = match self.sub.take() {
            Some(sub) => sub,
            None => return Some(ExitReason::ChannelGone),
        };
        let event = sub.recv().await;
        self.sub = Some(sub);
        match event {
            Some(event) => self.handle_channel_event(event),
            None => {
                warn!("Active channel stream ended");
                self.on_disconnect();
                Some(ExitReason::Disconnected)
            }
        }
    }

    /// Drives the session until the active channel is lost. All core
    /// mutation happens on this single task; event handlers run to
    /// completion before the next queued event is dispatched.
    pub async fn run(&mut self) -> ExitReason {
        let mut move_interval = interval(Duration::from_millis(MOVE_TICK_MS));
        let mut gc_interval = interval(self.gc.period());
        let mut render_interval = interval(Duration::from_millis(MOVE_TICK_MS));
        let mut last_move = Instant::now();

        loop {
            let mut sub = match self.sub.take() {
                Some(sub) => sub,
                None => return ExitReason::ChannelGone,
            };

            tokio::select! {
                event = sub.recv() => {
                    self.sub = Some(sub);
                    match event {
                        Some(event) => {
                            if let Some(reason) = self.handle_channel_event(event) {
                                return reason;
                            }
                        }
                        None => {
                            warn!("Active channel stream ended");
                            self.on_disconnect();
                            return ExitReason::Disconnected;
                        }
                    }
                },

                _ = move_interval.tick() => {
                    self.sub = Some(sub);
                    let now = Instant::now();
                    let dt_ms = now.duration_since(last_move).as_secs_f32() * 1000.0;
                    last_move = now;
                    self.tick_movement(dt_ms);
                },

                _ = gc_interval.tick() => {
                    self.sub = Some(sub);
                    self.tick_gc();
                },

                _ = render_interval.tick() => {
                    self.sub = Some(sub);
                    self.render_frame();
                },
            }
        }
    }

    fn render_frame(&mut self) {
        if self.renderer.is_none() {
            return;
        }
        let click = self.input.sample();
        let connected = self
            .pool
            .active()
            .map(|handle| handle.is_connected())
            .unwrap_or(false);

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(&self.store, self.local_id.as_ref(), connected);
            if let Some((screen_x, screen_y)) = click {
                if let Some((target_id, world_x, world_y)) =
                    renderer.pick(&self.store, self.local_id.as_ref(), screen_x, screen_y)
                {
                    self.primary_action(target_id, world_x, world_y);
                }
            }
        }
    }
}
