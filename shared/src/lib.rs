//! Wire protocol shared between the zone client and the zone servers
//! (and the stub servers used in tests).
//!
//! One channel is a reliable, ordered, bidirectional event stream to one
//! server. Payloads use `Option` per merge-relevant field so servers can
//! send small deltas; absent fields never touch stored state on the client.

use serde::{Deserialize, Serialize};

/// Servers advertise their internal port; the externally reachable game
/// socket listens at `advertised port + GAME_PORT_OFFSET`.
pub const GAME_PORT_OFFSET: u16 = 8000;

/// Fixed period of the local movement/dead-reckoning tick.
pub const MOVE_TICK_MS: u64 = 16;

/// Fixed period of the relevance garbage-collector sweep.
pub const GC_PERIOD_MS: u64 = 1000;

/// Fallback relevance radius used until the server pushes
/// `view_distance_squared` for the local player.
pub const DEFAULT_VIEW_DISTANCE: f32 = 2000.0;
pub const DEFAULT_VIEW_DISTANCE_SQUARED: f32 = DEFAULT_VIEW_DISTANCE * DEFAULT_VIEW_DISTANCE;

/// Hard cap on a single wire frame; anything larger is a protocol error.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Cluster-wide unique entity identifier, stable across server handoffs.
/// Servers mint these; the client treats them as opaque.
pub type EntityId = String;

/// One server address as advertised over the wire.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    pub address: String,
    pub port: u16,
}

impl ServerEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Port of the actual game socket for this endpoint.
    pub fn game_port(&self) -> u16 {
        self.port.saturating_add(GAME_PORT_OFFSET)
    }

    /// Canonical URL keying the on-deck registry. Two advertisements of the
    /// same server always canonicalize identically.
    pub fn canonical_url(&self) -> String {
        format!("tcp://{}:{}", self.address, self.game_port())
    }
}

/// Partial entity state. Fields left `None` are untouched by the merge.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EntityUpdate {
    pub id: EntityId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub heading: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub graphic_id: Option<u32>,
    pub layer: Option<i32>,
}

impl EntityUpdate {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            heading: None,
            vx: None,
            vy: None,
            graphic_id: None,
            layer: None,
        }
    }
}

/// Partial local-player state: entity fields plus the synchronization-only
/// tunables the server sends to the player's owner and nobody else.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerUpdate {
    pub id: EntityId,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub heading: Option<f32>,
    pub graphic_id: Option<u32>,
    pub layer: Option<i32>,
    pub move_amount: Option<f32>,
    pub turn_amount: Option<f32>,
    pub view_distance_squared: Option<f32>,
}

impl PlayerUpdate {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            heading: None,
            graphic_id: None,
            layer: None,
            move_amount: None,
            turn_amount: None,
            view_distance_squared: None,
        }
    }
}

/// Events pushed by a server over one channel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ServerEvent {
    /// First sighting of an entity. By contract an alias of `EntityUpdated`:
    /// the client applies update-or-create semantics to both.
    EntitySighted(EntityUpdate),
    EntityUpdated(EntityUpdate),
    /// Authoritative correction for the local player, sent only to its owner.
    PlayerUpdated(PlayerUpdate),
    EntityRemoved {
        id: EntityId,
    },
    /// Full authoritative set of nearby handoff candidates.
    OnDeckUpdated {
        servers: Vec<ServerEndpoint>,
    },
    /// Order to migrate the session to another server.
    ServerHandoff {
        address: String,
        port: u16,
    },
}

/// Intents emitted by the client on the active channel.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum ClientEvent {
    /// Presence announcement. `id` is `None` on the very first connect, in
    /// which case the auth token must be present; on every later connect
    /// (reconnect, handoff) the known id is re-sent. Servers tolerate
    /// receiving it twice.
    NewPlayer {
        id: Option<EntityId>,
        auth_token: Option<String>,
    },
    MovePlayer {
        x: f32,
        y: f32,
        heading: Option<f32>,
    },
    PrimaryAction {
        target_id: EntityId,
        x: f32,
        y: f32,
        action_id: u32,
    },
}

/// Encodes one event as a length-prefixed frame (u32 LE length + bincode
/// body) ready to be written to a stream.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    let body = bincode::serialize(value)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}
