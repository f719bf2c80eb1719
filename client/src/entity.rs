//! Replicated entity records and the field-presence merge rule.
//!
//! There is no Entity/Player class hierarchy: the local player is an
//! ordinary [`Entity`] carrying an optional [`PlayerTunables`] capability
//! record. Which entity is "the" local player is decided by id equality in
//! the session, never by a type tag.

use shared::{EntityId, EntityUpdate, PlayerUpdate, DEFAULT_VIEW_DISTANCE_SQUARED};

/// Per-axis rate in world units per millisecond, used for dead-reckoning
/// between server pushes. Entities without one never coast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub vx: f32,
    pub vy: f32,
}

/// Synchronization-only attributes of the local player. The server sends
/// these to the player's owner and nobody else.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTunables {
    /// Linear speed, world units per millisecond.
    pub move_amount: f32,
    /// Angular speed, radians per millisecond.
    pub turn_amount: f32,
    /// Relevance radius, squared to skip the square root per comparison.
    pub view_distance_squared: f32,
}

impl Default for PlayerTunables {
    fn default() -> Self {
        Self {
            move_amount: 2.0,
            turn_amount: 0.04,
            view_distance_squared: DEFAULT_VIEW_DISTANCE_SQUARED,
        }
    }
}

/// One replicated world object as the client currently believes it to be.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub x: f32,
    pub y: f32,
    /// Orientation in radians; present only for steerable entities.
    pub heading: Option<f32>,
    pub velocity: Option<Velocity>,
    /// Draw order; not gameplay-relevant.
    pub layer: i32,
    /// Opaque presentation asset id, passed through to the renderer.
    pub graphic_id: u32,
    /// Present iff this entity is the locally-controlled player.
    pub player: Option<PlayerTunables>,
}

impl Entity {
    /// A blank entity as created on first sighting, before the payload
    /// merge is applied.
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            x: 0.0,
            y: 0.0,
            heading: None,
            velocity: None,
            layer: 0,
            graphic_id: 0,
            player: None,
        }
    }

    /// A blank local player, seeded with the defaults a fresh player spawns
    /// with before the server's first correction arrives.
    pub fn new_player(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            x: 100.0,
            y: 100.0,
            heading: Some(0.0),
            velocity: None,
            layer: 5,
            graphic_id: 1,
            player: Some(PlayerTunables::default()),
        }
    }

    pub fn is_player(&self) -> bool {
        self.player.is_some()
    }

    /// Field-presence merge: every field present in the payload overwrites,
    /// every absent field keeps its current value.
    pub fn apply(&mut self, update: &EntityUpdate) {
        if let Some(x) = update.x {
            self.x = x;
        }
        if let Some(y) = update.y {
            self.y = y;
        }
        if let Some(heading) = update.heading {
            self.heading = Some(heading);
        }
        if update.vx.is_some() || update.vy.is_some() {
            let current = self.velocity.unwrap_or(Velocity { vx: 0.0, vy: 0.0 });
            self.velocity = Some(Velocity {
                vx: update.vx.unwrap_or(current.vx),
                vy: update.vy.unwrap_or(current.vy),
            });
        }
        if let Some(graphic_id) = update.graphic_id {
            self.graphic_id = graphic_id;
        }
        if let Some(layer) = update.layer {
            self.layer = layer;
        }
    }

    /// Merge for the local player: entity fields plus tunables. Attaches
    /// the player capability when it is not present yet.
    pub fn apply_player(&mut self, update: &PlayerUpdate) {
        if let Some(x) = update.x {
            self.x = x;
        }
        if let Some(y) = update.y {
            self.y = y;
        }
        if let Some(heading) = update.heading {
            self.heading = Some(heading);
        }
        if let Some(graphic_id) = update.graphic_id {
            self.graphic_id = graphic_id;
        }
        if let Some(layer) = update.layer {
            self.layer = layer;
        }

        let tunables = self.player.get_or_insert_with(PlayerTunables::default);
        if let Some(move_amount) = update.move_amount {
            tunables.move_amount = move_amount;
        }
        if let Some(turn_amount) = update.turn_amount {
            tunables.turn_amount = turn_amount;
        }
        if let Some(view_distance_squared) = update.view_distance_squared {
            tunables.view_distance_squared = view_distance_squared;
        }
    }

    pub fn distance_squared_to(&self, x: f32, y: f32) -> f32 {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy
    }
}
