//! EntityStore: the client's view of the replicated world, keyed by
//! cluster-wide entity id.
//!
//! All mutation happens on the session's event loop; the store itself never
//! blocks or yields. Collaborators (rendering, UI bridge) observe changes
//! through the [`WorldEvent`] notification channel instead of reaching into
//! the map.

use crate::entity::Entity;
use log::debug;
use shared::{EntityId, EntityUpdate};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Notifications consumed by the rendering/UI collaborator.
#[derive(Debug, Clone)]
pub enum WorldEvent {
    EntityUpserted(Entity),
    EntityRemoved(EntityId),
    /// The local player exists for the first time this session.
    LocalPlayerReady(Entity),
    /// The active channel dropped; the held world view has been cleared.
    Disconnected,
}

pub struct EntityStore {
    entities: HashMap<EntityId, Entity>,
    events: mpsc::UnboundedSender<WorldEvent>,
}

impl EntityStore {
    pub fn new(events: mpsc::UnboundedSender<WorldEvent>) -> Self {
        Self {
            entities: HashMap::new(),
            events,
        }
    }

    /// Update-or-create: an update for an unknown id is a creation. The
    /// merge starts from either blank defaults or the currently stored
    /// value, never from any pre-removal snapshot.
    pub fn upsert(&mut self, update: &EntityUpdate) -> &Entity {
        let entity = self
            .entities
            .entry(update.id.clone())
            .or_insert_with(|| Entity::new(update.id.clone()));
        entity.apply(update);
        let _ = self.events.send(WorldEvent::EntityUpserted(entity.clone()));
        entity
    }

    /// Inserts a fully-formed entity, replacing any record under the same
    /// id. Used to seed the local player; emits no notification because the
    /// session announces the player through its own event.
    pub fn seed(&mut self, entity: Entity) -> &Entity {
        let id = entity.id.clone();
        self.entities.insert(id.clone(), entity);
        &self.entities[&id]
    }

    /// Removes an entity and notifies collaborators so attached resources
    /// (sprites) are released. Absence is a normal condition: removal
    /// events race with distance eviction.
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        match self.entities.remove(id) {
            Some(entity) => {
                let _ = self.events.send(WorldEvent::EntityRemoved(id.clone()));
                Some(entity)
            }
            None => {
                debug!("Entity not found: {}", id);
                None
            }
        }
    }

    pub fn by_id(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn by_id_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// Re-sends an upsert notification for an entity mutated in place.
    pub fn notify_upserted(&self, id: &EntityId) {
        if let Some(entity) = self.entities.get(id) {
            let _ = self.events.send(WorldEvent::EntityUpserted(entity.clone()));
        }
    }

    /// Removes every entity farther than `radius_squared` from `center`,
    /// except the exempt (local) entity. The comparison is strict, so an
    /// entity exactly on the boundary survives. Removals flow through
    /// [`EntityStore::remove`] so the removal path has one implementation.
    pub fn evict_beyond(
        &mut self,
        center: (f32, f32),
        radius_squared: f32,
        exempt: &EntityId,
    ) -> Vec<EntityId> {
        let evicted: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| {
                e.id != *exempt && e.distance_squared_to(center.0, center.1) > radius_squared
            })
            .map(|e| e.id.clone())
            .collect();

        for id in &evicted {
            self.remove(id);
        }
        evicted
    }

    /// Drops the whole world view, notifying collaborators per entity. Used
    /// on disconnect, when no staleness bound on missed events exists.
    pub fn clear(&mut self) {
        let ids: Vec<EntityId> = self.entities.keys().cloned().collect();
        for id in &ids {
            self.remove(id);
        }
    }

    /// Dead-reckoning tick: integrates velocity into position for every
    /// entity carrying one.
    pub fn advance(&mut self, dt_ms: f32) {
        for entity in self.entities.values_mut() {
            if let Some(velocity) = entity.velocity {
                entity.x += velocity.vx * dt_ms;
                entity.y += velocity.vy * dt_ms;
            }
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
