//! Relevance sweep: periodically prunes entities outside the local
//! player's view radius.
//!
//! Runs on its own fixed period rather than the movement tick; pruning is
//! not latency-sensitive. Evictions reuse the store's removal path, so
//! collaborators observe them exactly as if the server had sent
//! `entity-removed`.

use crate::store::EntityStore;
use shared::{EntityId, DEFAULT_VIEW_DISTANCE_SQUARED, GC_PERIOD_MS};
use std::time::Duration;

pub struct GarbageCollector {
    period: Duration,
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self {
            period: Duration::from_millis(GC_PERIOD_MS),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// One sweep. A no-op until the handshake has produced a local player.
    pub fn sweep(&self, store: &mut EntityStore, local_id: Option<&EntityId>) -> Vec<EntityId> {
        let local_id = match local_id {
            Some(id) => id,
            None => return Vec::new(),
        };
        let (center, radius_squared) = match store.by_id(local_id) {
            Some(player) => (
                (player.x, player.y),
                player
                    .player
                    .as_ref()
                    .map(|t| t.view_distance_squared)
                    .unwrap_or(DEFAULT_VIEW_DISTANCE_SQUARED),
            ),
            None => return Vec::new(),
        };
        store.evict_beyond(center, radius_squared, local_id)
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}
