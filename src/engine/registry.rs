use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::window_sync::{Bind, WindowSync};
use crate::desktop::{WindowAdapter, WindowError};
use crate::error::EngineError;
use crate::types::{Category, DespawnCause, EntityId, EntityKind, EntityView, Rect, Vec2};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BehaviorState {
    pub stunned_until_ms: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub rect: Rect,
    pub velocity: Vec2,
    pub health: Option<i32>,
    pub behavior: BehaviorState,
    pub expires_at_ms: Option<u64>,
}

impl Entity {
    pub fn new(id: EntityId, init: EntityInit) -> Self {
        Self {
            id,
            kind: init.kind,
            rect: init.rect,
            velocity: init.velocity,
            health: init.health,
            behavior: BehaviorState::default(),
            expires_at_ms: init.expires_at_ms,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.rect.center()
    }

    pub fn view(&self) -> EntityView {
        EntityView {
            id: self.id,
            kind: self.kind,
            rect: self.rect,
            velocity: self.velocity,
            health: self.health,
            expires_at_ms: self.expires_at_ms,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityInit {
    pub kind: EntityKind,
    pub rect: Rect,
    pub velocity: Vec2,
    pub health: Option<i32>,
    pub expires_at_ms: Option<u64>,
}

impl EntityInit {
    pub fn new(kind: EntityKind, rect: Rect) -> Self {
        Self {
            kind,
            rect,
            velocity: Vec2::ZERO,
            health: None,
            expires_at_ms: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Despawn {
    pub id: EntityId,
    pub kind: EntityKind,
    pub cause: DespawnCause,
}

/// What a commit changed, in the order it happened: destroys first.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub despawned: Vec<Despawn>,
    pub spawned: Vec<(EntityId, EntityKind)>,
    pub refused: Vec<(EntityKind, WindowError)>,
}

/// Authoritative set of live non-player entities. Mutations requested during
/// a tick are queued and only applied by [`EntityRegistry::commit`].
#[derive(Debug)]
pub struct EntityRegistry {
    live: BTreeMap<EntityId, Entity>,
    pending_creates: Vec<Entity>,
    pending_destroys: BTreeMap<EntityId, DespawnCause>,
    next_id: EntityId,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self {
            live: BTreeMap::new(),
            pending_creates: Vec::new(),
            pending_destroys: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Hands out an id without queuing anything; used for the player, whose
    /// window is created outside the queue.
    pub fn reserve_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn queue_create(&mut self, init: EntityInit) -> EntityId {
        let id = self.reserve_id();
        self.pending_creates.push(Entity::new(id, init));
        id
    }

    pub fn queue_destroy(&mut self, id: EntityId, cause: DespawnCause) -> Result<(), EngineError> {
        if self.pending_destroys.contains_key(&id) {
            return Err(EngineError::DoubleDestroy(id));
        }
        self.pending_destroys.insert(id, cause);
        Ok(())
    }

    pub fn is_pending_destroy(&self, id: EntityId) -> bool {
        self.pending_destroys.contains_key(&id)
    }

    /// Drops queued creates; their ids are never reused.
    pub fn cancel_pending_creates(&mut self) -> usize {
        let dropped = self.pending_creates.len();
        self.pending_creates.clear();
        dropped
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.live.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.live.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.live.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.live.values_mut()
    }

    pub fn iter_matching<'a, F>(&'a self, predicate: F) -> impl Iterator<Item = &'a Entity>
    where
        F: Fn(&Entity) -> bool + 'a,
    {
        self.live.values().filter(move |entity| predicate(entity))
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.live.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Live plus queued entities of a category. Entities waiting to be
    /// destroyed still count until the commit removes them.
    pub fn count(&self, category: Category) -> usize {
        let live = self
            .live
            .values()
            .filter(|entity| entity.kind.category() == Some(category))
            .count();
        let queued = self
            .pending_creates
            .iter()
            .filter(|entity| entity.kind.category() == Some(category))
            .count();
        live + queued
    }

    pub fn live_count(&self, category: Category) -> usize {
        self.live
            .values()
            .filter(|entity| entity.kind.category() == Some(category))
            .count()
    }

    /// Rectangles of everything live or queued, for spawn placement.
    pub fn occupied_rects(&self) -> Vec<Rect> {
        self.live
            .values()
            .chain(self.pending_creates.iter())
            .map(|entity| entity.rect)
            .collect()
    }

    pub fn commit(
        &mut self,
        sync: &mut WindowSync,
        desktop: &mut dyn WindowAdapter,
    ) -> Result<CommitReport, EngineError> {
        let mut report = CommitReport::default();

        for (id, cause) in std::mem::take(&mut self.pending_destroys) {
            let Some(entity) = self.live.remove(&id) else {
                warn!(id, ?cause, "destroy requested for unknown entity");
                continue;
            };
            sync.destroy(id, desktop);
            debug!(id, kind = ?entity.kind, ?cause, "entity despawned");
            report.despawned.push(Despawn {
                id,
                kind: entity.kind,
                cause,
            });
        }

        for entity in std::mem::take(&mut self.pending_creates) {
            if self.live.contains_key(&entity.id) {
                return Err(EngineError::DuplicateId(entity.id));
            }
            match sync.create(&entity, desktop)? {
                Bind::Bound(handle) => {
                    debug!(id = entity.id, kind = ?entity.kind, ?handle, "entity spawned");
                    report.spawned.push((entity.id, entity.kind));
                    self.live.insert(entity.id, entity);
                }
                Bind::Refused(error) => {
                    warn!(id = entity.id, kind = ?entity.kind, %error, "window creation failed; spawn skipped");
                    report.refused.push((entity.kind, error));
                }
            }
        }

        Ok(report)
    }
}
