//! Entity registry: identity, liveness and archetype tags.
//!
//! The registry is consulted by every component write to validate the target
//! entity. Writers run their row mutation while holding the entity's entry
//! *read* guard ([`EntityRegistry::with_live`]); destruction flips the entry
//! to dead and purges rows while holding its *write* guard
//! ([`EntityRegistry::destroy_with`]). A write therefore either lands before
//! the purge (and is purged) or sees the entity dead, never in between.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use engine_component::{Entity, EntityAllocator};
use serde::{Deserialize, Serialize};

/// Registry entry for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Archetype the entity was created from, if any. Advisory only.
    pub archetype: Option<String>,
    /// `false` once destruction has started.
    pub alive: bool,
}

/// Tracks which entities exist.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    allocator: EntityAllocator,
    entries: DashMap<Entity, EntityRecord>,
    by_archetype: DashMap<String, HashSet<Entity>>,
    destroyed: AtomicU64,
}

impl EntityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh entity and mark it alive.
    pub fn create(&self, archetype: Option<&str>) -> Entity {
        let entity = self.allocator.allocate();
        self.insert_live(entity, archetype.map(str::to_string));
        entity
    }

    fn insert_live(&self, entity: Entity, archetype: Option<String>) {
        if let Some(name) = &archetype {
            self.by_archetype
                .entry(name.clone())
                .or_default()
                .insert(entity);
        }
        self.entries.insert(
            entity,
            EntityRecord {
                archetype,
                alive: true,
            },
        );
    }

    /// Returns `true` if `entity` exists and is not being destroyed.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entries.get(&entity).is_some_and(|r| r.alive)
    }

    /// Run `f` while `entity` is guaranteed to stay alive.
    ///
    /// Returns `None` without calling `f` if the entity is unknown or dead.
    /// `f` must not call back into the registry.
    pub fn with_live<R>(&self, entity: Entity, f: impl FnOnce(&EntityRecord) -> R) -> Option<R> {
        let record = self.entries.get(&entity)?;
        if !record.alive {
            return None;
        }
        Some(f(record.value()))
    }

    /// Mark `entity` dead, run `purge` while no writer can touch it, then
    /// drop its entry.
    ///
    /// Returns the removed record, or `None` if the entity was unknown or
    /// already dead (in which case `purge` is not called).
    pub fn destroy_with(&self, entity: Entity, purge: impl FnOnce()) -> Option<EntityRecord> {
        {
            let mut record = self.entries.get_mut(&entity)?;
            if !record.alive {
                return None;
            }
            record.alive = false;
            purge();
        }
        let (_, record) = self.entries.remove(&entity)?;
        if let Some(name) = &record.archetype
            && let Some(mut members) = self.by_archetype.get_mut(name)
        {
            members.remove(&entity);
        }
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        Some(record)
    }

    /// Returns the archetype tag of a live entity.
    #[must_use]
    pub fn archetype_of(&self, entity: Entity) -> Option<Option<String>> {
        self.with_live(entity, |r| r.archetype.clone())
    }

    /// Live entities tagged with `archetype`, sorted by ID.
    #[must_use]
    pub fn by_archetype(&self, archetype: &str) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .by_archetype
            .get(archetype)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        entities.retain(|&e| self.is_alive(e));
        entities.sort_unstable();
        entities
    }

    /// All live entities with their archetype tags, sorted by ID.
    #[must_use]
    pub fn live_entries(&self) -> Vec<(Entity, Option<String>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|r| r.alive)
            .map(|r| (*r.key(), r.archetype.clone()))
            .collect();
        entries.sort_unstable_by_key(|(e, _)| *e);
        entries
    }

    /// Number of live entities.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of entities ever created by this registry's allocator.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.allocator.count()
    }

    /// Number of entities destroyed since this registry was built.
    #[must_use]
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// The ID the next created entity will receive.
    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.allocator.peek_next()
    }

    /// Replace every entry with `entries`, as read from a snapshot.
    ///
    /// The allocator only moves forward, so IDs handed out before the restore
    /// are never reissued.
    pub fn replace(&self, entries: Vec<(Entity, Option<String>)>, next_id: u64) {
        self.entries.clear();
        self.by_archetype.clear();
        let mut highest = 0;
        for (entity, archetype) in entries {
            highest = highest.max(entity.id());
            self.insert_live(entity, archetype);
        }
        self.allocator.advance_to(next_id.max(highest.saturating_add(1)));
    }
}
