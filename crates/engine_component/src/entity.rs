//! Entity type and allocation utilities.
//!
//! An [`Entity`] is a lightweight `u64` identifier with no inherent data.
//! Component tables key their rows by it; the entity itself owns nothing.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure identifiers. Components are attached to entities to give
/// them meaning. An identifier is never handed out twice by the same
/// [`EntityAllocator`], even after the entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(pub u64);

impl Entity {
    /// The null / invalid entity sentinel.
    pub const INVALID: Entity = Entity(0);

    /// Create an entity from a raw `u64` identifier.
    #[must_use]
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` identifier.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is a valid (non-zero) entity.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// Allocates monotonically increasing entity IDs.
///
/// Allocation is a single atomic increment, so any number of threads can
/// create entities through a shared reference. Destroyed IDs are never
/// recycled.
#[derive(Debug)]
pub struct EntityAllocator {
    next_id: AtomicU64,
}

impl EntityAllocator {
    /// Creates a new allocator. IDs start at 1 (0 is reserved for [`Entity::INVALID`]).
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocates a fresh entity ID.
    pub fn allocate(&self) -> Entity {
        Entity(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the ID the next call to [`allocate`](Self::allocate) would hand out.
    #[must_use]
    pub fn peek_next(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }

    /// Moves the allocator forward so the next ID is at least `next`.
    ///
    /// Never moves it backwards: IDs handed out before a restore stay retired.
    pub fn advance_to(&self, next: u64) {
        self.next_id.fetch_max(next, Ordering::Relaxed);
    }

    /// Returns the number of entities allocated so far.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.peek_next() - 1
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
