//! Striped entity-level locks (core spec §5): one of a fixed set of
//! `RwLock`s chosen by `hash(id) mod K`, `K >= 64`.
//!
//! **Critical rule** (enforced by convention, not by the type system):
//! never acquire more than one stripe at a time in a single call. Callers
//! that need to touch several entities (`ListByTag`) must acquire and
//! release each entity's stripe around a single operation rather than
//! holding multiple stripes simultaneously, to rule out lock-order
//! deadlocks across concurrent multi-entity queries.

use parking_lot::RwLock;

use crate::entity::EntityId;

/// Minimum stripe count required by core spec §5.
pub const MIN_STRIPES: usize = 64;

/// A fixed array of entity-level RW locks, indexed by `hash(id) mod K`.
pub struct EntityStripes {
    stripes: Vec<RwLock<()>>,
}

impl EntityStripes {
    /// Build a striped lock set with `count` stripes (raised to
    /// [`MIN_STRIPES`] if smaller).
    pub fn new(count: usize) -> Self {
        let count = count.max(MIN_STRIPES);
        let stripes = (0..count).map(|_| RwLock::new(())).collect();
        EntityStripes { stripes }
    }

    fn index_for(&self, id: &EntityId) -> usize {
        (super::stable_hash(id.as_bytes()) as usize) % self.stripes.len()
    }

    #[cfg(test)]
    pub(crate) fn index_for_test(&self, id: &EntityId) -> usize {
        self.index_for(id)
    }

    /// Acquire a read guard on the stripe `id` hashes to.
    pub fn read(&self, id: &EntityId) -> parking_lot::RwLockReadGuard<'_, ()> {
        self.stripes[self.index_for(id)].read()
    }

    /// Acquire a write guard on the stripe `id` hashes to.
    pub fn write(&self, id: &EntityId) -> parking_lot::RwLockWriteGuard<'_, ()> {
        self.stripes[self.index_for(id)].write()
    }

    /// Number of stripes.
    pub fn len(&self) -> usize {
        self.stripes.len()
    }

    /// Whether this stripe set is empty (never true; kept for API
    /// symmetry with `len`).
    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }
}
