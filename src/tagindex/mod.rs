//! TagIndex (core spec §4.5): a sharded `tag -> sorted entity-id list`
//! multimap, each shard guarded by a fair reader-writer lock.
//!
//! Shard selection is `stable_hash(effective_tag) mod shard_count`. Only
//! the effective tag is ever indexed — never the timestamped stored form
//! — per the canonical edge-case policy (core spec §4.8): this is the
//! single place that must agree with [`crate::entity::split_effective_tag`]
//! on what a stored string matches.

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use thiserror::Error;

use crate::concurrency::{FairRwLock, stable_hash};
use crate::entity::EntityId;

/// Default shard count (core spec §6: "power of 2; default 256").
pub const DEFAULT_SHARD_COUNT: usize = 256;

/// Errors raised by the tag index.
#[derive(Debug, Error)]
pub enum TagIndexError {
    /// The configured shard count was zero.
    #[error("shard count must be at least 1")]
    EmptyShardSet,
}

#[derive(Default)]
struct Shard {
    entries: HashMap<String, Vec<EntityId>>,
}

/// A sharded tag -> entity-id index. Each shard owns an independent fair
/// RW lock, so lookups against different tags never contend with each
/// other unless they happen to collide on a shard.
pub struct TagIndex {
    shards: Vec<FairRwLock<Shard>>,
}

impl TagIndex {
    /// Build an index with `shard_count` shards (a power of 2 is
    /// recommended but not enforced).
    pub fn new(shard_count: usize) -> Result<Self, TagIndexError> {
        if shard_count == 0 {
            return Err(TagIndexError::EmptyShardSet);
        }
        let shards = (0..shard_count).map(|_| FairRwLock::new(Shard::default())).collect();
        Ok(TagIndex { shards })
    }

    /// Number of shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, tag: &str) -> &FairRwLock<Shard> {
        let idx = (stable_hash(tag.as_bytes()) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Index `id` under `tag`'s effective form. Idempotent: adding the
    /// same `(tag, id)` pair more than once has no additional effect.
    pub fn add(&self, tag: &str, id: EntityId) {
        let mut shard = self.shard_for(tag).write();
        let ids = shard.entries.entry(tag.to_string()).or_default();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
    }

    /// Remove `id` from `tag`'s entry. A no-op if the pair is not present.
    pub fn remove(&self, tag: &str, id: EntityId) {
        let mut shard = self.shard_for(tag).write();
        let mut now_empty = false;
        if let Some(ids) = shard.entries.get_mut(tag) {
            if let Ok(pos) = ids.binary_search(&id) {
                ids.remove(pos);
                now_empty = ids.is_empty();
            }
        }
        if now_empty {
            shard.entries.remove(tag);
        }
    }

    /// Look up every entity indexed under `tag`'s effective form, in
    /// ascending ID order.
    pub fn lookup(&self, tag: &str) -> Vec<EntityId> {
        let shard = self.shard_for(tag).read();
        shard.entries.get(tag).cloned().unwrap_or_default()
    }

    /// Look up every entity whose indexed tag starts with `prefix`. Since
    /// a prefix does not hash deterministically to one shard, this fans
    /// out across every shard (core spec §4.5).
    pub fn lookup_prefix(&self, prefix: &str) -> Vec<EntityId> {
        let mut out = Vec::new();
        for shard_lock in &self.shards {
            let shard = shard_lock.read();
            for (tag, ids) in &shard.entries {
                if tag.starts_with(prefix) {
                    out.extend(ids.iter().copied());
                }
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Every distinct effective tag currently indexed, across all shards.
    /// Used by [`crate::persistent_index`] to build a snapshot.
    pub fn snapshot_tags(&self) -> Vec<(String, Vec<EntityId>)> {
        let mut out = Vec::new();
        for shard_lock in &self.shards {
            let shard = shard_lock.read();
            for (tag, ids) in &shard.entries {
                out.push((tag.clone(), ids.clone()));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
