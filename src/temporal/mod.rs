//! TemporalIndex (core spec §4.6): per-entity ordered timeline of tag
//! events, keyed by `(timestamp_ns, insertion_seq)` so that events sharing
//! a timestamp still have a stable, write-order-preserving tie-break.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entity::EntityId;

/// The kind of tag event recorded in an entity's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOp {
    /// A tag was added.
    Add,
    /// A tag was implicitly removed (superseded by a later state, not a
    /// distinct delete operation of its own).
    RemoveImplicit,
}

/// One event in an entity's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEvent {
    /// Nanosecond timestamp the event was recorded at.
    pub timestamp_ns: u64,
    /// The effective tag string this event concerns.
    pub tag: String,
    /// What happened to the tag at this timestamp.
    pub op: EventOp,
}

/// Key ordering events within a single entity's timeline: timestamp first,
/// then a monotonic insertion sequence number as the tie-break (core spec
/// §4.6: "secondary key is insertion order").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct TimelineKey {
    timestamp_ns: u64,
    insertion_seq: u64,
}

/// Per-entity ordered timeline of tag events.
pub struct TemporalIndex {
    timelines: Mutex<HashMap<EntityId, BTreeMap<TimelineKey, TagEvent>>>,
    next_seq: AtomicU64,
}

impl Default for TemporalIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalIndex {
    /// Build an empty temporal index.
    pub fn new() -> Self {
        TemporalIndex {
            timelines: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Record that `tag` changed state for `entity_id` at `timestamp_ns`.
    pub fn append(&self, entity_id: EntityId, timestamp_ns: u64, tag: impl Into<String>, op: EventOp) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let key = TimelineKey {
            timestamp_ns,
            insertion_seq: seq,
        };
        let event = TagEvent {
            timestamp_ns,
            tag: tag.into(),
            op,
        };
        let mut timelines = self.timelines.lock().unwrap_or_else(|e| e.into_inner());
        timelines.entry(entity_id).or_default().insert(key, event);
    }

    /// Reconstruct the set of effective tags present on `entity_id` at
    /// time `t` (inclusive), by replaying events with timestamp <= `t`.
    pub fn as_of(&self, entity_id: EntityId, t: u64) -> Vec<String> {
        let timelines = self.timelines.lock().unwrap_or_else(|e| e.into_inner());
        let Some(timeline) = timelines.get(&entity_id) else {
            return Vec::new();
        };

        let mut present: Vec<String> = Vec::new();
        for (key, event) in timeline {
            if key.timestamp_ns > t {
                break;
            }
            match event.op {
                EventOp::Add => {
                    if !present.contains(&event.tag) {
                        present.push(event.tag.clone());
                    }
                }
                EventOp::RemoveImplicit => {
                    present.retain(|tag| tag != &event.tag);
                }
            }
        }
        present
    }

    /// Every event for `entity_id` with `t_from <= timestamp_ns <= t_to`,
    /// in ascending order.
    pub fn history(&self, entity_id: EntityId, t_from: u64, t_to: u64) -> Vec<TagEvent> {
        let timelines = self.timelines.lock().unwrap_or_else(|e| e.into_inner());
        let Some(timeline) = timelines.get(&entity_id) else {
            return Vec::new();
        };
        timeline
            .iter()
            .filter(|(key, _)| key.timestamp_ns >= t_from && key.timestamp_ns <= t_to)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Set difference between the effective tag sets at `t1` and `t2`:
    /// `(added, removed)` where `added` is present at `t2` but not `t1`,
    /// and `removed` is present at `t1` but not `t2`.
    pub fn diff(&self, entity_id: EntityId, t1: u64, t2: u64) -> (Vec<String>, Vec<String>) {
        let at_t1 = self.as_of(entity_id, t1);
        let at_t2 = self.as_of(entity_id, t2);
        let added = at_t2.iter().filter(|t| !at_t1.contains(t)).cloned().collect();
        let removed = at_t1.iter().filter(|t| !at_t2.contains(t)).cloned().collect();
        (added, removed)
    }

    /// Drop every recorded timeline. Used by `RecoveryManager::RepairIndex`
    /// before a full rebuild from the data file.
    pub fn clear(&self) {
        let mut timelines = self.timelines.lock().unwrap_or_else(|e| e.into_inner());
        timelines.clear();
    }
}
