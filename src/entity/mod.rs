//! Domain types: entity identity, temporal tags, and the effective-tag
//! canonicalization rule that every query path must agree on.
//!
//! A [`TemporalTag`] is serialized on disk as a single self-describing
//! string, `TIMESTAMP|tag`. The *effective* tag — the part a query
//! matches against — is the string with that timestamp prefix stripped.
//! [`split_effective_tag`] is the single place that performs this split so
//! that WAL replay and cold reads can never diverge on the rule (the
//! equivalence invariant in the data model depends on this).

#[cfg(test)]
mod tests;

use std::fmt;

/// Reserved prefix for relationship tags (`_source:`, `_target:`,
/// `_relationship:`). Callers must not use `_`-prefixed tags for anything
/// other than relationship metadata.
pub const RESERVED_PREFIX: &str = "_";

/// The tag a `Delete` appends. Entities carrying this effective tag are
/// excluded from default `ListByTag`/`ListByTags` results.
pub const DELETED_TAG: &str = "_deleted:true";

/// Separator between a `TemporalTag`'s timestamp and its tag string in the
/// on-disk / wire representation.
const TAG_SEPARATOR: char = '|';

/// A globally unique entity identifier: 36 raw bytes, matching the
/// on-disk record layout (`id(36)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId([u8; 36]);

impl EntityId {
    /// Wrap a raw 36-byte identifier.
    pub fn new(bytes: [u8; 36]) -> Self {
        EntityId(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 36] {
        &self.0
    }

    /// Consume and return the raw bytes.
    pub fn into_bytes(self) -> [u8; 36] {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A `(nanosecond_timestamp, tag_string)` pair. Every mutation that adds a
/// tag assigns it a timestamp from the repository's process-wide monotonic
/// clock; a tag may reappear with a different timestamp later (event
/// sourcing — every append is preserved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalTag {
    /// Nanosecond timestamp the tag was written at.
    pub timestamp_ns: u64,
    /// The effective tag string (no timestamp prefix).
    pub tag: String,
}

impl TemporalTag {
    /// Build a new temporal tag.
    pub fn new(timestamp_ns: u64, tag: impl Into<String>) -> Self {
        TemporalTag {
            timestamp_ns,
            tag: tag.into(),
        }
    }

    /// The effective tag — what queries match against.
    pub fn effective(&self) -> &str {
        &self.tag
    }

    /// True if this tag's effective form starts with the reserved `_`
    /// relationship prefix.
    pub fn is_relationship(&self) -> bool {
        self.tag.starts_with(RESERVED_PREFIX)
    }

    /// Render the on-disk / wire form: `TIMESTAMP|tag`.
    pub fn to_stored_string(&self) -> String {
        format!("{}{}{}", self.timestamp_ns, TAG_SEPARATOR, self.tag)
    }

    /// Parse a stored string (`TIMESTAMP|tag` or a bare `tag`) back into a
    /// `TemporalTag`. Bare tags (no recognizable timestamp prefix) are kept
    /// with a timestamp of `0` — callers that need a real ordering should
    /// never produce bare tags themselves; this path exists only so that
    /// reads tolerate them, per the edge-case policy in the spec.
    pub fn from_stored_string(stored: &str) -> Self {
        let (ts, tag) = split_effective_tag(stored);
        TemporalTag {
            timestamp_ns: ts.unwrap_or(0),
            tag: tag.to_string(),
        }
    }
}

/// Split a stored tag string into `(timestamp, effective_tag)`.
///
/// Tolerates both the canonical `TIMESTAMP|tag` form and a bare `tag` with
/// no prefix: if the text before the first [`TAG_SEPARATOR`] does not parse
/// as a `u64`, the whole string is treated as the effective tag and `None`
/// is returned for the timestamp. This is the single canonicalization
/// point every query path (WAL replay and cold read alike) must use so
/// they can never disagree about what a stored string matches.
pub fn split_effective_tag(stored: &str) -> (Option<u64>, &str) {
    match stored.split_once(TAG_SEPARATOR) {
        Some((prefix, rest)) => match prefix.parse::<u64>() {
            Ok(ts) => (Some(ts), rest),
            Err(_) => (None, stored),
        },
        None => (None, stored),
    }
}

/// Reserved record flag bits. Currently unused by any operation; reserved
/// for forward compatibility in the on-disk record layout.
pub const FLAG_NONE: u32 = 0;

/// An entity: identity, an ordered multiset of temporal tags, an opaque
/// content blob, and creation/update timestamps.
///
/// Entities own their tags and content; the repository owns entities —
/// callers never mutate an `Entity` returned by the repository in place
/// and expect it to be persisted; every mutation goes back through
/// `Repository::update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Globally unique identifier.
    pub id: EntityId,
    /// Reserved record flags (see [`FLAG_NONE`]).
    pub flags: u32,
    /// Every temporal tag ever written to this entity, in write order.
    pub tags: Vec<TemporalTag>,
    /// Opaque content blob.
    pub content: Vec<u8>,
    /// Nanosecond timestamp of creation.
    pub created_ns: u64,
    /// Nanosecond timestamp of the most recent mutation.
    pub updated_ns: u64,
}

impl Entity {
    /// Build a new entity with bare (un-timestamped) tag strings. The
    /// repository assigns timestamps to these on `Create`; this
    /// constructor is a convenience for callers who don't need to pick a
    /// clock themselves.
    pub fn new(id: EntityId, bare_tags: Vec<String>, content: Vec<u8>) -> Self {
        Entity {
            id,
            flags: FLAG_NONE,
            tags: bare_tags
                .into_iter()
                .map(|tag| TemporalTag::new(0, tag))
                .collect(),
            content,
            created_ns: 0,
            updated_ns: 0,
        }
    }

    /// Effective tags currently on this entity (duplicates included, in
    /// write order) — callers wanting a deduplicated set should collect
    /// into a `HashSet`.
    pub fn effective_tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.effective())
    }

    /// True if this entity's current tag set includes the deletion tag.
    pub fn is_deleted(&self) -> bool {
        self.tags.iter().any(|t| t.effective() == DELETED_TAG)
    }

    /// The entity's dataset, i.e. the value of its `dataset:<name>` tag,
    /// if present.
    pub fn dataset(&self) -> Option<&str> {
        self.tags
            .iter()
            .find_map(|t| t.effective().strip_prefix("dataset:"))
    }
}
