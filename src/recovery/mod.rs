//! RecoveryManager (core spec §4.9): the three repair paths the Repository
//! falls back to when integrity checks fail — recovering a single
//! corrupted entity, rebuilding the indexes from scratch, and repairing a
//! torn WAL.

#[cfg(test)]
mod tests;

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::entity::{Entity, EntityId};
use crate::format;
use crate::reader::{self, ReaderError};
use crate::tagindex::TagIndex;
use crate::temporal::{EventOp, TemporalIndex};
use crate::wal::{Wal, WalError};

/// Errors raised while attempting a recovery path.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error reading the data file.
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Error replaying the WAL.
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    /// Every repair path was exhausted without producing a usable entity.
    #[error("entity {0} is unrecoverable")]
    Unrecoverable(EntityId),
}

/// Recover a single corrupted entity (core spec §4.9, path 1): first try
/// the WAL (it may hold a later good copy), then a `.bak` backup file,
/// else report `Unrecoverable`. Partial reconstruction from the tag index
/// is intentionally not attempted here — the tag index only ever carries
/// an entity's ID, never enough of its state to reconstruct content, so
/// "partial reconstruction" in practice means "return whatever the WAL or
/// backup produced, or give up."
pub fn recover_corrupted_entity(wal: &Wal, backup_dir: &Path, id: EntityId) -> Result<Entity, RecoveryError> {
    let mut best: Option<Entity> = None;
    wal.replay(|record| {
        if record.entity_id == id {
            best = Some(record.entity);
        }
    })?;
    if let Some(entity) = best {
        info!(entity = %id, "recovered entity from WAL");
        return Ok(entity);
    }

    let backup_path = backup_dir.join(format!("{id}.bak"));
    if backup_path.exists() {
        let bytes = std::fs::read(&backup_path)?;
        if let Ok((entity, _consumed)) = format::decode_entity_record(&bytes) {
            info!(entity = %id, "recovered entity from backup file");
            return Ok(entity);
        }
    }

    warn!(entity = %id, "exhausted all recovery paths");
    Err(RecoveryError::Unrecoverable(id))
}

/// The result of a full index rebuild: a fresh [`TagIndex`] and
/// [`TemporalIndex`] populated by sequentially scanning the data file, plus
/// the highest offset scanned (the data file's current length at scan
/// time, used as the new checkpoint watermark).
pub struct RebuiltIndexes {
    /// Newly built tag index.
    pub tag_index: TagIndex,
    /// Newly built temporal index.
    pub temporal_index: TemporalIndex,
    /// Number of entity records scanned.
    pub entity_count: u64,
}

/// RepairIndex (core spec §4.9, path 2): scan the data file sequentially
/// from the first record after its header, rebuilding both indexes from
/// scratch. Triggered by the Repository on magic mismatch, checksum
/// mismatch in the index file, or an integrity-check failure.
pub fn repair_index(data_path: &Path, shard_count: usize, start_offset: u64) -> Result<RebuiltIndexes, RecoveryError> {
    let tag_index = TagIndex::new(shard_count).unwrap_or_else(|_| {
        TagIndex::new(crate::tagindex::DEFAULT_SHARD_COUNT).expect("default shard count is nonzero")
    });
    let temporal_index = TemporalIndex::new();
    let mut entity_count = 0u64;

    reader::scan_records(data_path, start_offset, |id, _offset, entity| {
        entity_count += 1;
        for tag in entity.effective_tags() {
            tag_index.add(tag, id);
        }
        for temporal_tag in &entity.tags {
            temporal_index.append(id, temporal_tag.timestamp_ns, temporal_tag.tag.clone(), EventOp::Add);
        }
    })?;

    info!(data_path = %data_path.display(), entity_count, "rebuilt indexes from data file scan");
    Ok(RebuiltIndexes {
        tag_index,
        temporal_index,
        entity_count,
    })
}

/// RepairWAL (core spec §4.9, path 3): walk the WAL until the first CRC
/// failure, keeping the good prefix and logging the truncation point. This
/// is already [`Wal::replay`]'s behavior on corruption; this function
/// exists as the named entry point the Repository calls during open, and
/// additionally calls [`Wal::truncate`]-equivalent cleanup is left to the
/// caller since truncating here would discard records the Repository
/// hasn't yet applied to in-memory state.
pub fn repair_wal(wal: &Wal, mut visitor: impl FnMut(crate::wal::WalRecord)) -> Result<u64, RecoveryError> {
    let mut last_good_lsn = 0u64;
    wal.replay(|record| {
        last_good_lsn = record.lsn;
        visitor(record);
    })?;
    Ok(last_good_lsn)
}
