//! Reader (core spec §4.3): pooled, bounds-checked, checksum-verified
//! random-access entity reads from the data file.
//!
//! Each pooled reader owns its own memory-mapped view of the data file.
//! The pool is invalidated — every mapping dropped and rebuilt — after any
//! write that extends the file or after a checkpoint, so that outstanding
//! readers can never read past a mapping taken before the file grew
//! (core spec §9: "the design treats reader invalidation as an
//! always-safe operation: drop the pool, let callers construct fresh
//! readers on next use").

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use memmap2::Mmap;
use thiserror::Error;
use tracing::debug;

use crate::entity::{Entity, EntityId};
use crate::format::{self, FormatError};

/// Errors raised while reading entity records from the data file.
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Underlying I/O error (opening the file, mapping it).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested offset does not leave enough bytes in the file for a
    /// well-formed record.
    #[error("offset {offset} out of bounds (file is {file_len} bytes)")]
    OutOfBounds {
        /// The offset that was requested.
        offset: u64,
        /// The file's current length.
        file_len: u64,
    },

    /// Decoding or checksum verification failed.
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

/// One memory-mapped view of the data file.
struct MappedReader {
    mmap: Mmap,
}

impl MappedReader {
    fn open(path: &Path) -> Result<Self, ReaderError> {
        let file = File::open(path)?;
        // SAFETY: the data file is append-only and never truncated except
        // by a checkpoint, which always invalidates and rebuilds the pool
        // before continuing; no reader ever observes a shrinking file.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(MappedReader { mmap })
    }

    fn get_at_offset(&self, offset: u64) -> Result<Entity, ReaderError> {
        let offset = offset as usize;
        if offset >= self.mmap.len() {
            return Err(ReaderError::OutOfBounds {
                offset: offset as u64,
                file_len: self.mmap.len() as u64,
            });
        }
        let (entity, _consumed) = format::decode_entity_record(&self.mmap[offset..])?;
        Ok(entity)
    }
}

/// A checked-out reader, returned to the pool when dropped.
pub struct PooledReader<'p> {
    reader: Option<Arc<MappedReader>>,
    pool: &'p ReaderPool,
}

impl PooledReader<'_> {
    /// Read and verify the entity record at `offset`.
    pub fn get_at_offset(&self, offset: u64) -> Result<Entity, ReaderError> {
        self.reader
            .as_ref()
            .expect("reader present for lifetime of PooledReader")
            .get_at_offset(offset)
    }
}

impl Drop for PooledReader<'_> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.pool.release(reader);
        }
    }
}

/// A fixed-capacity pool of memory-mapped readers over a single data file.
pub struct ReaderPool {
    path: PathBuf,
    capacity: usize,
    idle: Mutex<VecDeque<Arc<MappedReader>>>,
}

impl ReaderPool {
    /// Build a pool for `path` with up to `capacity` concurrently idle
    /// mappings (more than `capacity` concurrent checkouts are allowed —
    /// callers beyond capacity simply get a freshly mapped reader that
    /// isn't returned to the idle queue once it's full).
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        ReaderPool {
            path: path.into(),
            capacity: capacity.max(1),
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Check out a reader, mapping the file fresh if the idle queue is
    /// empty.
    pub fn acquire(&self) -> Result<PooledReader<'_>, ReaderError> {
        let existing = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop_front()
        };
        let reader = match existing {
            Some(reader) => reader,
            None => Arc::new(MappedReader::open(&self.path)?),
        };
        Ok(PooledReader {
            reader: Some(reader),
            pool: self,
        })
    }

    fn release(&self, reader: Arc<MappedReader>) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        if idle.len() < self.capacity {
            idle.push_back(reader);
        }
    }

    /// Drop every idle mapping. Called after a write extends the file or
    /// after a checkpoint rewrites it; subsequent `acquire` calls map the
    /// file afresh.
    pub fn invalidate(&self) {
        let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = idle.len();
        idle.clear();
        debug!(path = %self.path.display(), dropped, "reader pool invalidated");
    }
}

/// Read and verify a single entity record directly from `path` at
/// `offset`, bypassing the pool. Used by `RecoveryManager` when it needs a
/// one-off read without disturbing pooled mappings.
pub fn read_record_at(path: &Path, offset: u64) -> Result<Entity, ReaderError> {
    let reader = MappedReader::open(path)?;
    reader.get_at_offset(offset)
}

/// Scan every entity record in `path` sequentially from the first byte
/// after `start_offset`, invoking `visitor` for each one. Used by
/// `RecoveryManager::RepairIndex` to rebuild indexes from scratch and by
/// the data file reader when no offset index is available yet.
pub fn scan_records(
    path: &Path,
    start_offset: u64,
    mut visitor: impl FnMut(EntityId, u64, &Entity),
) -> Result<(), ReaderError> {
    let reader = MappedReader::open(path)?;
    let mut offset = start_offset as usize;
    while offset < reader.mmap.len() {
        match format::decode_entity_record(&reader.mmap[offset..]) {
            Ok((entity, consumed)) => {
                visitor(entity.id, offset as u64, &entity);
                offset += consumed;
            }
            Err(_) => break,
        }
    }
    Ok(())
}
