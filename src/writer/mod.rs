//! Writer (core spec §4.4): append-only entity serialization, plus
//! checkpoint-time emission of the sorted offset index block.
//!
//! The writer never touches `TagIndex`/`TemporalIndex` — the Repository
//! updates those itself after `append` returns an offset. Between
//! checkpoints the on-disk entity ordering is append-order; the sorted
//! index block reflects only the last checkpoint (core spec §4.4 and §9
//! write-amplification note: updates/deletes append rather than
//! rewriting, giving O(1) writes, and checkpoint is the only place that
//! touches the whole file).


use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use crate::entity::Entity;
use crate::format::{DataFileHeader, FormatError, HEADER_SIZE, OffsetIndexEntry, encode_entity_record, encode_offset_index};

/// Errors raised while writing to the data file.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error encoding an entity record or the offset index block.
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

struct WriterState {
    file: File,
    /// Byte offset the next append will land at.
    next_offset: u64,
    header: DataFileHeader,
}

/// Append-only writer over a single data file. Exclusive for append,
/// guarded by an internal mutex (core spec §5: "Data file: shared for
/// read, exclusive for append").
pub struct Writer {
    path: PathBuf,
    state: Mutex<WriterState>,
}

impl Writer {
    /// Open (creating if absent) the data file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WriterError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        let header = if len == 0 {
            let header = DataFileHeader::empty();
            file.write_all(&header.encode())?;
            file.sync_all()?;
            header
        } else {
            let mut buf = [0u8; HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            std::io::Read::read_exact(&mut file, &mut buf)?;
            DataFileHeader::decode(&buf)?
        };

        let next_offset = file.metadata()?.len().max(HEADER_SIZE as u64);
        file.seek(SeekFrom::End(0))?;

        Ok(Writer {
            path,
            state: Mutex::new(WriterState {
                file,
                next_offset,
                header,
            }),
        })
    }

    /// Path of the underlying data file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `entity`, append its record, and return the byte offset
    /// the record was written at. Does not fsync — durability for this
    /// write is already guaranteed by the WAL append that precedes it in
    /// the Repository's write pipeline (core spec data-flow for a write).
    pub fn append(&self, entity: &Entity) -> Result<u64, WriterError> {
        let record = encode_entity_record(entity)?;
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let offset = state.next_offset;
        state.file.write_all(&record)?;
        state.next_offset += record.len() as u64;
        Ok(offset)
    }

    /// Write the sorted offset index block for the given entries at the
    /// current end of file, fsync it, then patch the header's
    /// `index_offset`/`entity_count` fields in place and fsync again.
    /// `entries` must already be sorted by entity ID.
    ///
    /// This two-phase write (body first, header patched last) mirrors the
    /// donor engine's footer-then-header-patch pattern: if the process
    /// crashes between the two fsyncs, the header still points at the
    /// *previous* valid index (or `0` if this is the first checkpoint),
    /// so a partially written index block is simply dead, unreferenced
    /// bytes rather than a corrupt active index.
    pub fn write_index_block(&self, entries: &[OffsetIndexEntry]) -> Result<(), WriterError> {
        let block = encode_offset_index(entries)?;
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let index_offset = state.next_offset;
        state.file.write_all(&block)?;
        state.next_offset += block.len() as u64;
        state.file.sync_all()?;

        state.header.index_offset = index_offset;
        state.header.entity_count = entries.len() as u64;
        let header_bytes = state.header.encode();
        state.file.seek(SeekFrom::Start(0))?;
        state.file.write_all(&header_bytes)?;
        state.file.sync_all()?;
        state.file.seek(SeekFrom::End(0))?;

        debug!(index_offset, entity_count = entries.len(), "wrote offset index block");
        Ok(())
    }

    /// The header as last read or patched.
    pub fn header(&self) -> DataFileHeader {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.header
    }

    /// Current end-of-file offset (where the next `append` will land).
    pub fn next_offset(&self) -> u64 {
        let state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        state.next_offset
    }
}
