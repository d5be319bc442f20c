//! PersistentIndex (core spec §4.7): an on-disk snapshot of the TagIndex,
//! written atomically (temp file, fsync, rename) and guarded by a magic,
//! version, and SHA-256 checksum so a corrupt snapshot is detected on load
//! rather than silently mis-trusted.
//!
//! ```text
//! magic("TIDX", 4) | version(u16) | entry_count(u64) | checksum_sha256(32)
//! | high_watermark_lsn(u64)
//! [entry]*  len(u32) | bytes | count(u32) | (id(36)){count}
//! magic("ENDT", 4)
//! ```
//!
//! The checksum covers every entry byte (not the header, not the trailing
//! marker) so that appending or reordering entries is always detectable.

#[cfg(test)]
mod tests;

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::encoding::{Decode, Encode, EncodingError};
use crate::entity::EntityId;
use crate::tagindex::TagIndex;

/// Snapshot file magic.
pub const PERSISTENT_INDEX_MAGIC: [u8; 4] = *b"TIDX";

/// Trailing marker confirming the entry block was written in full.
pub const PERSISTENT_INDEX_TRAILER: [u8; 4] = *b"ENDT";

/// Current snapshot format version.
pub const PERSISTENT_INDEX_VERSION: u16 = 1;

/// Errors raised while writing or loading a persistent index snapshot.
#[derive(Debug, Error)]
pub enum PersistentIndexError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The file's leading magic did not match [`PERSISTENT_INDEX_MAGIC`].
    #[error("bad magic")]
    BadMagic,

    /// The file's trailing magic did not match [`PERSISTENT_INDEX_TRAILER`].
    #[error("missing or corrupt trailer")]
    BadTrailer,

    /// The file declared an unsupported version.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// The entry block's checksum did not match the stored digest.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// The result of a successful [`load`]: the entries to rebuild a
/// [`TagIndex`] from, plus the LSN WAL replay should resume from.
pub struct LoadedSnapshot {
    /// `(effective_tag, sorted_entity_ids)` pairs.
    pub entries: Vec<(String, Vec<EntityId>)>,
    /// The highest WAL LSN reflected in this snapshot. WAL replay after a
    /// successful load must start at `high_watermark_lsn + 1` to avoid
    /// double-indexing entries already captured here.
    pub high_watermark_lsn: u64,
}

fn encode_entries(entries: &[(String, Vec<EntityId>)]) -> Result<Vec<u8>, PersistentIndexError> {
    let mut buf = Vec::new();
    for (tag, ids) in entries {
        tag.as_str().encode_to(&mut buf)?;
        let count = u32::try_from(ids.len())
            .map_err(|_| EncodingError::LengthOverflow("tag entry too large".into()))?;
        count.encode_to(&mut buf)?;
        for id in ids {
            id.as_bytes().encode_to(&mut buf)?;
        }
    }
    Ok(buf)
}

fn decode_entries(mut buf: &[u8], entry_count: u64) -> Result<Vec<(String, Vec<EntityId>)>, PersistentIndexError> {
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let (tag, consumed) = String::decode_from(buf)?;
        buf = &buf[consumed..];
        let (count, consumed) = u32::decode_from(buf)?;
        buf = &buf[consumed..];
        let mut ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (id_bytes, consumed): ([u8; 36], usize) = <[u8; 36]>::decode_from(buf)?;
            buf = &buf[consumed..];
            ids.push(EntityId::new(id_bytes));
        }
        entries.push((tag, ids));
    }
    Ok(entries)
}

/// Snapshot `index` to `path`, carrying `high_watermark_lsn` so a future
/// load knows where WAL replay must resume. Writes to a sibling temp file,
/// fsyncs, then renames into place — the rename is atomic on POSIX
/// filesystems, so a crash mid-write never leaves a half-written snapshot
/// visible at `path`.
pub fn save(path: &Path, index: &TagIndex, high_watermark_lsn: u64) -> Result<(), PersistentIndexError> {
    let entries = index.snapshot_tags();
    let entry_bytes = encode_entries(&entries)?;

    let mut hasher = Sha256::new();
    hasher.update(&entry_bytes);
    let checksum = hasher.finalize();

    let mut buf = Vec::new();
    buf.extend_from_slice(&PERSISTENT_INDEX_MAGIC);
    buf.extend_from_slice(&PERSISTENT_INDEX_VERSION.to_le_bytes());
    buf.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    buf.extend_from_slice(&checksum);
    buf.extend_from_slice(&high_watermark_lsn.to_le_bytes());
    buf.extend_from_slice(&entry_bytes);
    buf.extend_from_slice(&PERSISTENT_INDEX_TRAILER);

    let tmp_path = path.with_extension("idx.tmp");
    {
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    info!(path = %path.display(), entries = entries.len(), high_watermark_lsn, "persistent index snapshot saved");
    Ok(())
}

/// Load a snapshot from `path`, verifying magic, version, trailer, and
/// checksum. Per core spec §4.7, any failure here must be treated by the
/// caller as "the file is absent" and fall back to a full rebuild — this
/// function simply reports the failure as an `Err`; the Repository decides
/// what "fall back to rebuild" means.
pub fn load(path: &Path) -> Result<LoadedSnapshot, PersistentIndexError> {
    let bytes = fs::read(path)?;

    const HEADER_LEN: usize = 4 + 2 + 8 + 32 + 8;
    if bytes.len() < HEADER_LEN + PERSISTENT_INDEX_TRAILER.len() {
        return Err(PersistentIndexError::BadMagic);
    }

    if bytes[0..4] != PERSISTENT_INDEX_MAGIC {
        return Err(PersistentIndexError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != PERSISTENT_INDEX_VERSION {
        return Err(PersistentIndexError::UnsupportedVersion(version));
    }
    let entry_count = u64::from_le_bytes(bytes[6..14].try_into().unwrap_or_default());
    let stored_checksum = &bytes[14..46];
    let high_watermark_lsn = u64::from_le_bytes(bytes[46..54].try_into().unwrap_or_default());

    let entry_bytes = &bytes[HEADER_LEN..bytes.len() - PERSISTENT_INDEX_TRAILER.len()];
    let trailer = &bytes[bytes.len() - PERSISTENT_INDEX_TRAILER.len()..];
    if trailer != PERSISTENT_INDEX_TRAILER {
        return Err(PersistentIndexError::BadTrailer);
    }

    let mut hasher = Sha256::new();
    hasher.update(entry_bytes);
    let computed = hasher.finalize();
    if computed.as_slice() != stored_checksum {
        warn!(path = %path.display(), "persistent index checksum mismatch");
        return Err(PersistentIndexError::ChecksumMismatch);
    }

    let entries = decode_entries(entry_bytes, entry_count)?;
    Ok(LoadedSnapshot {
        entries,
        high_watermark_lsn,
    })
}

/// Default on-disk path for the tag index snapshot of a given data file
/// stem (e.g. `data/<name>.ebf` -> `data/<name>.idx`).
pub fn default_snapshot_path(data_path: &Path) -> PathBuf {
    data_path.with_extension("idx")
}
