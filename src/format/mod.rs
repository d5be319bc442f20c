//! BinaryFormat (core spec §4.1): the byte-exact layout of the data file
//! and its sorted offset index block.
//!
//! ```text
//! [Header]
//!   magic("EDBF", 4) | version(u16) | flags(u16) | index_offset(u64) | entity_count(u64)
//! [Entity record]* (append order)
//!   id(36) | flags(u32) | created_ns(u64) | updated_ns(u64)
//!   | tag_count(u32) | tag_block | content_len(u32) | content | content_sha256(32)
//!   tag_block: for each tag, len(u32) | bytes   (bytes = "TIMESTAMP|tag")
//! [Offset index block] (at `index_offset`, written only at checkpoint)
//!   count(u32) | (id(36) | offset(u64)){count}
//! ```
//!
//! This module only knows how to serialize/deserialize bytes and verify
//! checksums/magic/version — it never touches a file handle. [`crate::reader`]
//! and [`crate::writer`] own I/O.

#[cfg(test)]
mod tests;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::encoding::{Decode, Encode, EncodingError, decode_vec, encode_vec};
use crate::entity::{Entity, EntityId, TemporalTag};

/// Data file header magic.
pub const DATA_FILE_MAGIC: [u8; 4] = *b"EDBF";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Encoded size of [`DataFileHeader`] in bytes.
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 8 + 8;

/// Errors raised while encoding, decoding, or validating on-disk data.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file's magic bytes did not match [`DATA_FILE_MAGIC`].
    #[error("bad magic: expected {expected:?}, found {found:?}")]
    BadMagic {
        /// Expected magic bytes.
        expected: [u8; 4],
        /// Magic bytes actually read.
        found: [u8; 4],
    },

    /// The file declared a format version this build does not support.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u16),

    /// A record's content checksum did not match the stored digest.
    #[error("content checksum mismatch for entity {0}")]
    ChecksumMismatch(EntityId),

    /// A record claims to extend past the end of its containing buffer.
    #[error("record out of bounds: needs {needed} bytes, have {available}")]
    BoundsError {
        /// Bytes the record claims to need.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Underlying encoding error.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

/// The fixed-size data file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFileHeader {
    /// Format version.
    pub version: u16,
    /// Reserved flag bits.
    pub flags: u16,
    /// Byte offset of the sorted offset index block, or `0` if none has
    /// been written yet (no checkpoint has run).
    pub index_offset: u64,
    /// Number of entity records represented by the last checkpoint's
    /// index (not necessarily every record physically in the file, since
    /// records between checkpoints are append-only and not yet indexed).
    pub entity_count: u64,
}

impl DataFileHeader {
    /// A fresh header for an empty data file.
    pub fn empty() -> Self {
        DataFileHeader {
            version: FORMAT_VERSION,
            flags: 0,
            index_offset: 0,
            entity_count: 0,
        }
    }

    /// Encode the header to exactly [`HEADER_SIZE`] bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&DATA_FILE_MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[16..24].copy_from_slice(&self.entity_count.to_le_bytes());
        buf
    }

    /// Decode and validate a header from the first [`HEADER_SIZE`] bytes
    /// of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, FormatError> {
        if buf.len() < HEADER_SIZE {
            return Err(FormatError::BoundsError {
                needed: HEADER_SIZE,
                available: buf.len(),
            });
        }
        let mut found = [0u8; 4];
        found.copy_from_slice(&buf[0..4]);
        if found != DATA_FILE_MAGIC {
            return Err(FormatError::BadMagic {
                expected: DATA_FILE_MAGIC,
                found,
            });
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }
        let flags = u16::from_le_bytes([buf[6], buf[7]]);
        let index_offset = u64::from_le_bytes(buf[8..16].try_into().unwrap_or_default());
        let entity_count = u64::from_le_bytes(buf[16..24].try_into().unwrap_or_default());
        Ok(DataFileHeader {
            version,
            flags,
            index_offset,
            entity_count,
        })
    }
}

/// Compute the SHA-256 checksum of a content blob.
pub fn content_checksum(content: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Serialize an entity's body — `id | flags | created_ns | updated_ns |
/// tag_count | tag_block | content_len | content` — without the trailing
/// content checksum. This is the shared core of the data-file entity
/// record and the WAL payload (core spec §6: "Payload is a self-contained
/// entity encoding (same record body as the data file, minus the trailing
/// checksum)").
pub fn encode_entity_body(entity: &Entity) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    entity.id.as_bytes().encode_to(&mut buf)?;
    entity.flags.encode_to(&mut buf)?;
    entity.created_ns.encode_to(&mut buf)?;
    entity.updated_ns.encode_to(&mut buf)?;
    let stored_tags: Vec<String> = entity.tags.iter().map(TemporalTag::to_stored_string).collect();
    encode_vec(&stored_tags, &mut buf)?;
    entity.content.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode an entity's body (see [`encode_entity_body`]). Returns
/// `(entity, bytes_consumed)`; the returned entity's fields are fully
/// populated but no checksum has been verified.
pub fn decode_entity_body(buf: &[u8]) -> Result<(Entity, usize), FormatError> {
    let (id_bytes, mut offset): ([u8; 36], usize) = <[u8; 36]>::decode_from(buf)?;
    let id = EntityId::new(id_bytes);

    let (flags, consumed) = u32::decode_from(&buf[offset..])?;
    offset += consumed;
    let (created_ns, consumed) = u64::decode_from(&buf[offset..])?;
    offset += consumed;
    let (updated_ns, consumed) = u64::decode_from(&buf[offset..])?;
    offset += consumed;

    let (stored_tags, consumed) = decode_vec::<String>(&buf[offset..])?;
    offset += consumed;
    let tags = stored_tags
        .into_iter()
        .map(|s| TemporalTag::from_stored_string(&s))
        .collect();

    let (content, consumed) = Vec::<u8>::decode_from(&buf[offset..])?;
    offset += consumed;

    Ok((
        Entity {
            id,
            flags,
            tags,
            content,
            created_ns,
            updated_ns,
        },
        offset,
    ))
}

/// Serialize a full entity record: body + trailing `content_sha256(32)`.
pub fn encode_entity_record(entity: &Entity) -> Result<Vec<u8>, FormatError> {
    let mut buf = encode_entity_body(entity)?;
    let checksum = content_checksum(&entity.content);
    checksum.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode one entity record from the start of `buf`, verifying its
/// content checksum. Returns `(entity, bytes_consumed)`.
pub fn decode_entity_record(buf: &[u8]) -> Result<(Entity, usize), FormatError> {
    let (entity, mut offset) = decode_entity_body(buf)?;

    let (checksum, consumed): ([u8; 32], usize) = <[u8; 32]>::decode_from(&buf[offset..])?;
    offset += consumed;

    let expected = content_checksum(&entity.content);
    if checksum != expected {
        return Err(FormatError::ChecksumMismatch(entity.id));
    }

    Ok((entity, offset))
}

/// One entry in the sorted offset index block: an entity ID and its
/// record's byte offset in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetIndexEntry {
    /// Entity identifier.
    pub id: EntityId,
    /// Byte offset of the entity's record.
    pub offset: u64,
}

/// Encode the sorted offset index block: `count(u32) | (id(36) |
/// offset(u64)){count}`. `entries` must already be sorted by entity ID —
/// this function does not sort, matching the Writer's contract that it
/// only ever builds this block from an already-sorted checkpoint pass.
pub fn encode_offset_index(entries: &[OffsetIndexEntry]) -> Result<Vec<u8>, FormatError> {
    let mut buf = Vec::new();
    let count = u32::try_from(entries.len())
        .map_err(|_| EncodingError::LengthOverflow("offset index too large".into()))?;
    count.encode_to(&mut buf)?;
    for entry in entries {
        entry.id.as_bytes().encode_to(&mut buf)?;
        entry.offset.encode_to(&mut buf)?;
    }
    Ok(buf)
}

/// Decode the sorted offset index block.
pub fn decode_offset_index(buf: &[u8]) -> Result<Vec<OffsetIndexEntry>, FormatError> {
    let (count, mut offset) = u32::decode_from(buf)?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (id_bytes, consumed): ([u8; 36], usize) = <[u8; 36]>::decode_from(&buf[offset..])?;
        offset += consumed;
        let (record_offset, consumed) = u64::decode_from(&buf[offset..])?;
        offset += consumed;
        entries.push(OffsetIndexEntry {
            id: EntityId::new(id_bytes),
            offset: record_offset,
        });
    }
    Ok(entries)
}

/// Binary-search the sorted offset index for `id`.
pub fn find_in_offset_index(entries: &[OffsetIndexEntry], id: &EntityId) -> Option<u64> {
    entries
        .binary_search_by(|entry| entry.id.cmp(id))
        .ok()
        .map(|idx| entries[idx].offset)
}
