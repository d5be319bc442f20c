//! Crate-wide error taxonomy.
//!
//! Every module defines its own `thiserror::Error` enum; [`RepositoryError`]
//! is the aggregate returned by every `Repository` method, wrapping module
//! errors with `#[from]` in the same style the donor's `EngineError` wraps
//! `ManifestError`/`MemtableError`/`SSTableError`.

use thiserror::Error;

use crate::format::FormatError;
use crate::persistent_index::PersistentIndexError;
use crate::reader::ReaderError;
use crate::recovery::RecoveryError;
use crate::tagindex::TagIndexError;
use crate::wal::WalError;
use crate::writer::WriterError;

/// Top-level error returned by every public [`crate::repository::Repository`]
/// method. Carries the full taxonomy named by the core specification (§7).
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// No entity or tag matched the request.
    #[error("not found")]
    NotFound,

    /// Concurrent modification detected. Reserved: the current design
    /// linearizes writes per-entity via stripe locks, so this variant is
    /// not produced today, but is kept in the taxonomy for forward
    /// compatibility with a future optimistic-concurrency mode.
    #[error("conflict")]
    Conflict,

    /// A checksum or magic mismatch was detected and could not be (fully)
    /// repaired.
    #[error("corruption: {0}")]
    Corruption(String),

    /// An fsync or WAL append failed. Fatal for the triggering call.
    #[error("durability failure: {0}")]
    Durability(String),

    /// The caller's deadline elapsed before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// On-disk data failed a magic-number check.
    #[error("format error: {0}")]
    Format(String),

    /// On-disk data declared an unsupported format version.
    #[error("version error: unsupported version {0}")]
    Version(u16),

    /// `RecoveryManager` exhausted every repair path.
    #[error("unrecoverable: {0}")]
    Unrecoverable(String),

    /// A record claims to extend past the end of its containing file.
    #[error("bounds error: {0}")]
    Bounds(String),

    /// The bounded metrics worker pool rejected a submission.
    #[error("metrics queue full")]
    QueueFull,

    /// Error from the `BinaryFormat` layer.
    #[error("binary format error: {0}")]
    FormatLayer(#[from] FormatError),

    /// Error from the write-ahead log.
    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    /// Error appending to or checkpointing the data file.
    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    /// Error reading the data file.
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),

    /// Error from the sharded tag index.
    #[error("tag index error: {0}")]
    TagIndex(#[from] TagIndexError),

    /// Error from the persistent tag-index snapshot.
    #[error("persistent index error: {0}")]
    PersistentIndex(#[from] PersistentIndexError),

    /// Error surfaced by the recovery manager while attempting a repair.
    #[error("recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// Underlying filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (poisoned lock, unexpected state).
    #[error("internal error: {0}")]
    Internal(String),
}
