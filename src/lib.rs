//! # EntityDB
//!
//! A temporal, tag-indexed embedded entity store. Entities carry an
//! ordered multiset of **temporal tags** — `(nanosecond_timestamp,
//! tag_string)` pairs — an opaque content blob, and creation/update
//! timestamps. Mutations append rather than overwrite: every tag ever
//! written is preserved, so a repository can answer "what did this entity
//! look like at time `t`" as well as "what does it look like now".
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Repository                           │
//! │  ┌────────────┐ ┌────────┐ ┌───────────┐ ┌──────────────────┐ │
//! │  │ Entity map │ │  WAL   │ │ TagIndex  │ │  TemporalIndex   │ │
//! │  │ (striped   │ │ (EDWL  │ │ (sharded, │ │ (per-entity      │ │
//! │  │  RW locks) │ │ frames)│ │ fair RW)  │ │  timeline)       │ │
//! │  └─────┬──────┘ └───┬────┘ └─────┬─────┘ └────────┬─────────┘ │
//! │        │            │            │                │          │
//! │        └──────► data file (BinaryFormat) ◄─────────┘          │
//! │                  Writer (append) / Reader (pooled, mmap)      │
//! │                                                                │
//! │  ┌──────────────────────────────────────────────────────────┐ │
//! │  │   PersistentIndex (.idx snapshot)  /  RecoveryManager     │ │
//! │  └──────────────────────────────────────────────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`entity`] | `EntityId`, `Entity`, temporal tags, effective-tag rules |
//! | [`encoding`] | Hand-rolled binary `Encode`/`Decode` for every on-disk type |
//! | [`format`] | Data file layout, entity records, offset index, checksums |
//! | [`wal`] | Append-only, CRC-protected write-ahead log |
//! | [`reader`] | Pooled, checksum-verified random-access entity reads |
//! | [`writer`] | Append-only entity writer, checkpoint-time index emission |
//! | [`tagindex`] | Sharded tag → entity-id index with fair RW locks |
//! | [`temporal`] | Per-entity event timeline for as-of/history/diff queries |
//! | [`persistent_index`] | `.idx` snapshot of the tag index |
//! | [`recovery`] | Entity/index/WAL repair paths |
//! | [`operation`] | Per-call operation lifecycle tracking |
//! | [`concurrency`] | Fair locks, entity-id striping, bounded metrics pool |
//! | [`repository`] | Orchestrates every other module behind a stable API |
//! | [`error`] | Crate-wide error taxonomy |
//!
//! ## Key Features
//!
//! - **Write-ahead logging** — every mutation is persisted to a WAL before
//!   being acknowledged, guaranteeing durability and crash recovery.
//! - **Temporal tags** — every tag append is preserved with a nanosecond
//!   timestamp; `QueryAsOf`/`History`/`Diff` replay the timeline.
//! - **Sharded, fair tag index** — `TagIndex` shards are protected by
//!   writer-preference-after-threshold RW locks so sustained metric writes
//!   cannot starve auth-path reads, and vice versa.
//! - **SHA-256 content integrity** — every entity record's content is
//!   checksummed on write and verified on read; a mismatch routes through
//!   `RecoveryManager` instead of returning corrupt data.
//! - **Append-only writes, checkpoint-time compaction** — updates/deletes
//!   never rewrite the data file in place; `Checkpoint` is the only
//!   operation that touches the whole file, and it does so crash-safely.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use entitydb::entity::{Entity, EntityId};
//! use entitydb::repository::{Repository, RepositoryConfig};
//!
//! let config = RepositoryConfig {
//!     data_path: "/tmp/entitydb-demo".into(),
//!     ..RepositoryConfig::default()
//! };
//! let repo = Repository::open(config).unwrap();
//!
//! let entity = Entity::new(
//!     EntityId::new([1u8; 36]),
//!     vec!["type:user".into(), "identity:username:admin".into()],
//!     b"hello".to_vec(),
//! );
//! let created = repo.create(entity).unwrap();
//!
//! let found = repo.get_by_id(&created.id).unwrap();
//! assert_eq!(found.content, b"hello");
//!
//! repo.checkpoint().unwrap();
//! repo.close().unwrap();
//! ```

#![allow(dead_code)]

pub mod concurrency;
pub mod encoding;
pub mod entity;
pub mod error;
pub mod format;
pub mod operation;
pub mod persistent_index;
pub mod reader;
pub mod recovery;
pub mod repository;
pub mod tagindex;
pub mod temporal;
pub mod wal;
pub mod writer;
