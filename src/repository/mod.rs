//! Repository (core spec §4.8/§6): the orchestrator that wires every other
//! module behind the stable public API consumed by callers — Create,
//! Update, Delete, GetByID, ListByTag(s), the temporal queries, Checkpoint,
//! and Close.
//!
//! ## Data flow
//!
//! Write: assign timestamps -> [`crate::writer::Writer`] appends the
//! record -> [`crate::wal::Wal`] appends and fsyncs -> the in-memory entity
//! map is updated -> [`crate::tagindex::TagIndex`] and
//! [`crate::temporal::TemporalIndex`] are updated -> the reader pool is
//! invalidated.
//!
//! Read by ID: in-memory map -> disk via the pooled [`crate::reader`] at a
//! cached offset -> on checksum mismatch, [`crate::recovery`] is asked to
//! recover the entity.
//!
//! Tag query: [`crate::tagindex::TagIndex::lookup`] resolves candidate IDs,
//! then each is fetched one at a time (never more than one entity lock
//! held at once, per the concurrency model in core spec §5).

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::concurrency::{MIN_STRIPES, MetricsPool, SharedMetricsPool, stable_hash};
use crate::entity::{DELETED_TAG, Entity, EntityId, TemporalTag};
use crate::error::RepositoryError;
use crate::format::{self, HEADER_SIZE, OffsetIndexEntry};
use crate::operation::{OperationTracker, OperationType};
use crate::persistent_index;
use crate::reader::{self, ReaderPool};
use crate::recovery;
use crate::tagindex::{DEFAULT_SHARD_COUNT, TagIndex};
use crate::temporal::{EventOp, TagEvent, TemporalIndex};
use crate::wal::{Op, Wal};
use crate::writer::Writer;

/// Configuration surface (core spec §6) for a [`Repository`] instance.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Directory containing this repository's `.ebf`/`.idx`/`.wal` files.
    pub data_path: PathBuf,
    /// Base file name (without extension) for the three on-disk files.
    /// Defaults to `"entitydb"`.
    pub name: String,
    /// Number of `TagIndex` shards. Should be a power of 2.
    pub shard_count: usize,
    /// Number of striped entity-map locks. Raised to
    /// [`crate::concurrency::MIN_STRIPES`] if smaller.
    pub entity_stripe_count: usize,
    /// Pooled `Reader` count.
    pub reader_pool_size: usize,
    /// Whether `OperationTracker` lifecycle is recorded. When `false`,
    /// operations still run but bypass the tracker's bookkeeping.
    pub enable_request_tracking: bool,
    /// Worker threads in the bounded metrics pool.
    pub metrics_worker_pool_size: usize,
    /// Bounded metrics queue capacity.
    pub metrics_queue_size: usize,
    /// Enables memory-mapped reads and sharded locks. Kept for
    /// configuration-surface parity with the spec; this implementation
    /// always uses mmap'd pooled readers and sharded locks, so toggling
    /// this currently has no effect (see DESIGN.md).
    pub high_performance_mode: bool,
    /// Reject entities lacking a `dataset:<name>` tag.
    pub dataset_strict_mode: bool,
    /// Whether the tag index is persisted to `.idx` at checkpoint and
    /// loaded on open (opt-in but recommended — see DESIGN.md's Open
    /// Question decision).
    pub persist_tag_index: bool,
    /// Checkpoint trigger: seconds between automatic checkpoints. Not
    /// enforced by a background scheduler in this implementation; callers
    /// drive `Checkpoint()` themselves (see DESIGN.md).
    pub wal_checkpoint_interval_seconds: u64,
    /// Checkpoint trigger: WAL size (MB) that should prompt a checkpoint.
    /// Not enforced automatically, for the same reason.
    pub wal_checkpoint_max_size_mb: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            data_path: PathBuf::from("."),
            name: "entitydb".to_string(),
            shard_count: DEFAULT_SHARD_COUNT,
            entity_stripe_count: MIN_STRIPES,
            reader_pool_size: 16,
            enable_request_tracking: true,
            metrics_worker_pool_size: 10,
            metrics_queue_size: 1000,
            high_performance_mode: true,
            dataset_strict_mode: false,
            persist_tag_index: true,
            wal_checkpoint_interval_seconds: 300,
            wal_checkpoint_max_size_mb: 64,
        }
    }
}

/// A striped, in-memory `EntityId -> Entity` map. Each shard is an
/// independent `RwLock`, selected by the same stable hash the `TagIndex`
/// and `EntityStripes` use, so that `GetByID` (read lock) and mutations
/// (write lock) on different entities never contend.
struct EntityMap {
    shards: Vec<RwLock<HashMap<EntityId, Entity>>>,
}

impl EntityMap {
    fn new(stripe_count: usize) -> Self {
        let count = stripe_count.max(MIN_STRIPES);
        EntityMap {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_for(&self, id: &EntityId) -> &RwLock<HashMap<EntityId, Entity>> {
        let idx = (stable_hash(id.as_bytes()) as usize) % self.shards.len();
        &self.shards[idx]
    }

    fn get(&self, id: &EntityId) -> Option<Entity> {
        self.shard_for(id).read().get(id).cloned()
    }

    fn insert(&self, entity: Entity) {
        self.shard_for(&entity.id).write().insert(entity.id, entity);
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    fn snapshot(&self) -> Vec<Entity> {
        let mut out = Vec::with_capacity(self.len());
        for shard in &self.shards {
            out.extend(shard.read().values().cloned());
        }
        out
    }
}

/// A monotonically increasing nanosecond clock, seeded from the wall clock
/// but guaranteed never to repeat or go backwards within one process
/// (core spec §3: "timestamps are monotonically assigned per repository
/// instance").
struct MonotonicClock {
    last_ns: AtomicU64,
}

impl MonotonicClock {
    fn new() -> Self {
        MonotonicClock { last_ns: AtomicU64::new(0) }
    }

    fn now_ns(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        loop {
            let prev = self.last_ns.load(Ordering::SeqCst);
            let next = wall.max(prev + 1);
            if self
                .last_ns
                .compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return next;
            }
        }
    }
}

fn file_paths(config: &RepositoryConfig) -> (PathBuf, PathBuf, PathBuf) {
    let ebf = config.data_path.join(format!("{}.ebf", config.name));
    let wal = config.data_path.join(format!("{}.wal", config.name));
    let idx = config.data_path.join(format!("{}.idx", config.name));
    (ebf, wal, idx)
}

/// Fold one on-disk/WAL record into the in-memory entity map and the tag
/// and temporal indexes, used while rebuilding state at `open`.
///
/// Every record carries an entity's *entire* tag history up to that
/// point (`Entity.tags` is append-only), not just what changed, so the
/// same tag can appear in both a checkpointed offset-index record and a
/// later WAL record for the same entity. `indexed_tags` tracks which
/// `(entity, tag)` pairs have already been folded in so each is only
/// added to `tag_index`/`temporal_index` once, regardless of how many
/// records mention it.
fn apply_record(
    entity: &Entity,
    tag_index: &TagIndex,
    temporal_index: &TemporalIndex,
    entities: &EntityMap,
    indexed_tags: &mut HashMap<EntityId, HashSet<String>>,
) {
    let seen = indexed_tags.entry(entity.id).or_default();
    for tag in &entity.tags {
        if seen.insert(tag.tag.clone()) {
            tag_index.add(&tag.tag, entity.id);
            temporal_index.append(entity.id, tag.timestamp_ns, tag.tag.clone(), EventOp::Add);
        }
    }
    entities.insert(entity.clone());
}

/// The embedded, temporal, tag-indexed entity store. See the module-level
/// doc comment for the write/read/query data flows.
pub struct Repository {
    config: RepositoryConfig,
    ebf_path: PathBuf,
    idx_path: PathBuf,
    writer: Writer,
    reader_pool: ReaderPool,
    wal: Wal,
    entities: EntityMap,
    tag_index: TagIndex,
    temporal_index: TemporalIndex,
    operations: OperationTracker,
    metrics_pool: Option<SharedMetricsPool>,
    clock: MonotonicClock,
    persistent_index_loaded: AtomicBool,
    checkpoint_lock: StdMutex<()>,
    offset_index: RwLock<Vec<OffsetIndexEntry>>,
    dirty: StdMutex<HashSet<EntityId>>,
}

impl Repository {
    /// Open (creating if absent) a repository rooted at `config.data_path`.
    ///
    /// If `persist_tag_index` is set and a valid `.idx` snapshot exists, it
    /// seeds the tag index with a fast approximate view and records the
    /// snapshot's high-watermark LSN (exposed via
    /// [`Repository::persistent_index_loaded`]). The entity map and both
    /// indexes are then rebuilt precisely: once from each entry in the
    /// data file's offset index (core spec §4.7 -- these hold every
    /// checkpointed entity's full tag history, and their WAL records were
    /// already truncated), then from the WAL tail. A shared dedup set
    /// guards against double-indexing a tag that appears in both a
    /// checkpointed record and a later WAL record for the same entity,
    /// since every record carries an entity's complete tag history rather
    /// than just what changed.
    pub fn open(config: RepositoryConfig) -> Result<Self, RepositoryError> {
        fs::create_dir_all(&config.data_path)?;
        let (ebf_path, wal_path, idx_path) = file_paths(&config);

        let writer = Writer::open(ebf_path.clone())?;
        let reader_pool = ReaderPool::new(ebf_path.clone(), config.reader_pool_size);

        let header = writer.header();
        let offset_index = if header.index_offset > 0 {
            let bytes = fs::read(&ebf_path)?;
            format::decode_offset_index(&bytes[header.index_offset as usize..])?
        } else {
            Vec::new()
        };

        let tag_index = TagIndex::new(config.shard_count).unwrap_or_else(|_| {
            TagIndex::new(DEFAULT_SHARD_COUNT).expect("default shard count is nonzero")
        });
        let temporal_index = TemporalIndex::new();
        let entities = EntityMap::new(config.entity_stripe_count);

        let mut persistent_index_loaded = false;
        let mut high_watermark_lsn: u64 = 0;
        if config.persist_tag_index && idx_path.exists() {
            match persistent_index::load(&idx_path) {
                Ok(snapshot) => {
                    for (tag, ids) in snapshot.entries {
                        for id in ids {
                            tag_index.add(&tag, id);
                        }
                    }
                    high_watermark_lsn = snapshot.high_watermark_lsn;
                    persistent_index_loaded = true;
                    info!(high_watermark_lsn, "persistent tag index snapshot loaded");
                }
                Err(err) => {
                    warn!(error = %err, "persistent index snapshot rejected, falling back to WAL rebuild");
                }
            }
        }

        // Seed the entity map and both indexes from the last checkpoint's
        // offset index first -- those records hold each entity's full
        // tag history as of that checkpoint, and the WAL for them was
        // already truncated, so this is the only place that history can
        // still come from. `indexed_tags` is shared with the WAL replay
        // below so the tags read here are never re-counted from a later
        // record that repeats them.
        let mut indexed_tags: HashMap<EntityId, HashSet<String>> = HashMap::new();
        for entry in &offset_index {
            match reader::read_record_at(&ebf_path, entry.offset) {
                Ok(entity) => apply_record(&entity, &tag_index, &temporal_index, &entities, &mut indexed_tags),
                Err(crate::reader::ReaderError::Format(format::FormatError::ChecksumMismatch(_))) => {
                    warn!(
                        entity = %entry.id,
                        "checksum mismatch seeding entity at open, deferring to on-demand recovery"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        let wal = Wal::open(&wal_path, 0)?;
        let mut max_lsn_seen: Option<u64> = None;
        wal.replay(|record| {
            max_lsn_seen = Some(max_lsn_seen.map_or(record.lsn, |m| m.max(record.lsn)));
            apply_record(&record.entity, &tag_index, &temporal_index, &entities, &mut indexed_tags);
        })?;
        if let Some(max_lsn) = max_lsn_seen {
            wal.fast_forward_lsn(max_lsn);
        }

        info!(
            path = %ebf_path.display(),
            entities = entities.len(),
            persistent_index_loaded,
            "repository opened"
        );

        Ok(Repository {
            config,
            ebf_path,
            idx_path,
            writer,
            reader_pool,
            wal,
            entities,
            tag_index,
            temporal_index,
            operations: OperationTracker::new(),
            metrics_pool: None,
            clock: MonotonicClock::new(),
            persistent_index_loaded: AtomicBool::new(persistent_index_loaded),
            checkpoint_lock: StdMutex::new(()),
            offset_index: RwLock::new(offset_index),
            dirty: StdMutex::new(HashSet::new()),
        })
    }

    /// Start (or replace) the bounded metrics worker pool callers can
    /// submit metric-write closures through (core spec §5 backpressure
    /// model). Not started automatically by `open` since not every caller
    /// needs it.
    pub fn with_metrics_pool(mut self) -> Self {
        self.metrics_pool = Some(std::sync::Arc::new(MetricsPool::new(
            self.config.metrics_worker_pool_size,
            self.config.metrics_queue_size,
        )));
        self
    }

    /// The bounded metrics worker pool, if started via
    /// [`Repository::with_metrics_pool`]. Callers (typically an HTTP
    /// ingestion layer) submit metric-entity writes through this pool
    /// rather than spawning unbounded tasks; submissions past capacity are
    /// dropped (core spec §5).
    pub fn metrics_pool(&self) -> Option<&SharedMetricsPool> {
        self.metrics_pool.as_ref()
    }

    /// Whether a persistent tag-index snapshot was successfully loaded on
    /// open.
    pub fn persistent_index_loaded(&self) -> bool {
        self.persistent_index_loaded.load(Ordering::SeqCst)
    }

    /// Number of entities currently in the in-memory map.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Run `f`, short-circuiting with [`RepositoryError::Timeout`] if
    /// `deadline` has already passed. In-flight I/O inside `f` is never
    /// aborted mid-syscall (core spec §5: "in-flight disk I/O is allowed
    /// to complete; WAL appends already committed are not rolled back") —
    /// this only prevents *starting* work once the deadline has elapsed.
    pub fn call_with_deadline<T>(
        &self,
        deadline: Instant,
        f: impl FnOnce() -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        if Instant::now() >= deadline {
            return Err(RepositoryError::Timeout);
        }
        f()
    }

    fn track<T>(&self, op_type: OperationType, f: impl FnOnce() -> Result<T, RepositoryError>) -> Result<T, RepositoryError> {
        if !self.config.enable_request_tracking {
            return f();
        }
        let op = self.operations.start(op_type);
        match f() {
            Ok(value) => {
                op.succeed();
                Ok(value)
            }
            Err(err) => {
                op.fail(error_class(&err));
                Err(err)
            }
        }
    }

    /// Access the `OperationTracker` powering per-call lifecycle counters.
    pub fn operations(&self) -> &OperationTracker {
        &self.operations
    }

    /// Create a new entity. Assigns the current monotonic timestamp to
    /// `created_ns`/`updated_ns` and to any tag whose `timestamp_ns` is
    /// `0` (the convenience value `Entity::new` produces for bare tags).
    /// Returns the stored entity with timestamps applied.
    pub fn create(&self, mut entity: Entity) -> Result<Entity, RepositoryError> {
        self.track(OperationType::Write, || {
            if self.config.dataset_strict_mode && entity.dataset().is_none() {
                return Err(RepositoryError::Internal(
                    "entity is missing a required dataset:<name> tag".to_string(),
                ));
            }

            let ts = self.clock.now_ns();
            entity.created_ns = ts;
            entity.updated_ns = ts;
            for tag in &mut entity.tags {
                if tag.timestamp_ns == 0 {
                    tag.timestamp_ns = ts;
                }
            }

            self.writer.append(&entity)?;
            self.wal.append(Op::Create, ts, &entity)?;

            for tag in &entity.tags {
                self.tag_index.add(&tag.tag, entity.id);
                self.temporal_index.append(entity.id, tag.timestamp_ns, tag.tag.clone(), EventOp::Add);
            }
            self.entities.insert(entity.clone());
            self.mark_dirty(entity.id);
            self.reader_pool.invalidate();

            debug!(entity = %entity.id, tags = entity.tags.len(), "entity created");
            Ok(entity)
        })
    }

    /// Replace an existing entity's full state at the current timestamp.
    /// Newly appended tags (those absent from the previously stored
    /// entity) are indexed and recorded as new `TemporalIndex` events;
    /// tags already present are left untouched. History is never
    /// discarded — `entity.tags` should already carry every prior tag the
    /// caller wants preserved (typically obtained via a prior `get_by_id`
    /// and then appended to).
    pub fn update(&self, mut entity: Entity) -> Result<Entity, RepositoryError> {
        self.track(OperationType::Update, || {
            let existing = self.get_by_id_internal(&entity.id)?.ok_or(RepositoryError::NotFound)?;

            let ts = self.clock.now_ns();
            entity.created_ns = existing.created_ns;
            entity.updated_ns = ts;
            for tag in &mut entity.tags {
                if tag.timestamp_ns == 0 {
                    tag.timestamp_ns = ts;
                }
            }

            self.writer.append(&entity)?;
            self.wal.append(Op::Update, ts, &entity)?;

            let new_tags: Vec<&TemporalTag> = entity
                .tags
                .iter()
                .filter(|t| !existing.tags.contains(t))
                .collect();
            for tag in new_tags {
                self.tag_index.add(&tag.tag, entity.id);
                self.temporal_index.append(entity.id, tag.timestamp_ns, tag.tag.clone(), EventOp::Add);
            }
            self.entities.insert(entity.clone());
            self.mark_dirty(entity.id);
            self.reader_pool.invalidate();

            debug!(entity = %entity.id, "entity updated");
            Ok(entity)
        })
    }

    /// Append a `_deleted:true` temporal tag. Physical removal is deferred
    /// to [`Repository::checkpoint`]; until then the entity's record
    /// remains on disk but is excluded from default `ListByTag`/
    /// `ListByTags` results.
    pub fn delete(&self, id: &EntityId) -> Result<(), RepositoryError> {
        self.track(OperationType::Delete, || {
            let mut existing = self.get_by_id_internal(id)?.ok_or(RepositoryError::NotFound)?;
            if existing.is_deleted() {
                return Ok(());
            }

            let ts = self.clock.now_ns();
            existing.updated_ns = ts;
            existing.tags.push(TemporalTag::new(ts, DELETED_TAG));

            self.writer.append(&existing)?;
            self.wal.append(Op::Delete, ts, &existing)?;

            self.tag_index.add(DELETED_TAG, *id);
            self.temporal_index.append(*id, ts, DELETED_TAG, EventOp::Add);
            self.entities.insert(existing);
            self.mark_dirty(*id);
            self.reader_pool.invalidate();

            debug!(entity = %id, "entity logically deleted");
            Ok(())
        })
    }

    fn mark_dirty(&self, id: EntityId) {
        self.dirty.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
    }

    /// Fetch an entity's current state without the operation-tracking
    /// wrapper, used internally by `update`/`delete` before they mutate.
    /// Returns `Ok(None)` rather than `NotFound` so callers can decide
    /// their own not-found semantics.
    fn get_by_id_internal(&self, id: &EntityId) -> Result<Option<Entity>, RepositoryError> {
        if let Some(entity) = self.entities.get(id) {
            return Ok(Some(entity));
        }

        let offset = {
            let index = self.offset_index.read();
            format::find_in_offset_index(&index, id)
        };
        let Some(offset) = offset else {
            return Ok(None);
        };

        let reader = self.reader_pool.acquire()?;
        match reader.get_at_offset(offset) {
            Ok(entity) => {
                self.entities.insert(entity.clone());
                Ok(Some(entity))
            }
            Err(crate::reader::ReaderError::Format(format::FormatError::ChecksumMismatch(_))) => {
                warn!(entity = %id, "checksum mismatch reading entity, invoking recovery");
                match recovery::recover_corrupted_entity(&self.wal, &self.config.data_path, *id) {
                    Ok(entity) => {
                        self.entities.insert(entity.clone());
                        Ok(Some(entity))
                    }
                    Err(_) => Err(RepositoryError::Unrecoverable(id.to_string())),
                }
            }
            Err(err) => Err(RepositoryError::Corruption(err.to_string())),
        }
    }

    /// Fetch an entity by ID: in-memory map, then disk via the pooled
    /// reader at its indexed offset. On checksum mismatch the
    /// `RecoveryManager` is asked to recover the entity before this call
    /// gives up with [`RepositoryError::Unrecoverable`].
    pub fn get_by_id(&self, id: &EntityId) -> Result<Entity, RepositoryError> {
        self.track(OperationType::Read, || {
            self.get_by_id_internal(id)?.ok_or(RepositoryError::NotFound)
        })
    }

    /// Look up every non-deleted entity indexed under `tag`'s effective
    /// form, deduplicated.
    pub fn list_by_tag(&self, tag: &str) -> Result<Vec<Entity>, RepositoryError> {
        self.track(OperationType::Read, || {
            let ids = self.tag_index.lookup(tag);
            self.fetch_non_deleted(ids)
        })
    }

    /// Look up every non-deleted entity matching `tags`: intersection of
    /// per-tag candidate sets when `match_all` is true (smallest set
    /// first, to minimize intermediate set sizes), union otherwise.
    pub fn list_by_tags(&self, tags: &[String], match_all: bool) -> Result<Vec<Entity>, RepositoryError> {
        self.track(OperationType::Read, || {
            if tags.is_empty() {
                return Ok(Vec::new());
            }

            let mut id_sets: Vec<HashSet<EntityId>> = tags
                .iter()
                .map(|tag| self.tag_index.lookup(tag).into_iter().collect())
                .collect();

            let combined: HashSet<EntityId> = if match_all {
                id_sets.sort_by_key(|set| set.len());
                let mut iter = id_sets.into_iter();
                let Some(first) = iter.next() else {
                    return Ok(Vec::new());
                };
                iter.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            } else {
                id_sets.into_iter().flatten().collect()
            };

            self.fetch_non_deleted(combined.into_iter().collect())
        })
    }

    fn fetch_non_deleted(&self, ids: Vec<EntityId>) -> Result<Vec<Entity>, RepositoryError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let mut out = Vec::new();
        for id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.get_by_id_internal(&id)? {
                Some(entity) if !entity.is_deleted() => out.push(entity),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Reconstruct `id`'s effective tag set as of `t_ns`, returning the
    /// current entity with `.tags` narrowed to that snapshot.
    pub fn query_as_of(&self, id: &EntityId, t_ns: u64) -> Result<Entity, RepositoryError> {
        self.track(OperationType::Read, || {
            let mut entity = self.get_by_id_internal(id)?.ok_or(RepositoryError::NotFound)?;
            let present: HashSet<String> = self.temporal_index.as_of(*id, t_ns).into_iter().collect();
            entity.tags.retain(|t| present.contains(t.effective()));
            Ok(entity)
        })
    }

    /// Every tag event for `id` within `[t_from, t_to]`, ascending.
    pub fn history(&self, id: &EntityId, t_from: u64, t_to: u64) -> Result<Vec<TagEvent>, RepositoryError> {
        self.track(OperationType::Read, || {
            if self.get_by_id_internal(id)?.is_none() {
                return Err(RepositoryError::NotFound);
            }
            Ok(self.temporal_index.history(*id, t_from, t_to))
        })
    }

    /// `(added, removed)` effective tags between `t1` and `t2`.
    pub fn diff(&self, id: &EntityId, t1: u64, t2: u64) -> Result<(Vec<String>, Vec<String>), RepositoryError> {
        self.track(OperationType::Read, || {
            if self.get_by_id_internal(id)?.is_none() {
                return Err(RepositoryError::NotFound);
            }
            Ok(self.temporal_index.diff(*id, t1, t2))
        })
    }

    /// Persist every entity touched since the last checkpoint to new
    /// offsets, rewrite the sorted offset index, persist the tag index (if
    /// enabled), then truncate the WAL. Excludes other concurrent
    /// checkpoints via a dedicated lock but never blocks reads or writes,
    /// which continue against the live in-memory state (core spec §5).
    pub fn checkpoint(&self) -> Result<(), RepositoryError> {
        self.track(OperationType::Tx, || {
            let _guard = self.checkpoint_lock.lock().unwrap_or_else(|e| e.into_inner());

            let dirty_ids: Vec<EntityId> = {
                let mut dirty = self.dirty.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *dirty).into_iter().collect()
            };

            let mut offset_index = self.offset_index.read().clone();
            for id in &dirty_ids {
                if let Some(entity) = self.entities.get(id) {
                    let offset = self.writer.append(&entity)?;
                    upsert_offset_entry(&mut offset_index, OffsetIndexEntry { id: *id, offset });
                }
            }
            offset_index.sort_by_key(|e| e.id);
            self.writer.write_index_block(&offset_index)?;
            self.reader_pool.invalidate();

            if self.config.persist_tag_index {
                persistent_index::save(&self.idx_path, &self.tag_index, self.wal.last_lsn())?;
                self.persistent_index_loaded.store(true, Ordering::SeqCst);
            }
            self.wal.truncate()?;

            *self.offset_index.write() = offset_index;
            info!(entities = self.entities.len(), "checkpoint complete");
            Ok(())
        })
    }

    /// Release this repository's resources. File handles close via `Drop`
    /// on the underlying `Writer`/`Wal`/`ReaderPool`; this method exists
    /// for parity with the stable interface contract (core spec §6) and
    /// is safe to call more than once.
    pub fn close(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

fn upsert_offset_entry(entries: &mut Vec<OffsetIndexEntry>, entry: OffsetIndexEntry) {
    match entries.binary_search_by_key(&entry.id, |e| e.id) {
        Ok(pos) => entries[pos] = entry,
        Err(pos) => entries.insert(pos, entry),
    }
}

fn error_class(err: &RepositoryError) -> &'static str {
    match err {
        RepositoryError::NotFound => "NotFound",
        RepositoryError::Conflict => "Conflict",
        RepositoryError::Corruption(_) => "CorruptionError",
        RepositoryError::Durability(_) => "DurabilityError",
        RepositoryError::Timeout => "TimeoutError",
        RepositoryError::Format(_) | RepositoryError::FormatLayer(_) => "FormatError",
        RepositoryError::Version(_) => "VersionError",
        RepositoryError::Unrecoverable(_) => "Unrecoverable",
        RepositoryError::Bounds(_) => "BoundsError",
        RepositoryError::QueueFull => "QueueFull",
        RepositoryError::Wal(_) => "WalError",
        RepositoryError::Writer(_) => "WriterError",
        RepositoryError::Reader(_) => "ReaderError",
        RepositoryError::TagIndex(_) => "TagIndexError",
        RepositoryError::PersistentIndex(_) => "PersistentIndexError",
        RepositoryError::Recovery(_) => "RecoveryError",
        RepositoryError::Io(_) => "IoError",
        RepositoryError::Internal(_) => "Internal",
    }
}

/// Offset-index lookup without a live repository, used by tests and tools
/// that want to inspect a data file directly.
pub fn peek_offset_index(ebf_path: &Path) -> Result<Vec<OffsetIndexEntry>, RepositoryError> {
    let bytes = fs::read(ebf_path)?;
    let header = format::DataFileHeader::decode(&bytes[..HEADER_SIZE])?;
    if header.index_offset == 0 {
        return Ok(Vec::new());
    }
    Ok(format::decode_offset_index(&bytes[header.index_offset as usize..])?)
}
