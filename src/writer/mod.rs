mod split;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::arena::Arena;
use crate::compaction::{random_segment_filename, CompactionStrategy};
use crate::constants::{DEFAULT_MAX_ARENA_RECORDS, MAX_LSM_SEGMENTS};
use crate::discovery::PartitionDiscoveryResponse;
use crate::errors::{ServerError, ServerResult};
use crate::file_tracker::FileTracker;
use crate::metadata::coordinator::MetadataCoordinator;
use crate::metadata::directory::ConfigDirectory;
use crate::partition_reader::PartitionKeyReader;
use crate::record::Record;
use crate::segment::Segment;
use crate::server_allocator::ServerAllocator;
use crate::skip_index::SkipIndexCache;
use crate::snapshot::{PartitionSnapshot, PersistedSnapshot, ReplicationState, SnapshotCell};
use crate::types::{RecordId, Version};

/// Immutable handle a writer is constructed with: the owning table's
/// identity plus its collaborators. Deliberately thin — the writer never
/// holds a back-pointer to a `Partition` object, only the cells and
/// services it needs (design notes: no cyclic ownership).
pub struct WriterContext {
  pub base_path: PathBuf,
  pub namespace: String,
  pub table: String,
  pub directory: Arc<dyn ConfigDirectory>,
  pub coordinator: Arc<MetadataCoordinator>,
  pub allocator: Arc<dyn ServerAllocator>,
  pub compaction_strategy: Arc<dyn CompactionStrategy>,
  pub skip_index_cache: Arc<SkipIndexCache>,
  pub file_tracker: Arc<FileTracker>,
  pub reader: Arc<dyn PartitionKeyReader>,
}

/// Coordinates insert, commit, compaction, and split for one partition.
/// Per §5, the four locks below are distinct and acquired in a fixed
/// order (write, then commit, then the two try-locks) so no deadlock
/// cycle can form across concurrent callers.
pub struct PartitionWriter {
  ctx: WriterContext,
  snapshot: SnapshotCell,
  write_mutex: Mutex<()>,
  commit_mutex: Mutex<()>,
  compaction_mutex: Mutex<()>,
  split_mutex: Mutex<()>,
  frozen: AtomicBool,
}

impl PartitionWriter {
  pub fn new(ctx: WriterContext, snapshot: PartitionSnapshot) -> PartitionWriter {
    PartitionWriter {
      ctx,
      snapshot: SnapshotCell::new(snapshot),
      write_mutex: Mutex::new(()),
      commit_mutex: Mutex::new(()),
      compaction_mutex: Mutex::new(()),
      split_mutex: Mutex::new(()),
      frozen: AtomicBool::new(false),
    }
  }

  pub fn freeze(&self) {
    self.frozen.store(true, Ordering::SeqCst);
  }

  pub async fn snapshot(&self) -> Arc<PartitionSnapshot> {
    self.snapshot.get().await
  }

  fn check_not_frozen(&self) -> ServerResult<()> {
    if self.frozen.load(Ordering::SeqCst) {
      Err(ServerError::illegal_state("writer is frozen"))
    } else {
      Ok(())
    }
  }

  /// §4.4.1: deduplicating insert. Returns the ids actually written.
  pub async fn insert(&self, records: Vec<Record>) -> ServerResult<HashSet<RecordId>> {
    self.check_not_frozen()?;

    let mut versions: HashMap<RecordId, Version> =
      records.iter().map(|r| (r.record_id, Version::ABSENT)).collect();

    // Step 1: opportunistic pre-lookup outside the critical section.
    let prepared_snapshot = self.snapshot.get().await;
    let base_path = self.ctx.base_path.clone();
    for segment in prepared_snapshot.persisted.segments.iter().rev() {
      self
        .ctx
        .skip_index_cache
        .lookup(&base_path, segment, &mut versions)
        .await?;
    }
    let prepared_filenames: HashSet<&str> = prepared_snapshot
      .persisted
      .segments
      .iter()
      .map(|s| s.filename.as_str())
      .collect();

    // Step 2: enter the exclusive write section.
    let _write_guard = self.write_mutex.lock().await;
    self.check_not_frozen()?;
    let current = self.snapshot.get().await;
    if current.persisted.segments.len() > MAX_LSM_SEGMENTS {
      return Err(ServerError::overloaded(format!(
        "partition has {} segments, exceeding {}",
        current.persisted.segments.len(),
        MAX_LSM_SEGMENTS
      )));
    }

    // Step 3: re-consult under lock. First the compacting arena (read-only,
    // freely shareable once moved there), then any segments added since
    // the pre-lookup above.
    if let Some(compacting) = &current.compacting_arena {
      for (id, version) in versions.iter_mut() {
        let found = compacting.fetch_record_version(*id);
        if found > *version {
          *version = found;
        }
      }
    }
    for segment in &current.persisted.segments {
      if prepared_filenames.contains(segment.filename.as_str()) {
        continue;
      }
      self
        .ctx
        .skip_index_cache
        .lookup(&base_path, segment, &mut versions)
        .await?;
    }

    // Step 4: compute masks.
    let mut skip = Vec::with_capacity(records.len());
    let mut update = Vec::with_capacity(records.len());
    for record in &records {
      let known = *versions.get(&record.record_id).unwrap_or(&Version::ABSENT);
      skip.push(record.version <= known);
      update.push(!known.is_absent());
    }

    // Step 5: append to head_arena. `Arena` is behind an `Arc` inside the
    // snapshot; mutation happens through a fresh snapshot value so the
    // previous readers' view never changes underneath them.
    let mut head_arena = (*current.head_arena).clone();
    let inserted = head_arena.insert(&records, &skip);
    let next = PartitionSnapshot {
      persisted: Arc::clone(&current.persisted),
      head_arena: Arc::new(head_arena),
      compacting_arena: current.compacting_arena.clone(),
    };
    let head_len = next.head_arena.len();
    self.snapshot.publish(next).await;
    // Step 6: exit the critical section before any I/O-heavy follow-up.
    drop(_write_guard);

    let update_count = update.iter().filter(|&&u| u).count();
    info!("inserted {} records ({} updates) into arena", inserted.len(), update_count);

    if head_len > self.max_arena_records().await {
      if let Err(e) = self.commit().await {
        warn!("opportunistic commit after insert failed: {}", e);
      }
    }
    if self.ctx.compaction_strategy.needs_urgent_compaction(&self.snapshot.get().await.persisted.segments) {
      if let Err(e) = self.compact(false).await {
        warn!("opportunistic compaction after insert failed: {}", e);
      }
    }

    Ok(inserted)
  }

  async fn max_arena_records(&self) -> usize {
    match self.ctx.directory.get_table_config(&self.ctx.namespace, &self.ctx.table).await {
      Ok(cfg) => cfg.max_arena_records,
      Err(_) => DEFAULT_MAX_ARENA_RECORDS,
    }
  }

  /// §4.4.2: flip, flush, append. Returns true iff anything was written.
  pub async fn commit(&self) -> ServerResult<bool> {
    let _commit_guard = self.commit_mutex.lock().await;

    let flipped = {
      let _write_guard = self.write_mutex.lock().await;
      let current = self.snapshot.get().await;
      if current.compacting_arena.is_some() || current.head_arena.is_empty() {
        None
      } else {
        let next = PartitionSnapshot {
          persisted: Arc::clone(&current.persisted),
          head_arena: Arc::new(Arena::new()),
          compacting_arena: Some(Arc::clone(&current.head_arena)),
        };
        self.snapshot.publish(next.clone()).await;
        Some(next)
      }
    };

    let flipped = match flipped {
      Some(f) => f,
      None => return Ok(false),
    };
    let compacting = flipped.compacting_arena.as_ref().unwrap();
    let first_sequence = flipped.persisted.lsm_sequence + 1;
    let filename = random_segment_filename();

    let flushed = compacting.flush_to_disk(&self.ctx.base_path, &filename, first_sequence).await;
    let segment = match flushed {
      Ok(segment) => segment,
      Err(e) => {
        // Failure semantics: compacting_arena stays populated so the
        // next commit() retries; any partial file is left for the file
        // tracker to reclaim since no snapshot will ever reference it.
        warn!("segment flush failed, will retry on next commit: {}", e);
        return Err(e);
      }
    };

    {
      let _write_guard = self.write_mutex.lock().await;
      let current = self.snapshot.get().await;
      let mut segments = current.persisted.segments.clone();
      segments.push(segment.clone());
      let mut persisted = (*current.persisted).clone();
      persisted.segments = segments;
      persisted.lsm_sequence = segment.last_sequence;
      persisted.write_to_disk(&self.ctx.base_path).await?;
      let next = PartitionSnapshot {
        persisted: Arc::new(persisted),
        head_arena: Arc::clone(&current.head_arena),
        compacting_arena: None,
      };
      self.snapshot.publish(next).await;
    }

    info!("committed segment {} ({} records)", segment.filename, segment.len());

    if self.needs_split().await {
      if let Err(e) = self.split().await {
        warn!("post-commit split attempt failed: {}", e);
      }
    }

    Ok(true)
  }

  /// §4.4.3: merge segments, verifying no concurrent commit raced ahead
  /// of the prefix this compaction started from.
  pub async fn compact(&self, force: bool) -> ServerResult<bool> {
    let _compaction_guard = match self.compaction_mutex.try_lock() {
      Ok(g) => g,
      Err(_) => return Ok(false),
    };

    let dirty = self.commit().await?;

    let old_segments = self.snapshot.get().await.persisted.segments.clone();
    if !force && !self.ctx.compaction_strategy.needs_compaction(&old_segments) {
      return Ok(dirty);
    }
    if old_segments.is_empty() {
      return Ok(dirty);
    }

    let new_segments = self.ctx.compaction_strategy.compact(&self.ctx.base_path, &old_segments).await?;

    let mut delete_set: Vec<Segment> = Vec::new();
    {
      let _write_guard = self.write_mutex.lock().await;
      let current = self.snapshot.get().await;
      let current_segments = &current.persisted.segments;
      if current_segments.len() < old_segments.len()
        || current_segments[..old_segments.len()]
          .iter()
          .zip(old_segments.iter())
          .any(|(a, b)| a.filename != b.filename)
      {
        return Err(ServerError::concurrent_modification(
          "segment list prefix changed concurrently with compaction",
        ));
      }
      let tail_added_since = current_segments[old_segments.len()..].to_vec();

      let mut merged = new_segments.clone();
      merged.extend(tail_added_since);

      delete_set = old_segments.clone();

      let mut persisted = (*current.persisted).clone();
      persisted.segments = merged;
      persisted.write_to_disk(&self.ctx.base_path).await?;
      let next = PartitionSnapshot {
        persisted: Arc::new(persisted),
        head_arena: Arc::clone(&current.head_arena),
        compacting_arena: current.compacting_arena.clone(),
      };
      self.snapshot.publish(next).await;
    }

    let mut paths = Vec::with_capacity(delete_set.len() * 2);
    for segment in &delete_set {
      self.ctx.skip_index_cache.invalidate(&self.ctx.base_path, segment).await;
      paths.push(segment.cst_path(&self.ctx.base_path));
      paths.push(segment.idx_path(&self.ctx.base_path));
    }
    self.ctx.file_tracker.submit(&paths, 1).await?;
    self.ctx.file_tracker.release_all(&paths).await?;

    info!("compacted {} segments into {}", delete_set.len(), new_segments.len());

    if self.needs_split().await {
      if let Err(e) = self.split().await {
        warn!("post-compaction split attempt failed: {}", e);
      }
    }

    Ok(true)
  }

  /// §4.4.4: true iff not already splitting, serving, and oversized.
  pub async fn needs_split(&self) -> bool {
    let current = self.snapshot.get().await;
    if current.persisted.is_splitting || current.persisted.lifecycle_state != crate::types::LifecycleState::Serve {
      return false;
    }
    let threshold = match self.ctx.directory.get_table_config(&self.ctx.namespace, &self.ctx.table).await {
      Ok(cfg) => cfg.split_threshold_bytes,
      Err(_) => crate::constants::DEFAULT_PARTITION_SPLIT_THRESHOLD_BYTES,
    };
    current.persisted.total_size_bytes() > threshold
  }

  pub async fn split(&self) -> ServerResult<()> {
    let _split_guard = match self.split_mutex.try_lock() {
      Ok(g) => g,
      Err(_) => return Ok(()),
    };
    split::propose_split(&self.ctx, &self.snapshot).await
  }

  /// §4.8: integrate a discovery response under the write lock.
  pub async fn apply_metadata_change(&self, d: PartitionDiscoveryResponse) -> ServerResult<()> {
    let _write_guard = self.write_mutex.lock().await;
    let current = self.snapshot.get().await;
    if d.txnseq <= current.persisted.last_metadata_txnseq {
      return Err(ServerError::concurrent_modification(
        "discovery response txnseq is not newer than the current snapshot",
      ));
    }

    let mut persisted = (*current.persisted).clone();
    persisted.last_metadata_txnid = d.txnid;
    persisted.last_metadata_txnseq = d.txnseq;
    persisted.lifecycle_state = d.code;
    persisted.is_splitting = d.is_splitting;
    if persisted.keyrange_end.is_none() {
      if let Some(end) = d.keyrange_end {
        persisted.keyrange_end = Some(end);
      }
    }
    persisted.split_partition_ids = d.split_partition_ids;
    persisted.has_joining_servers = d.replication_targets.iter().any(|t| t.is_joining);
    persisted.replication_targets = d.replication_targets;

    persisted.write_to_disk(&self.ctx.base_path).await?;
    let next = PartitionSnapshot {
      persisted: Arc::new(persisted),
      head_arena: Arc::clone(&current.head_arena),
      compacting_arena: current.compacting_arena.clone(),
    };
    self.snapshot.publish(next).await;
    Ok(())
  }

  /// §4.4.5: returns a fresh cursor if the stored one is tagged with a
  /// different partition UUID (e.g. this partition was recreated).
  pub async fn fetch_replication_state(&self) -> ReplicationState {
    let current = self.snapshot.get().await;
    current
      .persisted
      .replication_state
      .for_current(current.persisted.partition_uuid)
  }

  pub async fn commit_replication_state(&self, state: ReplicationState) -> ServerResult<()> {
    let _write_guard = self.write_mutex.lock().await;
    let current = self.snapshot.get().await;
    let mut persisted = (*current.persisted).clone();
    persisted.replication_state = state;
    persisted.write_to_disk(&self.ctx.base_path).await?;
    let next = PartitionSnapshot {
      persisted: Arc::new(persisted),
      head_arena: Arc::clone(&current.head_arena),
      compacting_arena: current.compacting_arena.clone(),
    };
    self.snapshot.publish(next).await;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::metadata::directory::{ClusterConfig, ConfigDirectory, ServerConfig, TableConfig};
  use crate::server_allocator::{AllocationMode, ServerAllocator};
  use crate::types::{LifecycleState, NamespaceTable, PartitionId};

  struct MockDirectory {
    table_config: TableConfig,
  }

  #[async_trait::async_trait]
  impl ConfigDirectory for MockDirectory {
    async fn get_server_config(&self, _id: &ServerId) -> ServerResult<ServerConfig> {
      Err(ServerError::illegal_argument("no servers registered in this mock"))
    }

    async fn get_table_config(&self, _ns: &str, _table: &str) -> ServerResult<TableConfig> {
      Ok(self.table_config.clone())
    }

    async fn update_table_config(&self, _cfg: TableConfig) -> ServerResult<()> {
      Ok(())
    }

    async fn get_cluster_config(&self) -> ServerResult<ClusterConfig> {
      Ok(ClusterConfig::default())
    }

    fn get_server_id(&self) -> ServerId {
      ServerId("test-server".to_string())
    }
  }

  struct NoSplitReader;

  #[async_trait::async_trait]
  impl PartitionKeyReader for NoSplitReader {
    async fn find_median_value(&self) -> ServerResult<(Vec<u8>, Vec<u8>, Vec<u8>)> {
      Ok((vec![0], vec![0], vec![0]))
    }
  }

  struct NoopAllocator;

  #[async_trait::async_trait]
  impl ServerAllocator for NoopAllocator {
    async fn allocate_servers(
      &self,
      _mode: AllocationMode,
      _count: usize,
      _exclude: &HashSet<ServerId>,
      _out: &mut Vec<ServerId>,
    ) -> ServerResult<()> {
      Ok(())
    }
  }

  fn record(id: u128, version: u64) -> Record {
    Record { record_id: RecordId(id), version: Version(version), payload: vec![7] }
  }

  async fn make_writer_in(dir: &std::path::Path) -> PartitionWriter {
    let table_config = TableConfig {
      namespace_table: NamespaceTable { namespace: "ns".to_string(), table: "t".to_string() },
      metadata_servers: Vec::new(),
      metadata_txnid: PartitionId([0; 20]),
      metadata_txnseq: 0,
      replication_factor: 3,
      split_threshold_bytes: u64::MAX,
      max_arena_records: 1_000_000,
    };
    let directory: Arc<dyn ConfigDirectory> = Arc::new(MockDirectory { table_config });
    let coordinator = Arc::new(MetadataCoordinator::new(Arc::clone(&directory)).unwrap());
    let ctx = WriterContext {
      base_path: dir.to_path_buf(),
      namespace: "ns".to_string(),
      table: "t".to_string(),
      directory,
      coordinator,
      allocator: Arc::new(NoopAllocator),
      compaction_strategy: Arc::new(crate::compaction::SimpleCompactionStrategy::new()),
      skip_index_cache: Arc::new(SkipIndexCache::new()),
      file_tracker: Arc::new(FileTracker::open(dir).await.unwrap()),
      reader: Arc::new(NoSplitReader),
    };
    let persisted = PersistedSnapshot::new(PartitionId([1; 20]), vec![], None);
    PartitionWriter::new(ctx, PartitionSnapshot::new(persisted))
  }

  #[tokio::test]
  async fn insert_dedups_same_id_within_one_batch_keeping_highest_version() {
    let dir = tempdir().unwrap();
    let writer = make_writer_in(dir.path()).await;

    let batch = vec![
      record(1, 1_500_000_000_000_001),
      record(1, 1_500_000_000_000_002),
      record(1, 1_500_000_000_000_001),
    ];
    let inserted = writer.insert(batch).await.unwrap();
    assert_eq!(inserted, HashSet::from([RecordId(1)]));

    let snapshot = writer.snapshot().await;
    assert_eq!(snapshot.head_arena.fetch_record_version(RecordId(1)), Version(1_500_000_000_000_002));
  }

  #[tokio::test]
  async fn insert_skips_stale_version_against_committed_segment() {
    let dir = tempdir().unwrap();
    let writer = make_writer_in(dir.path()).await;

    writer.insert(vec![record(1, 1_500_000_000_000_005)]).await.unwrap();
    assert!(writer.commit().await.unwrap());

    let inserted = writer.insert(vec![record(1, 1_500_000_000_000_002)]).await.unwrap();
    assert!(inserted.is_empty());

    let snapshot = writer.snapshot().await;
    assert_eq!(snapshot.persisted.segments.len(), 1);
    assert!(snapshot.head_arena.is_empty());
  }

  #[tokio::test]
  async fn commit_is_a_no_op_on_an_empty_arena() {
    let dir = tempdir().unwrap();
    let writer = make_writer_in(dir.path()).await;
    assert!(!writer.commit().await.unwrap());
  }

  #[tokio::test]
  async fn compact_merges_multiple_committed_segments_deduplicating_by_version() {
    let dir = tempdir().unwrap();
    let writer = make_writer_in(dir.path()).await;

    writer.insert(vec![record(1, 1_500_000_000_000_001)]).await.unwrap();
    writer.commit().await.unwrap();
    writer.insert(vec![record(1, 1_500_000_000_000_009), record(2, 1_500_000_000_000_001)]).await.unwrap();
    writer.commit().await.unwrap();

    assert_eq!(writer.snapshot().await.persisted.segments.len(), 2);
    assert!(writer.compact(true).await.unwrap());

    let snapshot = writer.snapshot().await;
    assert_eq!(snapshot.persisted.segments.len(), 1);

    let segment = &snapshot.persisted.segments[0];
    let file = crate::segment::SegmentFile::load(dir.path(), segment).await.unwrap();
    assert_eq!(file.fetch_record_version(RecordId(1)), Version(1_500_000_000_000_009));
    assert_eq!(file.fetch_record_version(RecordId(2)), Version(1_500_000_000_000_001));
  }

  #[tokio::test]
  async fn apply_metadata_change_rejects_stale_txnseq_and_accepts_newer() {
    let dir = tempdir().unwrap();
    let writer = make_writer_in(dir.path()).await;

    let fresh = PartitionDiscoveryResponse {
      code: LifecycleState::Serve,
      txnid: PartitionId([2; 20]),
      txnseq: 1,
      replication_targets: Vec::new(),
      keyrange_begin: None,
      keyrange_end: None,
      is_splitting: false,
      split_partition_ids: Vec::new(),
    };
    writer.apply_metadata_change(fresh.clone()).await.unwrap();
    assert_eq!(writer.snapshot().await.persisted.lifecycle_state, LifecycleState::Serve);

    let stale = PartitionDiscoveryResponse { txnseq: 1, ..fresh };
    let err = writer.apply_metadata_change(stale).await.unwrap_err();
    assert!(matches!(err.kind, crate::errors::ServerErrorKind::ConcurrentModification));
  }

  #[tokio::test]
  async fn insert_rejects_writes_once_frozen() {
    let dir = tempdir().unwrap();
    let writer = make_writer_in(dir.path()).await;
    writer.freeze();
    let err = writer.insert(vec![record(1, 1_500_000_000_000_001)]).await.unwrap_err();
    assert!(matches!(err.kind, crate::errors::ServerErrorKind::IllegalState));
  }
}
