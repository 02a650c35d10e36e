use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::arena::Arena;
use crate::constants::SNAPSHOT_METADATA_FILENAME;
use crate::errors::ServerResult;
use crate::segment::Segment;
use crate::types::{LifecycleState, PartitionId, PlacementId, ServerId, TxnId};

/// A `(server, keyrange, placement)` tuple this partition replicates
/// toward. `is_joining` marks a target that has not yet caught up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationTarget {
  pub server_id: ServerId,
  pub placement_id: PlacementId,
  pub partition_id: PartitionId,
  pub keyrange_begin: Vec<u8>,
  pub keyrange_end: Option<Vec<u8>>,
  pub is_joining: bool,
}

/// Opaque, per-collaborator cursor. Tagged by the partition's UUID so a
/// recreated partition (new UUID, same id) never resumes a stale cursor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationState {
  pub partition_uuid: Option<Uuid>,
  pub cursor: Vec<u8>,
}

impl ReplicationState {
  pub fn fresh(partition_uuid: Uuid) -> ReplicationState {
    ReplicationState { partition_uuid: Some(partition_uuid), cursor: Vec::new() }
  }

  pub fn for_current(&self, partition_uuid: Uuid) -> ReplicationState {
    match self.partition_uuid {
      Some(tag) if tag == partition_uuid => self.clone(),
      _ => ReplicationState::fresh(partition_uuid),
    }
  }
}

/// The durable, serializable portion of a partition's state: everything
/// except the live arenas, which are process-local and rebuilt from
/// segments plus whatever the arena replay log (outside this core's
/// scope) provides on restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSnapshot {
  pub partition_id: PartitionId,
  pub partition_uuid: Uuid,
  pub keyrange_begin: Vec<u8>,
  pub keyrange_end: Option<Vec<u8>>,
  pub lsm_sequence: u64,
  pub segments: Vec<Segment>,
  pub lifecycle_state: LifecycleState,
  pub is_splitting: bool,
  pub split_partition_ids: Vec<PartitionId>,
  pub last_metadata_txnid: TxnId,
  pub last_metadata_txnseq: u64,
  pub replication_targets: Vec<ReplicationTarget>,
  pub has_joining_servers: bool,
  pub replication_state: ReplicationState,
}

impl PersistedSnapshot {
  pub fn new(partition_id: PartitionId, keyrange_begin: Vec<u8>, keyrange_end: Option<Vec<u8>>) -> PersistedSnapshot {
    let partition_uuid = Uuid::new_v4();
    PersistedSnapshot {
      partition_id,
      partition_uuid,
      keyrange_begin,
      keyrange_end,
      lsm_sequence: 0,
      segments: Vec::new(),
      lifecycle_state: LifecycleState::Load,
      is_splitting: false,
      split_partition_ids: Vec::new(),
      last_metadata_txnid: TxnId(partition_id.0),
      last_metadata_txnseq: 0,
      replication_targets: Vec::new(),
      has_joining_servers: false,
      replication_state: ReplicationState::fresh(partition_uuid),
    }
  }

  pub fn total_size_bytes(&self) -> u64 {
    self.segments.iter().map(|s| s.size_bytes).sum()
  }

  fn path(base_path: &Path) -> PathBuf {
    base_path.join(SNAPSHOT_METADATA_FILENAME)
  }

  pub async fn write_to_disk(&self, base_path: &Path) -> ServerResult<()> {
    let body = serde_json::to_vec_pretty(self)?;
    let tmp_path = base_path.join(format!("{}.tmp", SNAPSHOT_METADATA_FILENAME));
    fs::write(&tmp_path, &body).await?;
    fs::rename(&tmp_path, Self::path(base_path)).await?;
    let dir_file = fs::File::open(base_path).await?;
    dir_file.sync_all().await?;
    Ok(())
  }

  pub async fn load_from_disk(base_path: &Path) -> ServerResult<Option<PersistedSnapshot>> {
    let path = Self::path(base_path);
    if !path.exists() {
      return Ok(None);
    }
    let bytes = fs::read(path).await?;
    Ok(Some(serde_json::from_slice(&bytes)?))
  }
}

/// A full in-process view of a partition's state: the persisted fields
/// plus the two live arenas, which never round-trip through disk as
/// part of the snapshot itself.
#[derive(Clone)]
pub struct PartitionSnapshot {
  pub persisted: Arc<PersistedSnapshot>,
  pub head_arena: Arc<Arena>,
  pub compacting_arena: Option<Arc<Arena>>,
}

impl PartitionSnapshot {
  pub fn new(persisted: PersistedSnapshot) -> PartitionSnapshot {
    PartitionSnapshot {
      persisted: Arc::new(persisted),
      head_arena: Arc::new(Arena::new()),
      compacting_arena: None,
    }
  }
}

/// Single-writer, many-reader publish/subscribe holder. Readers clone the
/// `Arc` out from under the lock and never see it mutate afterward;
/// the writer is solely responsible for producing the next value.
pub struct SnapshotCell {
  inner: RwLock<Arc<PartitionSnapshot>>,
}

impl SnapshotCell {
  pub fn new(initial: PartitionSnapshot) -> SnapshotCell {
    SnapshotCell { inner: RwLock::new(Arc::new(initial)) }
  }

  pub async fn get(&self) -> Arc<PartitionSnapshot> {
    Arc::clone(&*self.inner.read().await)
  }

  pub async fn publish(&self, next: PartitionSnapshot) {
    *self.inner.write().await = Arc::new(next);
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn replication_state_resets_on_partition_uuid_mismatch() {
    let uuid_a = Uuid::new_v4();
    let uuid_b = Uuid::new_v4();
    let state = ReplicationState { partition_uuid: Some(uuid_a), cursor: vec![1, 2, 3] };

    let same = state.for_current(uuid_a);
    assert_eq!(same.cursor, vec![1, 2, 3]);

    let reset = state.for_current(uuid_b);
    assert!(reset.cursor.is_empty());
    assert_eq!(reset.partition_uuid, Some(uuid_b));
  }

  #[tokio::test]
  async fn persisted_snapshot_round_trips_through_disk() {
    let dir = tempdir().unwrap();
    let snapshot = PersistedSnapshot::new(PartitionId([7; 20]), vec![0], Some(vec![255]));
    snapshot.write_to_disk(dir.path()).await.unwrap();

    let loaded = PersistedSnapshot::load_from_disk(dir.path()).await.unwrap().unwrap();
    assert_eq!(loaded.partition_id, snapshot.partition_id);
    assert_eq!(loaded.partition_uuid, snapshot.partition_uuid);
    assert_eq!(loaded.keyrange_begin, snapshot.keyrange_begin);
  }

  #[tokio::test]
  async fn load_from_disk_returns_none_when_absent() {
    let dir = tempdir().unwrap();
    assert!(PersistedSnapshot::load_from_disk(dir.path()).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn snapshot_cell_publish_is_visible_to_subsequent_get() {
    let persisted = PersistedSnapshot::new(PartitionId([1; 20]), vec![0], None);
    let cell = SnapshotCell::new(PartitionSnapshot::new(persisted.clone()));
    assert_eq!(cell.get().await.persisted.lsm_sequence, 0);

    let mut next = persisted;
    next.lsm_sequence = 1;
    cell.publish(PartitionSnapshot::new(next)).await;
    assert_eq!(cell.get().await.persisted.lsm_sequence, 1);
  }
}
