use serde::{Deserialize, Serialize};

use crate::snapshot::ReplicationTarget;
use crate::types::{LifecycleState, PartitionId};

/// Request for a partition's current assignment/lifecycle, not satisfied
/// until a metadata server reports `metadata_txnseq >= min_txnseq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDiscoveryRequest {
  pub partition_id: PartitionId,
  pub min_txnseq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionDiscoveryResponse {
  pub code: LifecycleState,
  pub txnid: PartitionId,
  pub txnseq: u64,
  pub replication_targets: Vec<ReplicationTarget>,
  pub keyrange_begin: Option<Vec<u8>>,
  pub keyrange_end: Option<Vec<u8>>,
  pub is_splitting: bool,
  pub split_partition_ids: Vec<PartitionId>,
}
