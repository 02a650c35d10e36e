use serde::{Deserialize, Serialize};

use crate::types::{Checksum, PartitionId, PlacementId, ServerId, TxnId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataOperationType {
  RemoveDeadServers,
  SplitPartition,
  FinalizeSplit,
  JoinServers,
  FinalizeJoin,
  CreatePartition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveDeadServersOp {
  pub dead_servers: Vec<ServerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPartitionOp {
  pub partition_id: PartitionId,
  pub split_point: Vec<u8>,
  pub split_servers_low: Vec<ServerId>,
  pub split_servers_high: Vec<ServerId>,
  pub split_partition_id_low: PartitionId,
  pub split_partition_id_high: PartitionId,
  pub placement_id: PlacementId,
  pub finalize_immediately: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeSplitOp {
  pub split_partition_id_low: PartitionId,
  pub split_partition_id_high: PartitionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinServersOp {
  pub partition_id: PartitionId,
  pub joining_servers: Vec<ServerId>,
  pub placement_id: PlacementId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeJoinOp {
  pub partition_id: PartitionId,
  pub joined_servers: Vec<ServerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePartitionOp {
  pub partition_id: PartitionId,
  pub keyrange_begin: Vec<u8>,
  pub server_set: Vec<ServerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetadataOperationPayload {
  RemoveDeadServers(RemoveDeadServersOp),
  SplitPartition(SplitPartitionOp),
  FinalizeSplit(FinalizeSplitOp),
  JoinServers(JoinServersOp),
  FinalizeJoin(FinalizeJoinOp),
  CreatePartition(CreatePartitionOp),
}

impl MetadataOperationPayload {
  pub fn optype(&self) -> MetadataOperationType {
    match self {
      MetadataOperationPayload::RemoveDeadServers(_) => MetadataOperationType::RemoveDeadServers,
      MetadataOperationPayload::SplitPartition(_) => MetadataOperationType::SplitPartition,
      MetadataOperationPayload::FinalizeSplit(_) => MetadataOperationType::FinalizeSplit,
      MetadataOperationPayload::JoinServers(_) => MetadataOperationType::JoinServers,
      MetadataOperationPayload::FinalizeJoin(_) => MetadataOperationType::FinalizeJoin,
      MetadataOperationPayload::CreatePartition(_) => MetadataOperationType::CreatePartition,
    }
  }
}

/// A transition from one metadata `txnid` to another. `optype` is kept
/// alongside `opdata` redundantly so decoding can validate the tag
/// matches the payload variant before acting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataOperation {
  pub db_namespace: String,
  pub table_id: String,
  pub input_txnid: TxnId,
  pub output_txnid: TxnId,
  pub optype: MetadataOperationType,
  pub opdata: MetadataOperationPayload,
}

impl MetadataOperation {
  pub fn validate_tag(&self) -> crate::errors::ServerResult<()> {
    if self.optype == self.opdata.optype() {
      Ok(())
    } else {
      Err(crate::errors::ServerError::illegal_argument(
        "metadata operation optype does not match opdata variant",
      ))
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataOperationResult {
  pub metadata_file_checksum: Checksum,
}
