use std::collections::HashSet;

use log::info;

use crate::errors::{ServerError, ServerResult};
use crate::metadata::operation::{
  MetadataOperation, MetadataOperationPayload, MetadataOperationType, SplitPartitionOp,
};
use crate::server_allocator::AllocationMode;
use crate::snapshot::SnapshotCell;
use crate::types::{PartitionId, PlacementId};

use super::WriterContext;

/// §4.4.4 `split()`: find a median key, allocate two fresh partitions and
/// their server sets, and submit a `SPLIT_PARTITION` metadata operation.
/// Does not mutate the snapshot directly — the split only takes effect
/// once discovery delivers it back through `apply_metadata_change`.
pub async fn propose_split(ctx: &WriterContext, snapshot: &SnapshotCell) -> ServerResult<()> {
  let current = snapshot.get().await;

  let (min, median, max) = ctx.reader.find_median_value().await?;
  if median == min || median == max {
    return Err(ServerError::runtime("no suitable split point found"));
  }

  let cfg = ctx.directory.get_table_config(&ctx.namespace, &ctx.table).await?;
  let replication_factor = cfg.replication_factor;

  let mut low_servers = Vec::new();
  ctx
    .allocator
    .allocate_servers(AllocationMode::MustAllocate, replication_factor, &HashSet::new(), &mut low_servers)
    .await?;
  let exclude: HashSet<_> = low_servers.iter().cloned().collect();
  let mut high_servers = Vec::new();
  ctx
    .allocator
    .allocate_servers(AllocationMode::MustAllocate, replication_factor, &exclude, &mut high_servers)
    .await?;

  let split_partition_id_low = PartitionId::random();
  let split_partition_id_high = PartitionId::random();
  let placement_id = PlacementId::random();

  let op = MetadataOperation {
    db_namespace: ctx.namespace.clone(),
    table_id: ctx.table.clone(),
    input_txnid: cfg.metadata_txnid,
    output_txnid: PartitionId::random(),
    optype: MetadataOperationType::SplitPartition,
    opdata: MetadataOperationPayload::SplitPartition(SplitPartitionOp {
      partition_id: current.persisted.partition_id,
      split_point: median,
      split_servers_low: low_servers,
      split_servers_high: high_servers,
      split_partition_id_low,
      split_partition_id_high,
      placement_id,
      finalize_immediately: false,
    }),
  };

  ctx.coordinator.perform_and_commit_operation(&ctx.namespace, &ctx.table, op).await?;
  info!("submitted split proposal for partition {}", current.persisted.partition_id);
  Ok(())
}
