use serde::{Deserialize, Serialize};

use crate::metadata::operation::MetadataOperationPayload;
use crate::types::{PartitionId, ServerId};

/// One partition's slice of a table's partitioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFileEntry {
  pub partition_id: PartitionId,
  pub keyrange_begin: Vec<u8>,
  pub server_set: Vec<ServerId>,
}

/// The authoritative partitioning of one table at one `txnid`. Entries
/// are kept in ascending `keyrange_begin` order; the checksum covers the
/// canonical encoding so that divergent replicas can be detected without
/// a full diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFile {
  pub entries: Vec<MetadataFileEntry>,
}

impl MetadataFile {
  pub fn new(entries: Vec<MetadataFileEntry>) -> MetadataFile {
    MetadataFile { entries }
  }

  pub fn checksum(&self) -> crate::errors::ServerResult<crate::types::Checksum> {
    let bytes = bincode::serialize(&self.entries)?;
    Ok(crate::types::Checksum::of(&bytes))
  }

  /// Applies one metadata operation's payload in place. `FinalizeSplit`
  /// and `FinalizeJoin` are no-ops on this structure: the split/join
  /// already took effect on the entry list when it was proposed, and
  /// finalize only affects the partitions' own lifecycle state via a
  /// later discovery response.
  pub fn apply(&mut self, payload: &MetadataOperationPayload) {
    match payload {
      MetadataOperationPayload::RemoveDeadServers(op) => {
        for entry in &mut self.entries {
          entry.server_set.retain(|s| !op.dead_servers.contains(s));
        }
      }
      MetadataOperationPayload::SplitPartition(op) => {
        if let Some(pos) = self.entries.iter().position(|e| e.partition_id == op.partition_id) {
          let begin = self.entries[pos].keyrange_begin.clone();
          self.entries.remove(pos);
          self.entries.push(MetadataFileEntry {
            partition_id: op.split_partition_id_low,
            keyrange_begin: begin,
            server_set: op.split_servers_low.clone(),
          });
          self.entries.push(MetadataFileEntry {
            partition_id: op.split_partition_id_high,
            keyrange_begin: op.split_point.clone(),
            server_set: op.split_servers_high.clone(),
          });
          self.entries.sort_by(|a, b| a.keyrange_begin.cmp(&b.keyrange_begin));
        }
      }
      MetadataOperationPayload::FinalizeSplit(_) => {}
      MetadataOperationPayload::JoinServers(op) => {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.partition_id == op.partition_id) {
          for server in &op.joining_servers {
            if !entry.server_set.contains(server) {
              entry.server_set.push(server.clone());
            }
          }
        }
      }
      MetadataOperationPayload::FinalizeJoin(_) => {}
      MetadataOperationPayload::CreatePartition(op) => {
        self.entries.push(MetadataFileEntry {
          partition_id: op.partition_id,
          keyrange_begin: op.keyrange_begin.clone(),
          server_set: op.server_set.clone(),
        });
        self.entries.sort_by(|a, b| a.keyrange_begin.cmp(&b.keyrange_begin));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metadata::operation::{
    CreatePartitionOp, FinalizeJoinOp, FinalizeSplitOp, JoinServersOp, RemoveDeadServersOp, SplitPartitionOp,
  };
  use crate::types::{PlacementId, PartitionId};

  fn server(id: &str) -> ServerId {
    ServerId(id.to_string())
  }

  fn partition(byte: u8) -> PartitionId {
    PartitionId([byte; 20])
  }

  fn one_entry_file() -> MetadataFile {
    MetadataFile::new(vec![MetadataFileEntry {
      partition_id: partition(1),
      keyrange_begin: vec![0],
      server_set: vec![server("a"), server("b")],
    }])
  }

  #[test]
  fn checksum_is_deterministic_and_order_sensitive() {
    let file = one_entry_file();
    assert_eq!(file.checksum().unwrap(), file.checksum().unwrap());

    let mut reordered = one_entry_file();
    reordered.entries[0].server_set.reverse();
    assert_ne!(file.checksum().unwrap(), reordered.checksum().unwrap());
  }

  #[test]
  fn remove_dead_servers_strips_only_named_servers() {
    let mut file = one_entry_file();
    file.apply(&MetadataOperationPayload::RemoveDeadServers(RemoveDeadServersOp {
      dead_servers: vec![server("a")],
    }));
    assert_eq!(file.entries[0].server_set, vec![server("b")]);
  }

  #[test]
  fn split_partition_replaces_entry_with_two_sorted_entries() {
    let mut file = one_entry_file();
    file.apply(&MetadataOperationPayload::SplitPartition(SplitPartitionOp {
      partition_id: partition(1),
      split_point: vec![5],
      split_servers_low: vec![server("a")],
      split_servers_high: vec![server("b")],
      split_partition_id_low: partition(2),
      split_partition_id_high: partition(3),
      placement_id: PlacementId::random(),
      finalize_immediately: false,
    }));
    assert_eq!(file.entries.len(), 2);
    assert_eq!(file.entries[0].partition_id, partition(2));
    assert_eq!(file.entries[0].keyrange_begin, vec![0]);
    assert_eq!(file.entries[1].partition_id, partition(3));
    assert_eq!(file.entries[1].keyrange_begin, vec![5]);
  }

  #[test]
  fn join_servers_appends_without_duplicating() {
    let mut file = one_entry_file();
    file.apply(&MetadataOperationPayload::JoinServers(JoinServersOp {
      partition_id: partition(1),
      joining_servers: vec![server("a"), server("c")],
      placement_id: PlacementId::random(),
    }));
    assert_eq!(file.entries[0].server_set, vec![server("a"), server("b"), server("c")]);
  }

  #[test]
  fn create_partition_appends_and_resorts_by_keyrange() {
    let mut file = one_entry_file();
    file.apply(&MetadataOperationPayload::CreatePartition(CreatePartitionOp {
      partition_id: partition(9),
      keyrange_begin: vec![],
      server_set: vec![server("z")],
    }));
    assert_eq!(file.entries.len(), 2);
    assert_eq!(file.entries[0].partition_id, partition(9));
  }

  #[test]
  fn finalize_ops_are_no_ops_on_the_entry_list() {
    let mut file = one_entry_file();
    let before = file.entries.clone();
    file.apply(&MetadataOperationPayload::FinalizeSplit(FinalizeSplitOp {
      split_partition_id_low: partition(2),
      split_partition_id_high: partition(3),
    }));
    file.apply(&MetadataOperationPayload::FinalizeJoin(FinalizeJoinOp {
      partition_id: partition(1),
      joined_servers: vec![server("a")],
    }));
    assert_eq!(file.entries.len(), before.len());
    assert_eq!(file.entries[0].partition_id, before[0].partition_id);
  }
}
