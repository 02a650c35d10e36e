use serde::{Deserialize, Serialize};

use crate::types::{RecordId, Version};

/// A schema-conforming record. The payload's columnar encoding is out of
/// scope for this core; it is carried as an opaque byte blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
  pub record_id: RecordId,
  pub version: Version,
  pub payload: Vec<u8>,
}

/// A batch of records as received by `PartitionWriter::insert`, alongside
/// the boolean masks the writer computes for the arena in step 4/5 of the
/// insert algorithm.
pub struct MaskedBatch {
  pub records: Vec<Record>,
  /// `skip[i] = true` iff `records[i].version <= current_version(id)`.
  pub skip: Vec<bool>,
  /// `update[i] = true` iff `current_version(id) > 0` (record existed).
  pub update: Vec<bool>,
}

impl MaskedBatch {
  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}
