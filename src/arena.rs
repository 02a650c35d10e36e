use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::errors::ServerResult;
use crate::record::Record;
use crate::segment::{Segment, SegmentFile};
use crate::types::{RecordId, Version};

/// The mutable, in-memory write buffer for a partition. A fresh arena
/// backs every `head_arena`; once an arena starts flushing it becomes the
/// `compacting_arena` and is replaced by a new empty head.
#[derive(Debug, Default, Clone)]
pub struct Arena {
  /// Most recent stored record per id, keyed for O(1) dedup lookups.
  records: HashMap<RecordId, Record>,
}

impl Arena {
  pub fn new() -> Arena {
    Arena { records: HashMap::new() }
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn fetch_record_version(&self, id: RecordId) -> Version {
    self.records.get(&id).map(|r| r.version).unwrap_or(Version::ABSENT)
  }

  /// Applies a masked batch: records with `skip[i] == true` are dropped.
  /// Returns the set of record ids actually written, for the writer to
  /// fold into its dirty-bytes / split-threshold accounting.
  pub fn insert(&mut self, records: &[Record], skip: &[bool]) -> HashSet<RecordId> {
    let mut written = HashSet::new();
    for (record, &skipped) in records.iter().zip(skip) {
      if skipped {
        continue;
      }
      let replace = match self.records.get(&record.record_id) {
        Some(existing) => record.version > existing.version,
        None => true,
      };
      if replace {
        self.records.insert(record.record_id, record.clone());
        written.insert(record.record_id);
      }
    }
    written
  }

  /// Serializes the arena's contents, sorted by record id, into a new
  /// immutable segment rooted at `first_sequence`.
  pub async fn flush_to_disk(
    &self,
    base_path: &Path,
    filename: &str,
    first_sequence: u64,
  ) -> ServerResult<Segment> {
    let mut records: Vec<Record> = self.records.values().cloned().collect();
    records.sort_by_key(|r| r.record_id);
    SegmentFile::write_new(base_path, filename, &records, first_sequence).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(id: u128, version: u64) -> Record {
    Record { record_id: RecordId(id), version: Version(version), payload: vec![1, 2, 3] }
  }

  #[test]
  fn insert_keeps_highest_version_per_id() {
    let mut arena = Arena::new();
    let batch = vec![record(1, 1_500_000_000_000_001), record(1, 1_500_000_000_000_002)];
    let inserted = arena.insert(&batch, &[false, false]);
    assert_eq!(inserted.len(), 2);
    assert_eq!(arena.fetch_record_version(RecordId(1)), Version(1_500_000_000_000_002));
    assert_eq!(arena.len(), 1);
  }

  #[test]
  fn insert_respects_skip_mask() {
    let mut arena = Arena::new();
    let batch = vec![record(1, 1_500_000_000_000_001)];
    let inserted = arena.insert(&batch, &[true]);
    assert!(inserted.is_empty());
    assert!(arena.is_empty());
    assert_eq!(arena.fetch_record_version(RecordId(1)), Version::ABSENT);
  }

  #[test]
  fn fetch_record_version_absent_is_zero() {
    let arena = Arena::new();
    assert!(arena.fetch_record_version(RecordId(42)).is_absent());
  }
}
