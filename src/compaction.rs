use std::collections::HashMap;
use std::path::Path;

use rand::RngCore;

use crate::constants::{MAX_LSM_SEGMENTS, URGENT_COMPACTION_SEGMENT_COUNT};
use crate::errors::ServerResult;
use crate::record::Record;
use crate::segment::{Segment, SegmentFile};
use crate::types::RecordId;

/// Pluggable merge policy. `compact` is given the current segment list
/// newest-last and returns the replacement list; it may write new
/// segment files as a side effect but must not touch the live snapshot.
#[async_trait::async_trait]
pub trait CompactionStrategy: Send + Sync {
  fn needs_compaction(&self, segments: &[Segment]) -> bool;
  fn needs_urgent_compaction(&self, segments: &[Segment]) -> bool;
  async fn compact(&self, base_path: &Path, segments: &[Segment]) -> ServerResult<Vec<Segment>>;
}

/// Merges the whole segment list into one, deduplicating by
/// `(record_id, max version)`. Adequate for the size-tiers this core is
/// scoped to; a production strategy would merge contiguous small runs
/// only and leave large segments untouched.
pub struct SimpleCompactionStrategy;

impl SimpleCompactionStrategy {
  pub fn new() -> SimpleCompactionStrategy {
    SimpleCompactionStrategy
  }
}

impl Default for SimpleCompactionStrategy {
  fn default() -> Self {
    SimpleCompactionStrategy::new()
  }
}

#[async_trait::async_trait]
impl CompactionStrategy for SimpleCompactionStrategy {
  fn needs_compaction(&self, segments: &[Segment]) -> bool {
    segments.len() >= 2
  }

  fn needs_urgent_compaction(&self, segments: &[Segment]) -> bool {
    segments.len() >= URGENT_COMPACTION_SEGMENT_COUNT || segments.len() >= MAX_LSM_SEGMENTS
  }

  async fn compact(&self, base_path: &Path, segments: &[Segment]) -> ServerResult<Vec<Segment>> {
    if segments.is_empty() {
      return Ok(Vec::new());
    }
    let mut best: HashMap<RecordId, Record> = HashMap::new();
    let mut first_sequence = u64::MAX;
    for segment in segments {
      first_sequence = first_sequence.min(segment.first_sequence);
      let file = SegmentFile::load(base_path, segment).await?;
      for record in file.records {
        let replace = match best.get(&record.record_id) {
          Some(existing) => record.version > existing.version,
          None => true,
        };
        if replace {
          best.insert(record.record_id, record);
        }
      }
    }
    let mut merged: Vec<Record> = best.into_values().collect();
    merged.sort_by_key(|r| r.record_id);

    let filename = random_segment_filename();
    let new_segment = SegmentFile::write_new(base_path, &filename, &merged, first_sequence).await?;
    Ok(vec![new_segment])
  }
}

pub fn random_segment_filename() -> String {
  let mut bytes = [0u8; 8];
  rand::thread_rng().fill_bytes(&mut bytes);
  bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  fn record(id: u128, version: u64) -> Record {
    Record { record_id: RecordId(id), version: Version(version), payload: vec![0] }
  }

  use crate::types::Version;

  #[tokio::test]
  async fn compact_merges_segments_keeping_highest_version_per_id() {
    let dir = tempdir().unwrap();
    let seg_a = SegmentFile::write_new(dir.path(), "a", &[record(1, 1), record(2, 1)], 1).await.unwrap();
    let seg_b = SegmentFile::write_new(dir.path(), "b", &[record(1, 2)], 2).await.unwrap();

    let strategy = SimpleCompactionStrategy::new();
    let merged = strategy.compact(dir.path(), &[seg_a, seg_b]).await.unwrap();
    assert_eq!(merged.len(), 1);

    let file = SegmentFile::load(dir.path(), &merged[0]).await.unwrap();
    assert_eq!(file.records.len(), 2);
    assert_eq!(file.fetch_record_version(RecordId(1)), Version(2));
    assert_eq!(file.fetch_record_version(RecordId(2)), Version(1));
  }

  #[test]
  fn urgent_compaction_triggers_at_segment_count_thresholds() {
    let strategy = SimpleCompactionStrategy::new();
    let few: Vec<Segment> = Vec::new();
    assert!(!strategy.needs_urgent_compaction(&few));
    let many: Vec<Segment> = (0..URGENT_COMPACTION_SEGMENT_COUNT)
      .map(|i| Segment {
        filename: format!("s{}", i),
        first_sequence: i as u64,
        last_sequence: i as u64,
        size_bytes: 0,
        has_skip_index: false,
      })
      .collect();
    assert!(strategy.needs_urgent_compaction(&many));
  }
}
