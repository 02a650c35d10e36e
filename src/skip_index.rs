use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;

use crate::constants::SKIP_INDEX_CACHE_SIZE;
use crate::errors::ServerResult;
use crate::segment::{Segment, SegmentFile};
use crate::types::{RecordId, Version};

/// One segment's `record_id -> version` map, loaded from its `.idx` file.
pub type SkipIndex = Arc<HashMap<RecordId, Version>>;

/// Process-wide bound on resident skip indexes, keyed by segment file
/// path so that indexes survive across partitions sharing a base dir.
pub struct SkipIndexCache {
  cache: Mutex<LruCache<PathBuf, SkipIndex>>,
}

impl SkipIndexCache {
  pub fn new() -> SkipIndexCache {
    SkipIndexCache {
      cache: Mutex::new(LruCache::new(
        NonZeroUsize::new(SKIP_INDEX_CACHE_SIZE).unwrap(),
      )),
    }
  }

  async fn get_or_load(&self, base_path: &Path, segment: &Segment) -> ServerResult<SkipIndex> {
    let path = segment.idx_path(base_path);
    {
      let mut cache = self.cache.lock().await;
      if let Some(hit) = cache.get(&path) {
        return Ok(Arc::clone(hit));
      }
    }
    let loaded = Arc::new(SegmentFile::load_skip_index(base_path, segment).await?);
    let mut cache = self.cache.lock().await;
    cache.put(path, Arc::clone(&loaded));
    Ok(loaded)
  }

  /// For each requested record id with an as-yet-unresolved version,
  /// consults `segment`'s skip index and raises the running maximum.
  /// Mirrors the teacher's pattern of walking segments newest-first and
  /// stopping once every id has a confirmed version, except this variant
  /// always keeps the max rather than the first hit, since a record id
  /// can appear with different versions in more than one segment before
  /// compaction collapses them.
  pub async fn lookup(
    &self,
    base_path: &Path,
    segment: &Segment,
    versions: &mut HashMap<RecordId, Version>,
  ) -> ServerResult<()> {
    let index = self.get_or_load(base_path, segment).await?;
    for (id, version) in versions.iter_mut() {
      if let Some(found) = index.get(id) {
        if *found > *version {
          *version = *found;
        }
      }
    }
    Ok(())
  }

  pub async fn invalidate(&self, base_path: &Path, segment: &Segment) {
    let path = segment.idx_path(base_path);
    self.cache.lock().await.pop(&path);
  }
}

impl Default for SkipIndexCache {
  fn default() -> Self {
    SkipIndexCache::new()
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::record::Record;

  fn record(id: u128, version: u64) -> Record {
    Record { record_id: RecordId(id), version: Version(version), payload: vec![0] }
  }

  #[tokio::test]
  async fn lookup_raises_running_maximum_across_segments() {
    let dir = tempdir().unwrap();
    let seg_a = SegmentFile::write_new(dir.path(), "a", &[record(1, 10)], 1).await.unwrap();
    let seg_b = SegmentFile::write_new(dir.path(), "b", &[record(1, 20), record(2, 5)], 2).await.unwrap();

    let cache = SkipIndexCache::new();
    let mut versions = HashMap::new();
    versions.insert(RecordId(1), Version::ABSENT);
    versions.insert(RecordId(2), Version::ABSENT);

    cache.lookup(dir.path(), &seg_a, &mut versions).await.unwrap();
    cache.lookup(dir.path(), &seg_b, &mut versions).await.unwrap();

    assert_eq!(versions[&RecordId(1)], Version(20));
    assert_eq!(versions[&RecordId(2)], Version(5));
  }

  #[tokio::test]
  async fn invalidate_forces_reload() {
    let dir = tempdir().unwrap();
    let seg = SegmentFile::write_new(dir.path(), "a", &[record(1, 10)], 1).await.unwrap();
    let cache = SkipIndexCache::new();
    let first = cache.get_or_load(dir.path(), &seg).await.unwrap();
    cache.invalidate(dir.path(), &seg).await;
    let second = cache.get_or_load(dir.path(), &seg).await.unwrap();
    assert_eq!(first.get(&RecordId(1)), second.get(&RecordId(1)));
  }
}
