//! The one load/cache/overwrite idiom every persisted, process-resident
//! value in this core shares: a partition snapshot, a table config, a
//! metadata file copy, a writer registry entry. Rather than each
//! collaborator hand-rolling its own `RwLock<HashMap<_>>`, they go
//! through `SharedCache`, a bucketed, lock-striped map so unrelated
//! keys never contend on the same shard's lock.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use tokio::sync::RwLock;

const STRIPE_COUNT: usize = 16;

/// Anything usable as a `SharedCache` key.
pub trait MetadataKey: Hash + Eq + Clone + Send + Sync {}
impl<T: Hash + Eq + Clone + Send + Sync> MetadataKey for T {}

/// Anything usable as a `SharedCache` value.
pub trait Metadata: Clone + Send + Sync {}
impl<T: Clone + Send + Sync> Metadata for T {}

fn stripe_of<K: MetadataKey>(key: &K) -> usize {
  let mut hasher = DefaultHasher::new();
  key.hash(&mut hasher);
  (hasher.finish() as usize) % STRIPE_COUNT
}

pub struct SharedCache<K: MetadataKey, V: Metadata> {
  shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K: MetadataKey, V: Metadata> SharedCache<K, V> {
  pub fn new() -> SharedCache<K, V> {
    let mut shards = Vec::with_capacity(STRIPE_COUNT);
    for _ in 0..STRIPE_COUNT {
      shards.push(RwLock::new(HashMap::new()));
    }
    SharedCache { shards }
  }

  pub async fn get(&self, key: &K) -> Option<V> {
    self.shards[stripe_of(key)].read().await.get(key).cloned()
  }

  pub async fn put(&self, key: K, value: V) {
    let shard = stripe_of(&key);
    self.shards[shard].write().await.insert(key, value);
  }

  pub async fn remove(&self, key: &K) -> Option<V> {
    self.shards[stripe_of(key)].write().await.remove(key)
  }

  pub async fn values(&self) -> Vec<V> {
    let mut out = Vec::new();
    for shard in &self.shards {
      out.extend(shard.read().await.values().cloned());
    }
    out
  }
}

impl<K: MetadataKey, V: Metadata> Default for SharedCache<K, V> {
  fn default() -> Self {
    SharedCache::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn put_then_get_round_trips() {
    let cache: SharedCache<String, u32> = SharedCache::new();
    cache.put("a".to_string(), 1).await;
    cache.put("b".to_string(), 2).await;
    assert_eq!(cache.get(&"a".to_string()).await, Some(1));
    assert_eq!(cache.get(&"z".to_string()).await, None);
  }

  #[tokio::test]
  async fn remove_drops_the_entry() {
    let cache: SharedCache<String, u32> = SharedCache::new();
    cache.put("a".to_string(), 1).await;
    assert_eq!(cache.remove(&"a".to_string()).await, Some(1));
    assert_eq!(cache.get(&"a".to_string()).await, None);
  }

  #[tokio::test]
  async fn values_collects_across_every_shard() {
    let cache: SharedCache<u32, u32> = SharedCache::new();
    for i in 0..40u32 {
      cache.put(i, i * 10).await;
    }
    let mut values = cache.values().await;
    values.sort_unstable();
    let expected: Vec<u32> = (0..40).map(|i| i * 10).collect();
    assert_eq!(values, expected);
  }
}
