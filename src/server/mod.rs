use std::sync::Arc;

use futures::Future;
use hyper::body::Bytes;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use warp::{Filter, Rejection, Reply};

use crate::compaction::{CompactionStrategy, SimpleCompactionStrategy};
use crate::errors::ServerResult;
use crate::file_tracker::FileTracker;
use crate::metadata::coordinator::MetadataCoordinator;
use crate::metadata::directory::ConfigDirectory;
use crate::metadata::file::MetadataFile;
use crate::opt::Opt;
use crate::server_allocator::{ClusterServerAllocator, ServerAllocator};
use crate::skip_index::SkipIndexCache;
use crate::storage::SharedCache;
use crate::types::PartitionId;
use crate::writer::PartitionWriter;

mod create_metadata_file_route;
mod discover_partition_metadata_route;
mod perform_metadata_operation_route;

const COMMIT_SECONDS: u64 = 1;

/// Tracks whether the background loops should keep running; flipped
/// once on shutdown, mirroring the teacher's stop/is_active pattern.
#[derive(Default, Clone)]
pub struct Activity {
  lock: Arc<RwLock<bool>>,
}

impl Activity {
  pub async fn stop(&self) {
    *self.lock.write().await = true;
  }

  pub async fn is_stopped(&self) -> bool {
    *self.lock.read().await
  }
}

/// Process-wide state: the collaborators every partition writer shares,
/// plus the registry of writers currently loaded on this node and the
/// metadata-file copies this node holds as one of a table's metadata
/// servers.
#[derive(Clone)]
pub struct Server {
  pub opt: Opt,
  pub directory: Arc<dyn ConfigDirectory>,
  pub coordinator: Arc<MetadataCoordinator>,
  pub allocator: Arc<dyn ServerAllocator>,
  pub compaction_strategy: Arc<dyn CompactionStrategy>,
  pub skip_index_cache: Arc<SkipIndexCache>,
  pub file_tracker: Arc<FileTracker>,
  activity: Activity,
  writers: Arc<SharedCache<PartitionId, Arc<PartitionWriter>>>,
  metadata_files: Arc<SharedCache<(String, String), MetadataFile>>,
  partition_index: Arc<SharedCache<PartitionId, (String, String)>>,
}

impl Server {
  pub async fn new(
    opt: Opt,
    directory: Arc<dyn ConfigDirectory>,
    allocator: Arc<dyn ServerAllocator>,
  ) -> ServerResult<Server> {
    let coordinator = Arc::new(MetadataCoordinator::new(Arc::clone(&directory))?);
    let file_tracker = Arc::new(FileTracker::open(&opt.dir).await?);
    Ok(Server {
      opt,
      directory,
      coordinator,
      allocator,
      compaction_strategy: Arc::new(SimpleCompactionStrategy::new()),
      skip_index_cache: Arc::new(SkipIndexCache::new()),
      file_tracker,
      activity: Activity::default(),
      writers: Arc::new(SharedCache::new()),
      metadata_files: Arc::new(SharedCache::new()),
      partition_index: Arc::new(SharedCache::new()),
    })
  }

  pub async fn with_allocator(directory: Arc<dyn ConfigDirectory>, opt: Opt) -> ServerResult<Server> {
    let allocator = Arc::new(ClusterServerAllocator::new(Arc::clone(&directory)));
    Server::new(opt, directory, allocator).await
  }

  pub async fn register_writer(&self, partition_id: PartitionId, writer: Arc<PartitionWriter>) {
    self.writers.put(partition_id, writer).await;
  }

  pub async fn writer(&self, partition_id: &PartitionId) -> Option<Arc<PartitionWriter>> {
    self.writers.get(partition_id).await
  }

  pub async fn index_partition(&self, partition_id: PartitionId, namespace: String, table: String) {
    self.partition_index.put(partition_id, (namespace, table)).await;
  }

  async fn get_metadata_file(&self, namespace: &str, table: &str) -> Option<MetadataFile> {
    self.metadata_files.get(&(namespace.to_string(), table.to_string())).await
  }

  async fn put_metadata_file(&self, namespace: &str, table: &str, file: MetadataFile) {
    self.metadata_files.put((namespace.to_string(), table.to_string()), file).await;
  }

  /// Spawns the two background loops: one draining arenas (`commit`)
  /// across every loaded writer, one compacting segment lists. Mirrors
  /// the fixed-cadence `sleep_until` pattern used for all periodic work
  /// in this core.
  pub async fn init(&self) -> ServerResult<(impl Future<Output = ()> + '_, impl Future<Output = ()> + '_)> {
    let commit_clone = self.clone();
    let commit_forever = async move {
      let mut last_t = Instant::now();
      let interval = Duration::from_secs(COMMIT_SECONDS);
      loop {
        let planned_t = last_t + interval;
        let now = Instant::now();
        if now < planned_t {
          tokio::time::sleep_until(planned_t).await;
        }
        last_t = Instant::now();
        let writers = commit_clone.writers.values().await;
        for writer in writers {
          if let Err(e) = writer.commit().await {
            log::error!("background commit failed: {}", e);
          }
        }
        if commit_clone.activity.is_stopped().await {
          return;
        }
      }
    };

    let compact_clone = self.clone();
    let compact_interval_seconds = self.opt.compaction_loop_seconds;
    let compact_forever = async move {
      let mut last_t = Instant::now();
      let interval = Duration::from_secs(compact_interval_seconds);
      loop {
        let planned_t = last_t + interval;
        let now = Instant::now();
        if now < planned_t {
          tokio::time::sleep_until(planned_t).await;
        }
        last_t = Instant::now();
        let writers = compact_clone.writers.values().await;
        for writer in writers {
          if let Err(e) = writer.compact(false).await {
            log::error!("background compaction failed: {}", e);
          }
        }
        if compact_clone.activity.is_stopped().await {
          return;
        }
      }
    };

    Ok((commit_forever, compact_forever))
  }

  pub async fn stop(&self) {
    self.activity.stop().await;
  }

  fn log_request(route_name: &str, body: &Bytes) {
    log::info!("received rpc request for {} containing {} bytes", route_name, body.len());
  }

  pub fn warp_filter(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("rpc").and(
      Self::perform_metadata_operation_filter(self.clone())
        .or(Self::create_metadata_file_filter(self.clone()))
        .or(Self::discover_partition_metadata_filter(self.clone())),
    )
  }
}
