use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::{ServerError, ServerResult};
use crate::metadata::directory::ConfigDirectory;
use crate::types::{ServerId, ServerStatus};

/// `MUST_ALLOCATE` fails outright when not enough healthy servers exist;
/// a best-effort mode (not needed by this core's call sites, but kept
/// for parity with the collaborator interface) would return fewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
  MustAllocate,
  BestEffort,
}

#[async_trait::async_trait]
pub trait ServerAllocator: Send + Sync {
  async fn allocate_servers(
    &self,
    mode: AllocationMode,
    count: usize,
    exclude: &HashSet<ServerId>,
    out: &mut Vec<ServerId>,
  ) -> ServerResult<()>;
}

/// Allocates from the cluster's registered, `SERVER_UP` servers,
/// excluding anything in `exclude` (used to keep a split's two new
/// server sets disjoint).
pub struct ClusterServerAllocator {
  directory: Arc<dyn ConfigDirectory>,
}

impl ClusterServerAllocator {
  pub fn new(directory: Arc<dyn ConfigDirectory>) -> ClusterServerAllocator {
    ClusterServerAllocator { directory }
  }
}

#[async_trait::async_trait]
impl ServerAllocator for ClusterServerAllocator {
  async fn allocate_servers(
    &self,
    mode: AllocationMode,
    count: usize,
    exclude: &HashSet<ServerId>,
    out: &mut Vec<ServerId>,
  ) -> ServerResult<()> {
    let cluster = self.directory.get_cluster_config().await?;
    let candidates: Vec<ServerId> = cluster
      .servers
      .into_iter()
      .filter(|s| s.status == ServerStatus::Up && !exclude.contains(&s.server_id))
      .map(|s| s.server_id)
      .collect();

    if candidates.len() < count && mode == AllocationMode::MustAllocate {
      return Err(ServerError::illegal_argument(format!(
        "insufficient healthy servers: need {}, have {}",
        count,
        candidates.len()
      )));
    }

    out.extend(candidates.into_iter().take(count));
    Ok(())
  }
}
