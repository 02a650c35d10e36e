use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use crate::constants::TABLE_CONFIG_FILENAME;
use crate::errors::{ServerError, ServerResult};
use crate::storage::SharedCache;
use crate::types::{NamespaceTable, ServerId, ServerStatus, TxnId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
  pub server_id: ServerId,
  pub address: String,
  pub status: ServerStatus,
}

/// A table's current metadata pointer plus its tunables. Every
/// `MetadataCoordinator` commit rewrites `metadata_txnid`/`metadata_txnseq`
/// here as the single source of truth other replicas converge on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
  pub namespace_table: NamespaceTable,
  pub metadata_servers: Vec<ServerId>,
  pub metadata_txnid: TxnId,
  pub metadata_txnseq: u64,
  pub replication_factor: usize,
  pub split_threshold_bytes: u64,
  pub max_arena_records: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
  pub servers: Vec<ServerConfig>,
}

/// Collaborator interface standing in for the cluster membership gossip
/// layer. Backed here by a JSON directory on disk; a production
/// deployment would point this at the cluster's own membership service.
#[async_trait::async_trait]
pub trait ConfigDirectory: Send + Sync {
  async fn get_server_config(&self, id: &ServerId) -> ServerResult<ServerConfig>;
  async fn get_table_config(&self, ns: &str, table: &str) -> ServerResult<TableConfig>;
  async fn update_table_config(&self, cfg: TableConfig) -> ServerResult<()>;
  async fn get_cluster_config(&self) -> ServerResult<ClusterConfig>;
  fn get_server_id(&self) -> ServerId;
}

/// File-backed directory: one `table_config.json` per namespace/table
/// directory under `base_path`, plus a single cluster-wide config file.
pub struct FileConfigDirectory {
  base_path: PathBuf,
  server_id: ServerId,
  cluster: RwLock<Arc<ClusterConfig>>,
  table_cache: SharedCache<(String, String), TableConfig>,
}

impl FileConfigDirectory {
  pub async fn open(base_path: &Path, server_id: ServerId) -> ServerResult<FileConfigDirectory> {
    let cluster_path = base_path.join("cluster_config.json");
    let cluster = if cluster_path.exists() {
      let bytes = fs::read(&cluster_path).await?;
      serde_json::from_slice(&bytes)?
    } else {
      ClusterConfig::default()
    };
    Ok(FileConfigDirectory {
      base_path: base_path.to_path_buf(),
      server_id,
      cluster: RwLock::new(Arc::new(cluster)),
      table_cache: SharedCache::new(),
    })
  }

  fn table_dir(&self, ns: &str, table: &str) -> PathBuf {
    self.base_path.join("tables").join(ns).join(table)
  }
}

#[async_trait::async_trait]
impl ConfigDirectory for FileConfigDirectory {
  async fn get_server_config(&self, id: &ServerId) -> ServerResult<ServerConfig> {
    let cluster = Arc::clone(&*self.cluster.read().await);
    cluster
      .servers
      .iter()
      .find(|s| &s.server_id == id)
      .cloned()
      .ok_or_else(|| ServerError::illegal_argument(format!("unknown server {}", id)))
  }

  async fn get_table_config(&self, ns: &str, table: &str) -> ServerResult<TableConfig> {
    let key = (ns.to_string(), table.to_string());
    if let Some(cached) = self.table_cache.get(&key).await {
      return Ok(cached);
    }
    let path = self.table_dir(ns, table).join(TABLE_CONFIG_FILENAME);
    let bytes = fs::read(&path)
      .await
      .map_err(|e| ServerError::illegal_argument(format!("no table config for {}/{}: {}", ns, table, e)))?;
    let cfg: TableConfig = serde_json::from_slice(&bytes)?;
    self.table_cache.put(key, cfg.clone()).await;
    Ok(cfg)
  }

  async fn update_table_config(&self, cfg: TableConfig) -> ServerResult<()> {
    let dir = self.table_dir(&cfg.namespace_table.namespace, &cfg.namespace_table.table);
    fs::create_dir_all(&dir).await?;
    let body = serde_json::to_vec_pretty(&cfg)?;
    let tmp_path = dir.join(format!("{}.tmp", TABLE_CONFIG_FILENAME));
    fs::write(&tmp_path, &body).await?;
    fs::rename(&tmp_path, dir.join(TABLE_CONFIG_FILENAME)).await?;
    let key = (cfg.namespace_table.namespace.clone(), cfg.namespace_table.table.clone());
    self.table_cache.put(key, cfg).await;
    Ok(())
  }

  async fn get_cluster_config(&self) -> ServerResult<ClusterConfig> {
    Ok((*Arc::clone(&*self.cluster.read().await)).clone())
  }

  fn get_server_id(&self) -> ServerId {
    self.server_id.clone()
  }
}
