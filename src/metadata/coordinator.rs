use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::constants::METADATA_RPC_TIMEOUT_MILLIS;
use crate::errors::{ServerError, ServerResult};
use crate::metadata::directory::{ConfigDirectory, ServerConfig};
use crate::metadata::file::MetadataFile;
use crate::metadata::operation::{MetadataOperation, MetadataOperationResult};
use crate::types::{Checksum, ServerStatus};

/// Applies metadata operations with quorum across a table's metadata
/// server set. Owns the outbound HTTP client; the inbound RPC handlers
/// that this coordinator's peers expose live in `crate::rpc`.
pub struct MetadataCoordinator {
  directory: Arc<dyn ConfigDirectory>,
  client: reqwest::Client,
}

fn max_failures(n: usize) -> usize {
  if n > 1 {
    (n - 1) / 2
  } else {
    0
  }
}

impl MetadataCoordinator {
  pub fn new(directory: Arc<dyn ConfigDirectory>) -> ServerResult<MetadataCoordinator> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_millis(METADATA_RPC_TIMEOUT_MILLIS))
      .build()?;
    Ok(MetadataCoordinator { directory, client })
  }

  async fn server_address(&self, server_id: &crate::types::ServerId) -> ServerResult<String> {
    let config: ServerConfig = self.directory.get_server_config(server_id).await?;
    Ok(config.address)
  }

  /// §4.7: fetch the table config, check `input_txnid`, broadcast to
  /// every metadata server, refuse on checksum divergence, then commit
  /// iff failures stay within quorum.
  pub async fn perform_and_commit_operation(
    &self,
    namespace: &str,
    table: &str,
    op: MetadataOperation,
  ) -> ServerResult<()> {
    op.validate_tag()?;
    let mut cfg = self.directory.get_table_config(namespace, table).await?;
    if cfg.metadata_txnid != op.input_txnid {
      return Err(ServerError::concurrent_modification(
        "metadata operation input_txnid does not match table's current txnid",
      ));
    }

    let body = bincode::serialize(&op)?;
    let n = cfg.metadata_servers.len();
    let mut checksums: HashSet<Checksum> = HashSet::new();
    let mut failures = 0usize;

    for server_id in &cfg.metadata_servers {
      match self.send_operation(server_id, namespace, table, &body).await {
        Ok(result) => {
          checksums.insert(result.metadata_file_checksum);
        }
        Err(e) => {
          warn!("metadata operation rpc to {} failed: {}", server_id, e);
          failures += 1;
        }
      }
    }

    if checksums.len() > 1 {
      return Err(ServerError::runtime("metadata operation would corrupt file"));
    }

    if failures <= max_failures(n) {
      cfg.metadata_txnid = op.output_txnid;
      cfg.metadata_txnseq += 1;
      self.directory.update_table_config(cfg).await?;
      info!("committed metadata operation {}/{} -> txnseq advanced", namespace, table);
      Ok(())
    } else {
      Err(ServerError::runtime("error while performing metadata operation"))
    }
  }

  async fn send_operation(
    &self,
    server_id: &crate::types::ServerId,
    namespace: &str,
    table: &str,
    body: &[u8],
  ) -> ServerResult<MetadataOperationResult> {
    let address = self.server_address(server_id).await?;
    let url = format!(
      "http://{}/rpc/perform_metadata_operation?namespace={}&table={}",
      address, namespace, table
    );
    let resp = self.client.post(&url).body(body.to_vec()).send().await?;
    if resp.status().as_u16() != 201 {
      let message = resp.text().await.unwrap_or_default();
      return Err(ServerError::runtime(format!("non-201 response: {}", message)));
    }
    let bytes = resp.bytes().await?;
    Ok(bincode::deserialize(&bytes)?)
  }

  /// `create_file`: same quorum rule, no divergence check since the file
  /// is the initial state every replica accepts verbatim.
  pub async fn create_file(
    &self,
    namespace: &str,
    table: &str,
    file: &MetadataFile,
    servers: &[crate::types::ServerId],
  ) -> ServerResult<()> {
    let body = bincode::serialize(file)?;
    let n = servers.len();
    let mut failures = 0usize;
    for server_id in servers {
      let address = self.server_address(server_id).await;
      let result = match address {
        Ok(address) => {
          let url = format!(
            "http://{}/rpc/create_metadata_file?namespace={}&table={}",
            address, namespace, table
          );
          self.client.post(&url).body(body.clone()).send().await
        }
        Err(_) => {
          failures += 1;
          continue;
        }
      };
      match result {
        Ok(resp) if resp.status().as_u16() == 201 => {}
        _ => failures += 1,
      }
    }
    if failures <= max_failures(n) {
      Ok(())
    } else {
      Err(ServerError::runtime("error while creating metadata file"))
    }
  }

  /// `discover_partition`: iterate `SERVER_UP` servers in order, return
  /// the first successful response whose `metadata_txnseq` is fresh
  /// enough.
  pub async fn discover_partition(
    &self,
    namespace: &str,
    table: &str,
    request: &crate::discovery::PartitionDiscoveryRequest,
  ) -> ServerResult<crate::discovery::PartitionDiscoveryResponse> {
    let cfg = self.directory.get_table_config(namespace, table).await?;
    let mut any_server_reached = false;
    let mut stale_seen = false;
    for server_id in &cfg.metadata_servers {
      let config = match self.directory.get_server_config(server_id).await {
        Ok(c) => c,
        Err(_) => continue,
      };
      if config.status != ServerStatus::Up {
        continue;
      }
      let url = format!("http://{}/rpc/discover_partition_metadata", config.address);
      let resp = match self.client.post(&url).json(request).send().await {
        Ok(r) => r,
        Err(_) => continue,
      };
      if resp.status().as_u16() != 200 {
        continue;
      }
      any_server_reached = true;
      let decoded: crate::discovery::PartitionDiscoveryResponse = match resp.json().await {
        Ok(d) => d,
        Err(_) => continue,
      };
      if decoded.txnseq < request.min_txnseq {
        stale_seen = true;
        continue;
      }
      return Ok(decoded);
    }
    if any_server_reached || stale_seen {
      Err(ServerError::concurrent_modification(
        "no metadata server reported a txnseq fresh enough for this discovery request",
      ))
    } else {
      Err(ServerError::io_error("no metadata server for table reachable"))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_server_tolerates_no_failures() {
    assert_eq!(max_failures(1), 0);
  }

  #[test]
  fn three_servers_tolerate_exactly_one_failure() {
    assert_eq!(max_failures(3), 1);
  }

  #[test]
  fn five_servers_tolerate_exactly_two_failures() {
    assert_eq!(max_failures(5), 2);
  }
}
