use std::convert::Infallible;

use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::discovery::{PartitionDiscoveryRequest, PartitionDiscoveryResponse};
use crate::errors::{ServerError, ServerResult};
use crate::ops::discover_partition_metadata::DiscoverPartitionMetadataOp;
use crate::ops::traits::ServerOp;
use crate::snapshot::ReplicationTarget;
use crate::types::{LifecycleState, PlacementId};

use super::Server;

impl Server {
  pub async fn discover_partition_metadata(
    &self,
    request: PartitionDiscoveryRequest,
  ) -> ServerResult<PartitionDiscoveryResponse> {
    let (namespace, table) = self
      .partition_index
      .get(&request.partition_id)
      .await
      .ok_or_else(|| ServerError::illegal_argument("unknown partition_id"))?;

    let cfg = self.directory.get_table_config(&namespace, &table).await?;

    let file = self
      .get_metadata_file(&namespace, &table)
      .await
      .ok_or_else(|| ServerError::illegal_state("no metadata file loaded for table"))?;
    let idx = file
      .entries
      .iter()
      .position(|e| e.partition_id == request.partition_id)
      .ok_or_else(|| ServerError::illegal_argument("partition_id not present in this table's metadata file"))?;
    let entry = &file.entries[idx];
    let keyrange_end = file.entries.get(idx + 1).map(|next| next.keyrange_begin.clone());

    let self_id = self.directory.get_server_id();
    let code = if entry.server_set.contains(&self_id) { LifecycleState::Serve } else { LifecycleState::Unload };

    let replication_targets = entry
      .server_set
      .iter()
      .filter(|s| **s != self_id)
      .map(|s| ReplicationTarget {
        server_id: s.clone(),
        placement_id: PlacementId::random(),
        partition_id: entry.partition_id,
        keyrange_begin: entry.keyrange_begin.clone(),
        keyrange_end: keyrange_end.clone(),
        is_joining: false,
      })
      .collect();

    Ok(PartitionDiscoveryResponse {
      code,
      txnid: cfg.metadata_txnid,
      txnseq: cfg.metadata_txnseq,
      replication_targets,
      keyrange_begin: Some(entry.keyrange_begin.clone()),
      keyrange_end,
      is_splitting: false,
      split_partition_ids: Vec::new(),
    })
  }

  pub(super) fn discover_partition_metadata_filter(
    server: Server,
  ) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::post()
      .and(warp::path("discover_partition_metadata"))
      .and(warp::body::json())
      .and_then(move |request: PartitionDiscoveryRequest| {
        let server = server.clone();
        async move { Self::warp_discover_partition_metadata(server, request).await }
      })
  }

  async fn warp_discover_partition_metadata(
    server: Server,
    request: PartitionDiscoveryRequest,
  ) -> Result<impl Reply, Infallible> {
    let result = DiscoverPartitionMetadataOp { request }.execute(&server).await;
    match result {
      Ok(response) => Ok(Box::new(warp::reply::with_status(warp::reply::json(&response), StatusCode::OK)) as Box<dyn Reply>),
      Err(e) => Ok(Box::new(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "message": e.to_string() })),
        e.kind.warp_status_code(),
      ))),
    }
  }
}
