use std::collections::HashMap;
use std::convert::Infallible;

use hyper::body::Bytes;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::errors::{ServerError, ServerResult};
use crate::metadata::file::MetadataFile;
use crate::metadata::operation::{MetadataOperation, MetadataOperationResult};
use crate::ops::perform_metadata_operation::PerformMetadataOperationOp;
use crate::ops::traits::ServerOp;
use crate::utils;

use super::Server;

impl Server {
  /// The receiving side of §4.7: apply the operation to this node's copy
  /// of the table's metadata file and report back its checksum. The
  /// caller (another node's `MetadataCoordinator`) decides quorum/
  /// divergence across every server's response.
  pub async fn perform_metadata_operation(
    &self,
    namespace: &str,
    table: &str,
    op: MetadataOperation,
  ) -> ServerResult<MetadataOperationResult> {
    op.validate_tag()?;
    let mut file = self
      .get_metadata_file(namespace, table)
      .await
      .unwrap_or_else(|| MetadataFile::new(Vec::new()));
    file.apply(&op.opdata);
    let checksum = file.checksum()?;
    self.put_metadata_file(namespace, table, file).await;
    Ok(MetadataOperationResult { metadata_file_checksum: checksum })
  }

  pub(super) fn perform_metadata_operation_filter(
    server: Server,
  ) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::post()
      .and(warp::path("perform_metadata_operation"))
      .and(warp::query::<HashMap<String, String>>())
      .and(warp::filters::body::bytes())
      .and_then(move |query: HashMap<String, String>, body: Bytes| {
        let server = server.clone();
        async move { Self::warp_perform_metadata_operation(server, query, body).await }
      })
  }

  async fn warp_perform_metadata_operation(
    server: Server,
    query: HashMap<String, String>,
    body: Bytes,
  ) -> Result<impl Reply, Infallible> {
    Server::log_request("perform_metadata_operation", &body);
    let result = async {
      let namespace = query
        .get("namespace")
        .ok_or_else(|| ServerError::illegal_argument("missing namespace query param"))?;
      let table = query.get("table").ok_or_else(|| ServerError::illegal_argument("missing table query param"))?;
      let op: MetadataOperation = utils::parse_bincode(body)?;
      PerformMetadataOperationOp { namespace: namespace.clone(), table: table.clone(), op }
        .execute(&server)
        .await
    }
    .await;
    utils::result_into_warp(result, StatusCode::CREATED)
  }
}
