use std::collections::HashMap;
use std::convert::Infallible;

use hyper::body::Bytes;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::errors::{ServerError, ServerResult};
use crate::metadata::file::MetadataFile;
use crate::ops::create_metadata_file::CreateMetadataFileOp;
use crate::ops::traits::ServerOp;
use crate::utils;

use super::Server;

impl Server {
  pub async fn create_metadata_file(&self, namespace: &str, table: &str, file: MetadataFile) -> ServerResult<()> {
    self.put_metadata_file(namespace, table, file).await;
    Ok(())
  }

  pub(super) fn create_metadata_file_filter(server: Server) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::post()
      .and(warp::path("create_metadata_file"))
      .and(warp::query::<HashMap<String, String>>())
      .and(warp::filters::body::bytes())
      .and_then(move |query: HashMap<String, String>, body: Bytes| {
        let server = server.clone();
        async move { Self::warp_create_metadata_file(server, query, body).await }
      })
  }

  async fn warp_create_metadata_file(
    server: Server,
    query: HashMap<String, String>,
    body: Bytes,
  ) -> Result<impl Reply, Infallible> {
    Server::log_request("create_metadata_file", &body);
    let result = async {
      let namespace = query
        .get("namespace")
        .ok_or_else(|| ServerError::illegal_argument("missing namespace query param"))?;
      let table = query.get("table").ok_or_else(|| ServerError::illegal_argument("missing table query param"))?;
      let file: MetadataFile = utils::parse_bincode(body)?;
      CreateMetadataFileOp { namespace: namespace.clone(), table: table.clone(), file }
        .execute(&server)
        .await
    }
    .await;
    utils::result_into_warp(result, StatusCode::CREATED)
  }
}
