use async_trait::async_trait;

use crate::discovery::{PartitionDiscoveryRequest, PartitionDiscoveryResponse};
use crate::errors::ServerResult;
use crate::ops::traits::ServerOp;
use crate::server::Server;

pub struct DiscoverPartitionMetadataOp {
  pub request: PartitionDiscoveryRequest,
}

#[async_trait]
impl ServerOp for DiscoverPartitionMetadataOp {
  type Response = PartitionDiscoveryResponse;

  async fn execute(&self, server: &Server) -> ServerResult<PartitionDiscoveryResponse> {
    server.discover_partition_metadata(self.request.clone()).await
  }
}
