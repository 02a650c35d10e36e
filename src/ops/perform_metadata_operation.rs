use async_trait::async_trait;

use crate::errors::ServerResult;
use crate::metadata::operation::{MetadataOperation, MetadataOperationResult};
use crate::ops::traits::ServerOp;
use crate::server::Server;

pub struct PerformMetadataOperationOp {
  pub namespace: String,
  pub table: String,
  pub op: MetadataOperation,
}

#[async_trait]
impl ServerOp for PerformMetadataOperationOp {
  type Response = MetadataOperationResult;

  async fn execute(&self, server: &Server) -> ServerResult<MetadataOperationResult> {
    server.perform_metadata_operation(&self.namespace, &self.table, self.op.clone()).await
  }
}
