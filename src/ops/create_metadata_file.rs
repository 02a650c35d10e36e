use async_trait::async_trait;

use crate::errors::ServerResult;
use crate::metadata::file::MetadataFile;
use crate::ops::traits::ServerOp;
use crate::server::Server;

pub struct CreateMetadataFileOp {
  pub namespace: String,
  pub table: String,
  pub file: MetadataFile,
}

#[async_trait]
impl ServerOp for CreateMetadataFileOp {
  type Response = ();

  async fn execute(&self, server: &Server) -> ServerResult<()> {
    server.create_metadata_file(&self.namespace, &self.table, self.file.clone()).await
  }
}
