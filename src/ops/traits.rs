use async_trait::async_trait;

use crate::errors::ServerResult;
use crate::server::Server;

/// An RPC-facing unit of work. Unlike a partition-scoped operation,
/// these three (metadata perform/create/discover) never need a caller-held
/// lock keyed by table or partition: the coordinator's optimistic txnid
/// check and the partition writer's own locks already serialize the
/// state they touch.
#[async_trait]
pub trait ServerOp {
  type Response;

  async fn execute(&self, server: &Server) -> ServerResult<Self::Response>;
}
