use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use hyper::Server as HyperServer;
use structopt::StructOpt;
use tower::make::Shared;
use tower::ServiceBuilder;
use tower_http::add_extension::AddExtensionLayer;

use crate::logging::Logger;
use crate::metadata::directory::{ConfigDirectory, FileConfigDirectory};
use crate::opt::Opt;
use crate::server::Server;
use crate::types::ServerId;

mod arena;
mod compaction;
mod discovery;
mod file_tracker;
mod logging;
mod opt;
mod partition_reader;
mod record;
mod segment;
mod server;
mod server_allocator;
mod skip_index;
mod snapshot;
mod storage;
mod types;
mod utils;
mod writer;

pub mod constants;
pub mod errors;
pub mod metadata;
pub mod ops;

static LOGGER: Logger = Logger;

#[tokio::main]
async fn main() {
  let opt: Opt = Opt::from_args();
  opt.validate();
  log::set_max_level(opt.log_level);
  log::set_logger(&LOGGER).expect("unable to initialize logging");

  let server_id = ServerId(format!("server-{}", opt.port));
  let directory: Arc<dyn ConfigDirectory> = Arc::new(
    FileConfigDirectory::open(&opt.dir, server_id)
      .await
      .expect("unable to open config directory"),
  );
  let server = Server::with_allocator(directory, opt.clone())
    .await
    .expect("unable to initialize server");

  let backgrounds = server.init().await.expect("unable to start background loops");
  log::info!("initialized background commit/compaction loops in dir {:?}", opt.dir);

  let filter = server.warp_filter();
  let warp_service = warp::service(filter);
  let tower_service = ServiceBuilder::new()
    .layer(AddExtensionLayer::new(server.clone()))
    .service(warp_service);
  let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], opt.port))).expect("port busy");
  log::info!("bound TCP listener to port {}", opt.port);
  let hyper_future = HyperServer::from_tcp(listener).unwrap().serve(Shared::new(tower_service));
  log::info!("ready to serve metadata rpc requests");

  let outcomes = futures::future::join3(hyper_future, backgrounds.0, backgrounds.1).await;
  outcomes.0.expect("server crashed");
}
