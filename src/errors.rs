use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

use warp::http::StatusCode;

/// The error taxonomy surfaced by every component in this crate.
///
/// `kind` drives both the HTTP status mapping at the RPC boundary
/// (`ServerErrorKind::warp_status_code`) and the retry behavior callers
/// apply (e.g. compaction/split failures are logged and retried, never
/// fatal).
#[derive(Clone, Debug)]
pub struct ServerError {
  message: String,
  pub kind: ServerErrorKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerErrorKind {
  /// Operation attempted on a frozen/unloaded partition.
  IllegalState,
  /// Too many segments; inserts must back off.
  Overloaded,
  /// Optimistic-concurrency violation.
  ConcurrentModification,
  /// Empty server list, malformed key, non-serving partition for split, etc.
  IllegalArgument,
  /// Disk or RPC failure.
  IOError,
  /// Catch-all: no suitable split point, quorum failed, checksum divergence.
  Runtime,
}

impl ServerErrorKind {
  pub fn warp_status_code(&self) -> StatusCode {
    match self {
      ServerErrorKind::IllegalState => StatusCode::BAD_REQUEST,
      ServerErrorKind::Overloaded => StatusCode::TOO_MANY_REQUESTS,
      ServerErrorKind::ConcurrentModification => StatusCode::CONFLICT,
      ServerErrorKind::IllegalArgument => StatusCode::BAD_REQUEST,
      ServerErrorKind::IOError => StatusCode::INTERNAL_SERVER_ERROR,
      ServerErrorKind::Runtime => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl ServerError {
  fn new(kind: ServerErrorKind, message: impl Into<String>) -> ServerError {
    ServerError { kind, message: message.into() }
  }

  pub fn illegal_state(explanation: impl Into<String>) -> ServerError {
    Self::new(ServerErrorKind::IllegalState, explanation)
  }

  pub fn overloaded(explanation: impl Into<String>) -> ServerError {
    Self::new(ServerErrorKind::Overloaded, explanation)
  }

  pub fn concurrent_modification(explanation: impl Into<String>) -> ServerError {
    Self::new(ServerErrorKind::ConcurrentModification, explanation)
  }

  pub fn illegal_argument(explanation: impl Into<String>) -> ServerError {
    Self::new(ServerErrorKind::IllegalArgument, explanation)
  }

  pub fn io_error(explanation: impl Into<String>) -> ServerError {
    Self::new(ServerErrorKind::IOError, explanation)
  }

  pub fn runtime(explanation: impl Into<String>) -> ServerError {
    Self::new(ServerErrorKind::Runtime, explanation)
  }
}

impl Display for ServerError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    let prefix = match &self.kind {
      ServerErrorKind::IllegalState => "illegal state",
      ServerErrorKind::Overloaded => "overloaded",
      ServerErrorKind::ConcurrentModification => "concurrent modification",
      ServerErrorKind::IllegalArgument => "invalid argument",
      ServerErrorKind::IOError => "io error",
      ServerErrorKind::Runtime => "runtime error",
    };
    write!(f, "{}; {}", prefix, self.message)
  }
}

impl Error for ServerError {}

impl From<std::io::Error> for ServerError {
  fn from(e: std::io::Error) -> Self {
    ServerError::io_error(e.to_string())
  }
}

impl From<serde_json::Error> for ServerError {
  fn from(e: serde_json::Error) -> Self {
    ServerError::io_error(format!("serde_json: {}", e))
  }
}

impl From<bincode::Error> for ServerError {
  fn from(e: bincode::Error) -> Self {
    ServerError::io_error(format!("bincode: {}", e))
  }
}

impl From<reqwest::Error> for ServerError {
  fn from(e: reqwest::Error) -> Self {
    ServerError::io_error(format!("reqwest: {}", e))
  }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Extension for attaching a lazily-formatted context message to a
/// `ServerResult`'s error without discarding its kind.
pub trait Contextable<T> {
  fn with_context<F: FnOnce() -> String>(self, f: F) -> ServerResult<T>;
}

impl<T> Contextable<T> for ServerResult<T> {
  fn with_context<F: FnOnce() -> String>(self, f: F) -> ServerResult<T> {
    self.map_err(|e| ServerError { kind: e.kind.clone(), message: format!("{}: {}", f(), e) })
  }
}
