use std::convert::Infallible;

use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use warp::http::{Response, StatusCode};
use warp::Reply;

use crate::errors::{ServerError, ServerResult};

#[derive(Serialize)]
struct ErrorResponse {
  message: String,
}

pub fn parse_bincode<T: serde::de::DeserializeOwned>(body: Bytes) -> ServerResult<T> {
  bincode::deserialize(&body).map_err(|e| ServerError::illegal_argument(format!("malformed request body: {}", e)))
}

/// Turns a `ServerResult` into a warp reply: `success_status` with a
/// bincode body on `Ok`, or the error's mapped status with a JSON error
/// message on `Err`. All non-2xx bodies in this core are error messages.
pub fn result_into_warp<T: Serialize>(
  res: ServerResult<T>,
  success_status: StatusCode,
) -> Result<Box<dyn Reply>, Infallible> {
  match res {
    Ok(value) => match bincode::serialize(&value) {
      Ok(body) => Ok(Box::new(warp::reply::with_status(body, success_status))),
      Err(e) => Ok(Box::new(warp::reply::with_status(
        warp::reply::json(&ErrorResponse { message: format!("failed to encode response: {}", e) }),
        StatusCode::INTERNAL_SERVER_ERROR,
      ))),
    },
    Err(e) => {
      let reply = warp::reply::json(&ErrorResponse { message: e.to_string() });
      Ok(Box::new(warp::reply::with_status(reply, e.kind.warp_status_code())))
    }
  }
}

pub fn empty_reply(success_status: StatusCode) -> Response<Bytes> {
  let mut resp = Response::new(Bytes::new());
  *resp.status_mut() = success_status;
  resp
}
