use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::response::Response;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::LengthLimitError;
use log::{debug, error, warn};
use reqwest::Client;

use crate::CatGateError;

/// Connection-scoped headers that never cross the proxy
const HOP_BY_HOP: [HeaderName; 8] = [
  header::CONNECTION,
  header::PROXY_AUTHENTICATE,
  header::PROXY_AUTHORIZATION,
  header::TE,
  header::TRAILER,
  header::TRANSFER_ENCODING,
  header::UPGRADE,
  header::HOST,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
  HOP_BY_HOP.contains(name) || name.as_str() == "keep-alive"
}

fn end_to_end(headers: &HeaderMap, skip_length: bool) -> HeaderMap {
  let mut result = HeaderMap::new();
  for (name, value) in headers {
    if is_hop_by_hop(name) || (skip_length && name == header::CONTENT_LENGTH) {
      continue;
    }
    result.append(name.clone(), value.clone());
  }
  result
}

fn body_error(err: axum::Error, max_body: usize) -> CatGateError {
  let inner = err.into_inner();
  if inner.is::<LengthLimitError>() {
    CatGateError::resource_limit(format!("File too large. Max size is {}", max_body))
  } else {
    CatGateError::validation(format!("Failed to read request body: {}", inner))
  }
}

fn forward_error(err: reqwest::Error) -> CatGateError {
  error!("Error forwarding request: {}", err);
  if err.is_timeout() {
    CatGateError::timeout("Upstream request timed out")
  } else {
    CatGateError::infrastructure("Failed to forward request")
  }
}

/// Replay the request against `base` and relay the upstream response.
///
/// The request body is buffered (at most `max_body` bytes); the response body is streamed.
pub async fn forward(
  client: &Client,
  base: &str,
  request: Request,
  max_body: usize,
) -> Result<Response, CatGateError> {
  let (parts, body) = request.into_parts();
  let target = parts
    .uri
    .path_and_query()
    .map(|path| path.as_str())
    .unwrap_or("/");
  let url = format!("{}{}", base.trim_end_matches('/'), target);

  let body: Bytes = to_bytes(body, max_body)
    .await
    .map_err(|err| body_error(err, max_body))?;
  debug!("Forward {} {} ({} bytes)", parts.method, url, body.len());

  let upstream = client
    .request(parts.method, &url)
    .headers(end_to_end(&parts.headers, true))
    .body(body)
    .send()
    .await
    .map_err(forward_error)?;

  let status = upstream.status();
  let headers = end_to_end(upstream.headers(), false);
  let stream = upstream
    .bytes_stream()
    .inspect_err(move |err| warn!("Upstream body of {} broken: {}", url, err));

  let mut response = Response::new(Body::from_stream(stream));
  *response.status_mut() = status;
  *response.headers_mut() = headers;
  Ok(response)
}
