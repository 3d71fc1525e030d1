use std::{
  error::Error,
  fmt::{Debug, Display},
  io::ErrorKind,
};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use flexi_logger::FlexiLoggerError;
use nix::errno::Errno;
use serde_json::json;

pub enum CatGateError {
  Validation(String),
  ResourceLimit(String),
  Timeout(String),
  NotFound(String),
  Conflict(String),
  Permission(String),
  Execution(String),
  Infrastructure(String),
  Logger(FlexiLoggerError),
}

impl CatGateError {
  pub fn validation<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::Validation(msg.into())
  }

  pub fn resource_limit<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::ResourceLimit(msg.into())
  }

  pub fn timeout<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::Timeout(msg.into())
  }

  pub fn not_found<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::NotFound(msg.into())
  }

  pub fn conflict<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::Conflict(msg.into())
  }

  pub fn permission<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::Permission(msg.into())
  }

  pub fn execution<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::Execution(msg.into())
  }

  pub fn infrastructure<MS: Into<String>>(msg: MS) -> CatGateError {
    CatGateError::Infrastructure(msg.into())
  }

  /// HTTP status answered for this error
  pub fn status_code(&self) -> StatusCode {
    match &self {
      CatGateError::Validation(_) => StatusCode::BAD_REQUEST,
      CatGateError::ResourceLimit(_) => StatusCode::PAYLOAD_TOO_LARGE,
      CatGateError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
      CatGateError::NotFound(_) => StatusCode::NOT_FOUND,
      CatGateError::Conflict(_) => StatusCode::CONFLICT,
      CatGateError::Permission(_) => StatusCode::FORBIDDEN,
      CatGateError::Execution(_) => StatusCode::BAD_REQUEST,
      CatGateError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
      CatGateError::Logger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// Message without the kind prefix, used as response detail
  pub fn message(&self) -> String {
    match &self {
      CatGateError::Validation(msg)
      | CatGateError::ResourceLimit(msg)
      | CatGateError::Timeout(msg)
      | CatGateError::NotFound(msg)
      | CatGateError::Conflict(msg)
      | CatGateError::Permission(msg)
      | CatGateError::Execution(msg)
      | CatGateError::Infrastructure(msg) => msg.clone(),
      CatGateError::Logger(err) => err.to_string(),
    }
  }
}

impl Debug for CatGateError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for CatGateError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      CatGateError::Validation(msg) => f.write_fmt(format_args!("CatGate Validation Error: {}", msg)),
      CatGateError::ResourceLimit(msg) => f.write_fmt(format_args!("CatGate Resource Limit Error: {}", msg)),
      CatGateError::Timeout(msg) => f.write_fmt(format_args!("CatGate Timeout Error: {}", msg)),
      CatGateError::NotFound(msg) => f.write_fmt(format_args!("CatGate Not Found Error: {}", msg)),
      CatGateError::Conflict(msg) => f.write_fmt(format_args!("CatGate Conflict Error: {}", msg)),
      CatGateError::Permission(msg) => f.write_fmt(format_args!("CatGate Permission Error: {}", msg)),
      CatGateError::Execution(msg) => f.write_fmt(format_args!("CatGate Execution Error: {}", msg)),
      CatGateError::Infrastructure(msg) => f.write_fmt(format_args!("CatGate Infrastructure Error: {}", msg)),
      CatGateError::Logger(err) => f.write_fmt(format_args!("CatGate Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for CatGateError {
  fn from(errno: Errno) -> Self {
    match errno {
      Errno::ESRCH => CatGateError::NotFound(errno.desc().to_string()),
      Errno::EPERM | Errno::EACCES => CatGateError::Permission("Permission denied".to_string()),
      _ => CatGateError::Infrastructure(errno.desc().to_string()),
    }
  }
}

impl From<std::io::Error> for CatGateError {
  fn from(err: std::io::Error) -> Self {
    match err.kind() {
      ErrorKind::NotFound => CatGateError::NotFound(err.to_string()),
      ErrorKind::PermissionDenied => CatGateError::Permission("Permission denied".to_string()),
      ErrorKind::AlreadyExists => CatGateError::Conflict(err.to_string()),
      _ => CatGateError::Infrastructure(err.to_string()),
    }
  }
}

impl From<reqwest::Error> for CatGateError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      CatGateError::Timeout(format!("Upstream request timed out: {}", err))
    } else {
      CatGateError::Infrastructure(err.to_string())
    }
  }
}

impl From<serde_json::Error> for CatGateError {
  fn from(err: serde_json::Error) -> Self {
    CatGateError::Infrastructure(format!("Malformed JSON: {}", err))
  }
}

impl From<FlexiLoggerError> for CatGateError {
  fn from(err: FlexiLoggerError) -> Self {
    CatGateError::Logger(err)
  }
}

impl Error for CatGateError {}

impl IntoResponse for CatGateError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    (status, Json(json!({ "detail": self.message() }))).into_response()
  }
}
