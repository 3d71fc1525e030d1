use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use log::warn;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::{DEFAULT_EXEC_TIMEOUT, DEFAULT_FILES_DIR, MAX_EXEC_TIMEOUT, MAX_FILE_SIZE, MULTIPART_OVERHEAD};
use crate::engine::IsolationEngine;
use crate::registry::normalize_session_id;
use crate::CatGateError;

mod exec;
mod files;
mod process;

pub use process::{read_process_table, ProcessInfo};

/// Settings of the backend served inside a compute unit
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  pub files_dir: PathBuf,
  pub max_file_size: usize,
  pub default_timeout: u64,
  pub max_timeout: u64,
}

pub struct RuntimeState {
  engine: IsolationEngine,
  config: RuntimeConfig,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    RuntimeConfig {
      files_dir: PathBuf::from(DEFAULT_FILES_DIR),
      max_file_size: MAX_FILE_SIZE,
      default_timeout: DEFAULT_EXEC_TIMEOUT,
      max_timeout: MAX_EXEC_TIMEOUT,
    }
  }
}

impl RuntimeConfig {
  /// Upload directory of one session
  pub fn session_dir(&self, session: &str) -> Result<PathBuf, CatGateError> {
    Ok(self.files_dir.join(normalize_session_id(session)?))
  }
}

impl RuntimeState {
  pub fn new(engine: IsolationEngine, config: RuntimeConfig) -> Self {
    RuntimeState { engine, config }
  }

  pub fn engine(&self) -> &IsolationEngine {
    &self.engine
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }
}

/// Reject requests whose declared size exceeds the upload cap
async fn limit_upload_size(State(state): State<Arc<RuntimeState>>, request: Request, next: Next) -> Response {
  let max = state.config.max_file_size;
  let declared = request
    .headers()
    .get(CONTENT_LENGTH)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| value.parse::<usize>().ok());

  match declared {
    Some(length) if length > max => {
      warn!("Reject request of {} bytes to {}", length, request.uri().path());
      CatGateError::resource_limit(format!("File too large. Max size is {}", max)).into_response()
    }
    _ => next.run(request).await,
  }
}

/// Routes served by a compute unit (and by the gateway's local backend)
pub fn router(state: Arc<RuntimeState>) -> Router {
  let max_body = state.config.max_file_size + MULTIPART_OVERHEAD;

  Router::new()
    .route("/:session/processes", get(process::list_processes))
    .route("/:session/process/kill/:pid", post(process::kill_process))
    .route("/:session/files/upload", post(files::upload_file))
    .route("/:session/files/download/:name", get(files::download_file))
    .route("/:session/files/delete/:name", delete(files::delete_file))
    .route("/:session/exec/python", post(exec::execute_python))
    .route("/:session/exec/nodejs", post(exec::execute_nodejs))
    .layer(DefaultBodyLimit::disable())
    .layer(RequestBodyLimitLayer::new(max_body))
    .layer(middleware::from_fn_with_state(state.clone(), limit_upload_size))
    .with_state(state)
}
