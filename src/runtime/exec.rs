use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use log::{info, warn};
use serde::Deserialize;

use crate::context::{ExecutionOutput, ExecutionRequest};
use crate::language::Language;
use crate::registry::normalize_session_id;
use crate::runtime::RuntimeState;
use crate::CatGateError;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
  pub code: String,
  pub timeout: Option<u64>,
}

async fn execute(
  state: Arc<RuntimeState>,
  session: String,
  language: Language,
  body: Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<ExecutionOutput>, CatGateError> {
  let session = normalize_session_id(&session)?;
  let Json(body) = body.map_err(|rejection| CatGateError::validation(rejection.body_text()))?;

  let timeout = body.timeout.unwrap_or(state.config.default_timeout);
  if timeout == 0 || timeout > state.config.max_timeout {
    return Err(CatGateError::validation(format!(
      "Timeout should be between 1 and {} seconds",
      state.config.max_timeout
    )));
  }

  info!("Session {} runs {} code (timeout = {}s)", session, language, timeout);
  let request = ExecutionRequest::new(language, body.code).timeout(timeout);
  match state.engine.run(&request).await {
    Ok(output) => Ok(Json(output)),
    Err(err) => {
      warn!("Session {} execution fails: {}", session, err);
      Err(err)
    }
  }
}

pub async fn execute_python(
  State(state): State<Arc<RuntimeState>>,
  Path(session): Path<String>,
  body: Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<ExecutionOutput>, CatGateError> {
  execute(state, session, Language::Python, body).await
}

pub async fn execute_nodejs(
  State(state): State<Arc<RuntimeState>>,
  Path(session): Path<String>,
  body: Result<Json<CodeRequest>, JsonRejection>,
) -> Result<Json<ExecutionOutput>, CatGateError> {
  execute(state, session, Language::JavaScript, body).await
}
