use std::io::ErrorKind;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, info};
use serde_json::{json, Value};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::runtime::RuntimeState;
use crate::CatGateError;

/// A plain file name inside the session directory
fn checked_name(name: String) -> Result<String, CatGateError> {
  let invalid = name.is_empty()
    || name == "."
    || name == ".."
    || name.contains(|c| c == '/' || c == '\\' || c == '\0');
  if invalid {
    Err(CatGateError::validation(format!("Invalid file name {:?}", name)))
  } else {
    Ok(name)
  }
}

fn multipart_error(err: MultipartError) -> CatGateError {
  if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
    CatGateError::resource_limit(err.body_text())
  } else {
    CatGateError::validation(err.body_text())
  }
}

pub async fn upload_file(
  State(state): State<Arc<RuntimeState>>,
  Path(session): Path<String>,
  mut multipart: Multipart,
) -> Result<Json<Value>, CatGateError> {
  let dir = state.config.session_dir(&session)?;
  let max = state.config.max_file_size;

  while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
    if field.name() != Some("file") {
      continue;
    }
    let name = field
      .file_name()
      .map(|name| name.to_string())
      .ok_or_else(|| CatGateError::validation("Missing file name"))?;
    let name = checked_name(name)?;
    let path = dir.join(&name);
    if fs::try_exists(&path).await? {
      return Err(CatGateError::conflict(format!("File {} already exists", name)));
    }

    let content = field.bytes().await.map_err(multipart_error)?;
    if content.len() > max {
      return Err(CatGateError::resource_limit(format!("Uploaded file exceeds {} bytes", max)));
    }

    fs::create_dir_all(&dir).await?;
    let mut file = OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(&path)
      .await
      .map_err(|err| match err.kind() {
        ErrorKind::AlreadyExists => CatGateError::conflict(format!("File {} already exists", name)),
        _ => CatGateError::from(err),
      })?;
    if let Err(err) = file.write_all(&content).await {
      error!("Failed to upload file due to {}", err);
      drop(file);
      let _ = fs::remove_file(&path).await;
      return Err(err.into());
    }
    file.flush().await?;

    info!("Session {} uploaded {} ({} bytes)", session, name, content.len());
    return Ok(Json(json!({ "message": format!("Uploaded file {}", name) })));
  }

  Err(CatGateError::validation("Missing file field"))
}

pub async fn download_file(
  State(state): State<Arc<RuntimeState>>,
  Path((session, name)): Path<(String, String)>,
) -> Result<Response, CatGateError> {
  let name = checked_name(name)?;
  let path = state.config.session_dir(&session)?.join(&name);
  if !fs::try_exists(&path).await? {
    return Err(CatGateError::not_found("File not found"));
  }

  let content = fs::read(&path).await?;
  let headers = [
    (CONTENT_TYPE, "application/octet-stream".to_string()),
    (CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", name)),
  ];
  Ok((headers, content).into_response())
}

pub async fn delete_file(
  State(state): State<Arc<RuntimeState>>,
  Path((session, name)): Path<(String, String)>,
) -> Result<Json<Value>, CatGateError> {
  let name = checked_name(name)?;
  let path = state.config.session_dir(&session)?.join(&name);
  if !fs::try_exists(&path).await? {
    return Err(CatGateError::not_found(format!("File {} not found", name)));
  }

  fs::remove_file(&path).await?;
  info!("Session {} deleted {}", session, name);
  Ok(Json(json!({ "message": format!("Deleted file {}", name) })))
}
