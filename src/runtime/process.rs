use std::fs;
use std::path::Path as FsPath;

use axum::extract::Path;
use axum::Json;
use log::{debug, info};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use serde_json::{json, Value};

use crate::CatGateError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
  pub pid: i32,
  pub name: String,
  pub cmdline: Vec<String>,
}

fn read_process(dir: &FsPath, pid: i32) -> std::io::Result<ProcessInfo> {
  let name = fs::read_to_string(dir.join("comm"))?.trim_end().to_string();
  let cmdline = fs::read(dir.join("cmdline"))?
    .split(|b| *b == 0)
    .filter(|arg| !arg.is_empty())
    .map(|arg| String::from_utf8_lossy(arg).to_string())
    .collect();
  Ok(ProcessInfo { pid, name, cmdline })
}

/// Snapshot of the OS process table
pub fn read_process_table() -> Result<Vec<ProcessInfo>, CatGateError> {
  let mut processes = vec![];
  for entry in fs::read_dir("/proc")? {
    let entry = entry?;
    let Some(pid) = entry.file_name().to_str().and_then(|name| name.parse::<i32>().ok()) else {
      continue;
    };
    match read_process(&entry.path(), pid) {
      Ok(process) => processes.push(process),
      // 进程已退出或无权读取
      Err(err) => debug!("Skip process {}: {}", pid, err),
    }
  }
  processes.sort_by_key(|process| process.pid);
  Ok(processes)
}

pub async fn list_processes(Path(_session): Path<String>) -> Result<Json<Value>, CatGateError> {
  let processes = tokio::task::spawn_blocking(read_process_table)
    .await
    .map_err(|err| CatGateError::infrastructure(err.to_string()))??;
  Ok(Json(json!({ "processes": processes })))
}

pub async fn kill_process(Path((session, pid)): Path<(String, i32)>) -> Result<Json<Value>, CatGateError> {
  if pid <= 0 {
    return Err(CatGateError::validation(format!("Invalid pid {}", pid)));
  }

  kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|errno| match errno {
    Errno::ESRCH => CatGateError::not_found("Process not found"),
    errno => CatGateError::from(errno),
  })?;

  info!("Session {} terminated process {}", session, pid);
  Ok(Json(json!({ "message": format!("Process {} terminated", pid) })))
}
