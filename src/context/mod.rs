use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::debug;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tempfile::TempDir;

use crate::config::DEFAULT_EXEC_TIMEOUT;
use crate::language::Language;
use crate::CatGateError;

/// One code submission
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
  code: String,
  timeout: u64,
  language: Language,
}

/// Successful result of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionOutput {
  /// Value of the trailing expression
  #[serde(rename = "result")]
  pub value: Option<Value>,
  #[serde(rename = "output")]
  pub stdout: String,
  /// PNG bytes of the generated plot, base64 on the wire
  #[serde(serialize_with = "serialize_image")]
  pub image: Option<Vec<u8>>,
}

/// Disposable workspace of a single execution, removed on drop
pub struct ExecutionContext {
  workspace: TempDir,
}

fn serialize_image<S: Serializer>(image: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
  match image {
    Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
    None => serializer.serialize_none(),
  }
}

impl ExecutionRequest {
  pub fn new<CS: Into<String>>(language: Language, code: CS) -> Self {
    ExecutionRequest {
      code: code.into(),
      timeout: DEFAULT_EXEC_TIMEOUT,
      language,
    }
  }

  /// Set timeout (unit: second)
  pub fn timeout(mut self, seconds: u64) -> Self {
    self.timeout = seconds;
    self
  }

  pub fn code(&self) -> &str {
    &self.code
  }

  pub fn timeout_seconds(&self) -> u64 {
    self.timeout
  }

  pub fn language(&self) -> Language {
    self.language
  }
}

impl ExecutionContext {
  /// Create a fresh workspace under `root`, or the system temp dir
  pub fn create(root: Option<&Path>) -> Result<Self, CatGateError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("catgate-");
    let workspace = match root {
      Some(root) => builder.tempdir_in(root)?,
      None => builder.tempdir()?,
    };
    debug!("Create execution workspace {}", workspace.path().to_string_lossy());
    Ok(ExecutionContext { workspace })
  }

  pub fn path(&self) -> &Path {
    self.workspace.path()
  }

  /// Path of the submitted source with the given extension
  pub fn source_path(&self, extension: &str) -> PathBuf {
    self.path().join(format!("main.{}", extension))
  }

  /// Path where the runner leaves its JSON report
  pub fn report_path(&self) -> PathBuf {
    self.path().join("report.json")
  }

  /// Path where a generated plot is written
  pub fn plot_path(&self) -> PathBuf {
    self.path().join("plot.png")
  }

  /// Read and remove the plot, if one was generated
  pub fn take_plot(&self) -> Result<Option<Vec<u8>>, CatGateError> {
    let path = self.plot_path();
    if !path.exists() {
      return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    std::fs::remove_file(&path)?;
    debug!("Collect plot image ({} bytes)", bytes.len());
    Ok(Some(bytes))
  }

  /// Remove the workspace now, reporting failures
  pub fn close(self) {
    let path = self.path().to_path_buf();
    if let Err(err) = self.workspace.close() {
      log::error!("Fails removing workspace {}: {}", path.to_string_lossy(), err);
    }
  }
}
