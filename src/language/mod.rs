use std::collections::HashMap;
use std::fmt::Display;
use std::process::ExitStatus;
use std::str::FromStr;

use lazy_static::lazy_static;
use tokio::process::Command;

use crate::context::{ExecutionContext, ExecutionOutput, ExecutionRequest};
use crate::engine::EngineConfig;
use crate::CatGateError;

pub use javascript::JavaScriptExecutor;
pub use python::PythonExecutor;

pub mod protocol;

mod javascript;
mod python;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
  Python,
  JavaScript,
}

lazy_static! {
  static ref DETECT_LANGUAGE_MAP: HashMap<&'static str, Language> = {
    let mut map = HashMap::new();
    map.insert("py", Language::Python);
    map.insert("python", Language::Python);
    map.insert("python3", Language::Python);
    map.insert("js", Language::JavaScript);
    map.insert("javascript", Language::JavaScript);
    map.insert("node", Language::JavaScript);
    map.insert("nodejs", Language::JavaScript);
    map
  };
}

/// What the execution context left behind once it exited
#[derive(Debug)]
pub struct RawOutcome {
  pub status: ExitStatus,
  pub stdout: Vec<u8>,
  pub stderr: Vec<u8>,
}

/// Language specific half of an execution: how to start the context and
/// how to read its outcome
pub trait LanguageExecutor: Send + Sync {
  /// Write the sources into the workspace and return the command to spawn
  fn prepare(
    &self,
    context: &ExecutionContext,
    request: &ExecutionRequest,
    config: &EngineConfig,
  ) -> Result<Command, CatGateError>;

  /// Turn a finished context into a result or a classified error
  fn interpret(&self, context: &ExecutionContext, outcome: RawOutcome) -> Result<ExecutionOutput, CatGateError>;
}

impl Language {
  pub fn executor(&self) -> &'static dyn LanguageExecutor {
    match self {
      Language::Python => &PythonExecutor,
      Language::JavaScript => &JavaScriptExecutor,
    }
  }
}

impl FromStr for Language {
  type Err = CatGateError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    DETECT_LANGUAGE_MAP
      .get(s.to_ascii_lowercase().as_str())
      .copied()
      .ok_or_else(|| CatGateError::validation(format!("Unsupported language: {}", s)))
  }
}

impl Display for Language {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Language::Python => f.write_str("python"),
      Language::JavaScript => f.write_str("javascript"),
    }
  }
}

/// Base environment of every context: PATH, HOME inside the workspace and a UTF-8 locale
pub(crate) fn base_env(command: &mut Command, context: &ExecutionContext, config: &EngineConfig) {
  command
    .env_clear()
    .env("PATH", std::env::var("PATH").unwrap_or_default())
    .env("HOME", context.path())
    .env("LANG", "C.UTF-8")
    .env("MPLBACKEND", "Agg")
    .current_dir(context.path());
  for (key, value) in config.env.iter() {
    command.env(key, value);
  }
}
