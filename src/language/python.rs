use std::fs;

use log::{debug, warn};
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::context::{ExecutionContext, ExecutionOutput, ExecutionRequest};
use crate::engine::EngineConfig;
use crate::language::{base_env, LanguageExecutor, RawOutcome};
use crate::CatGateError;

const RUNNER: &str = include_str!("../../assets/python_runner.py");

/// Runs Python source with REPL style "last expression is the result" semantics
pub struct PythonExecutor;

/// JSON report left by the runner script
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum RunnerReport {
  Success {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    stdout: String,
  },
  SyntaxError {
    message: String,
  },
  InputUnavailable {
    message: String,
  },
  RuntimeError {
    message: String,
  },
}

impl LanguageExecutor for PythonExecutor {
  fn prepare(
    &self,
    context: &ExecutionContext,
    request: &ExecutionRequest,
    config: &EngineConfig,
  ) -> Result<Command, CatGateError> {
    let runner = context.path().join("runner.py");
    let source = context.source_path("py");
    fs::write(&runner, RUNNER)?;
    fs::write(&source, request.code())?;

    let mut command = Command::new(&config.python);
    command
      .arg("-B")
      .arg(&runner)
      .arg(&source)
      .arg(context.report_path())
      .arg(context.plot_path());
    base_env(&mut command, context, config);
    command
      .env("PYTHONDONTWRITEBYTECODE", "1")
      .env("MPLCONFIGDIR", context.path());
    Ok(command)
  }

  fn interpret(&self, context: &ExecutionContext, outcome: RawOutcome) -> Result<ExecutionOutput, CatGateError> {
    let report = match fs::read_to_string(context.report_path()) {
      Ok(text) => text,
      Err(_) => {
        warn!(
          "Python runner left no report (status {}): {}",
          outcome.status,
          String::from_utf8_lossy(&outcome.stderr).trim_end()
        );
        return Err(CatGateError::infrastructure("No result returned"));
      }
    };

    match serde_json::from_str::<RunnerReport>(&report)? {
      RunnerReport::Success { value, stdout } => {
        debug!("Python runner finished, value = {:?}", value);
        Ok(ExecutionOutput {
          value: value.filter(|value| !value.is_null()),
          stdout,
          image: context.take_plot()?,
        })
      }
      RunnerReport::SyntaxError { message } => Err(CatGateError::validation(format!("Syntax error: {}", message))),
      RunnerReport::InputUnavailable { message } => {
        debug!("Python code tried to read stdin: {}", message);
        Err(CatGateError::execution("Cannot read input (stdin is closed)"))
      }
      RunnerReport::RuntimeError { message } => Err(CatGateError::execution(message)),
    }
  }
}
