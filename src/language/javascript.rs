use std::fs;

use log::debug;
use tokio::process::Command;

use crate::context::{ExecutionContext, ExecutionOutput, ExecutionRequest};
use crate::engine::EngineConfig;
use crate::language::protocol::parse_report;
use crate::language::{base_env, LanguageExecutor, RawOutcome};
use crate::CatGateError;

const WRAPPER: &str = include_str!("../../assets/sandbox.js");

/// Runs JavaScript inside the vm2 based wrapper and reads its line protocol
pub struct JavaScriptExecutor;

impl LanguageExecutor for JavaScriptExecutor {
  fn prepare(
    &self,
    context: &ExecutionContext,
    request: &ExecutionRequest,
    config: &EngineConfig,
  ) -> Result<Command, CatGateError> {
    let wrapper = context.path().join("sandbox.js");
    let source = context.source_path("js");
    fs::write(&wrapper, WRAPPER)?;
    fs::write(&source, request.code())?;

    let mut command = Command::new(&config.node);
    command
      .arg(&wrapper)
      .arg(&source)
      .arg(request.timeout_seconds().to_string())
      .arg(context.plot_path());
    base_env(&mut command, context, config);
    if let Some(node_path) = &config.node_path {
      command.env("NODE_PATH", node_path);
    }
    Ok(command)
  }

  fn interpret(&self, context: &ExecutionContext, outcome: RawOutcome) -> Result<ExecutionOutput, CatGateError> {
    let stdout = String::from_utf8_lossy(&outcome.stdout);
    let report = parse_report(&stdout);
    let image = context.take_plot()?;

    if let Some(error) = report.error {
      debug!("JavaScript wrapper reported {}", error);
      return Err(CatGateError::execution(error.to_string()));
    }
    if !outcome.status.success() {
      let stderr = String::from_utf8_lossy(&outcome.stderr);
      return Err(CatGateError::execution(format!("Execution error: {}", stderr.trim_end())));
    }

    Ok(ExecutionOutput {
      value: None,
      stdout: report.output.join("\n"),
      image,
    })
  }
}
