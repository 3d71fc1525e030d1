//! Line protocol spoken by the JavaScript sandbox wrapper on its stdout.
//!
//! ```text
//! line   := output | error | other
//! output := "__OUTPUT__:" json-array-of-strings   (null means empty)
//! error  := "__ERROR__:"  json-object { name, message }
//! ```
//!
//! Other lines and lines whose payload does not decode are ignored.
//! When a line type repeats, the last one wins.

use std::fmt::Display;

use log::debug;
use serde::Deserialize;

pub const OUTPUT_PREFIX: &str = "__OUTPUT__:";
pub const ERROR_PREFIX: &str = "__ERROR__:";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorDescriptor {
  #[serde(default = "default_error_name")]
  pub name: String,
  #[serde(default)]
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
  Output(Vec<String>),
  Error(ErrorDescriptor),
}

/// Everything recognized in one run's stdout
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
  pub output: Vec<String>,
  pub error: Option<ErrorDescriptor>,
}

fn default_error_name() -> String {
  "Error".to_string()
}

impl Display for ErrorDescriptor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.name, self.message)
  }
}

pub fn parse_line(line: &str) -> Option<ReportLine> {
  let line = line.trim_end_matches('\r');
  if let Some(payload) = line.strip_prefix(OUTPUT_PREFIX) {
    match serde_json::from_str::<Option<Vec<String>>>(payload) {
      Ok(lines) => Some(ReportLine::Output(lines.unwrap_or_default())),
      Err(err) => {
        debug!("Ignore malformed output line: {}", err);
        None
      }
    }
  } else if let Some(payload) = line.strip_prefix(ERROR_PREFIX) {
    match serde_json::from_str::<ErrorDescriptor>(payload) {
      Ok(error) => Some(ReportLine::Error(error)),
      Err(err) => {
        debug!("Ignore malformed error line: {}", err);
        None
      }
    }
  } else {
    None
  }
}

pub fn parse_report(stdout: &str) -> Report {
  let mut report = Report::default();
  for line in stdout.lines() {
    match parse_line(line) {
      Some(ReportLine::Output(lines)) => report.output = lines,
      Some(ReportLine::Error(error)) => report.error = Some(error),
      None => {}
    }
  }
  report
}
