use std::env;

use flexi_logger::DeferredNow;
use log::{error, info, Record};

use crate::CatGateError;

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Session abc routed to http://10.0.0.7:5858```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

/// Parse `KEY=VALUE`, or `KEY` which copies the value from the current environment
pub fn parse_env<S: AsRef<str>>(text: S) -> Result<(String, String), CatGateError> {
  let text = text.as_ref();
  match text.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    Some(_) => {
      error!("Wrong environment variable string ({}) format", text);
      Err(CatGateError::validation("Wrong environment variable string format"))
    }
    None if !text.is_empty() => {
      let value = env::var(text).unwrap_or_default();
      info!("Read environment variable {} = {}", text, value);
      Ok((text.to_string(), value))
    }
    None => Err(CatGateError::validation("Empty environment variable string")),
  }
}
