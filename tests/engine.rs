use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::info;
use nix::sys::signal::Signal;
use serde_json::json;
use tempfile::tempdir;

use catgate::engine::exceeded_cpu_limit;
use catgate::{CatGateError, EngineConfig, ExecutionRequest, IsolationEngine, Language};

use crate::common::{has_python, has_vm2, setup};

mod common;

fn engine() -> IsolationEngine {
  IsolationEngine::new(EngineConfig::default())
}

/// Dead or zombie
fn is_gone(pid: i32) -> bool {
  match fs::read_to_string(format!("/proc/{}/stat", pid)) {
    Ok(stat) => stat
      .rsplit_once(')')
      .map(|(_, rest)| rest.trim_start().starts_with('Z'))
      .unwrap_or(false),
    Err(_) => true,
  }
}

async fn wait_gone(pid: i32) -> bool {
  for _ in 0..50 {
    if is_gone(pid) {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  false
}

#[tokio::test]
async fn it_should_return_last_expression() {
  setup();
  if !has_python() {
    return;
  }

  let request = ExecutionRequest::new(Language::Python, "x = 2 + 2\nx");
  let output = engine().run(&request).await.unwrap();
  assert_eq!(output.value, Some(json!(4)));
  assert_eq!(output.stdout, "");
  assert_eq!(output.image, None);
}

#[tokio::test]
async fn it_should_capture_stdout() {
  setup();
  if !has_python() {
    return;
  }

  let request = ExecutionRequest::new(Language::Python, "print(\"hi\")");
  let output = engine().run(&request).await.unwrap();
  assert_eq!(output.stdout, "hi\n");
  assert_eq!(output.value, None);
}

#[tokio::test]
async fn it_should_not_share_namespace() {
  setup();
  if !has_python() {
    return;
  }

  let engine = engine();
  engine
    .run(&ExecutionRequest::new(Language::Python, "leaked = 1"))
    .await
    .unwrap();
  let result = engine.run(&ExecutionRequest::new(Language::Python, "leaked")).await;
  match result {
    Err(CatGateError::Execution(message)) => assert!(message.contains("NameError"), "{}", message),
    other => panic!("Expect a NameError, got {:?}", other),
  }
}

#[tokio::test]
async fn it_should_classify_python_failures() {
  setup();
  if !has_python() {
    return;
  }

  let engine = engine();
  let err = engine
    .run(&ExecutionRequest::new(Language::Python, "def broken(:\n  pass"))
    .await
    .unwrap_err();
  assert!(matches!(err, CatGateError::Validation(_)), "{:?}", err);
  assert_eq!(err.status_code(), 400);

  let err = engine
    .run(&ExecutionRequest::new(Language::Python, "1 / 0"))
    .await
    .unwrap_err();
  assert!(err.message().contains("ZeroDivisionError"), "{:?}", err);

  let err = engine
    .run(&ExecutionRequest::new(Language::Python, "input()"))
    .await
    .unwrap_err();
  assert_eq!(err.message(), "Cannot read input (stdin is closed)");
}

#[tokio::test]
async fn it_should_time_out_and_reclaim_the_context() {
  setup();
  if !has_python() {
    return;
  }

  let dir = tempdir().unwrap();
  let pid_file = dir.path().join("pid");
  let child_file = dir.path().join("child");
  let code = format!(
    r#"
import os, subprocess
child = subprocess.Popen(["sleep", "60"])
with open({:?}, "w") as f:
    f.write(str(child.pid))
with open({:?}, "w") as f:
    f.write(str(os.getpid()))
print("partial output")
while True:
    pass
"#,
    child_file.to_string_lossy(),
    pid_file.to_string_lossy()
  );

  let start = Instant::now();
  let result = engine().run(&ExecutionRequest::new(Language::Python, code).timeout(1)).await;
  let elapsed = start.elapsed();
  info!("Timed out run took {:?}", elapsed);

  match result {
    Err(CatGateError::Timeout(message)) => assert_eq!(message, "Execution timed out"),
    other => panic!("Expect a timeout, got {:?}", other),
  }
  assert!(elapsed < Duration::from_secs(2));

  let pid: i32 = fs::read_to_string(&pid_file).unwrap().parse().unwrap();
  let child: i32 = fs::read_to_string(&child_file).unwrap().parse().unwrap();
  assert!(wait_gone(pid).await, "process {} still alive", pid);
  assert!(wait_gone(child).await, "process {} still alive", child);
}

#[tokio::test]
async fn it_should_remove_the_workspace() {
  setup();
  if !has_python() {
    return;
  }

  let root = tempdir().unwrap();
  let engine = IsolationEngine::new(EngineConfig {
    workspace_root: Some(root.path().to_path_buf()),
    ..EngineConfig::default()
  });
  engine
    .run(&ExecutionRequest::new(Language::Python, "open('scratch.txt', 'w').write('x')"))
    .await
    .unwrap();
  let _ = engine
    .run(&ExecutionRequest::new(Language::Python, "raise ValueError('no')"))
    .await;
  assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn it_should_reject_zero_timeout() {
  setup();
  let err = engine()
    .run(&ExecutionRequest::new(Language::Python, "1").timeout(0))
    .await
    .unwrap_err();
  assert!(matches!(err, CatGateError::Validation(_)));
}

#[tokio::test]
async fn it_should_run_javascript() {
  setup();
  if !has_vm2() {
    return;
  }

  let engine = engine();
  let output = engine
    .run(&ExecutionRequest::new(Language::JavaScript, "console.log('a', 1);\nconsole.log('b');"))
    .await
    .unwrap();
  assert_eq!(output.stdout, "a 1\nb");
  assert_eq!(output.value, None);

  let err = engine
    .run(&ExecutionRequest::new(Language::JavaScript, "missing()"))
    .await
    .unwrap_err();
  assert!(err.message().starts_with("ReferenceError"), "{:?}", err);
}

#[tokio::test]
async fn it_should_return_unrepresentable_values_as_repr() {
  setup();
  if !has_python() {
    return;
  }

  let engine = engine();
  let cases = [
    ("[float('nan')]", json!("[nan]")),
    ("{'a': float('inf')}", json!("{'a': inf}")),
    ("float('-inf')", json!("-inf")),
    ("10 ** 30", json!("1000000000000000000000000000000")),
    ("[2 ** 64 + 1]", json!("[18446744073709551617]")),
    ("{1: 'x'}", json!("{1: 'x'}")),
    ("2 ** 64 - 1", json!(18446744073709551615u64)),
    ("-(2 ** 63)", json!(i64::MIN)),
    ("[1, 'a', None, 1.5, {'k': [True]}]", json!([1, "a", null, 1.5, { "k": [true] }])),
  ];
  for (code, expected) in cases {
    let output = engine
      .run(&ExecutionRequest::new(Language::Python, code))
      .await
      .unwrap_or_else(|err| panic!("{} fails: {:?}", code, err));
    assert_eq!(output.value, Some(expected), "{}", code);
  }

  let output = engine
    .run(&ExecutionRequest::new(Language::Python, "len(str(10 ** 400))"))
    .await
    .unwrap();
  assert_eq!(output.value, Some(json!(401)));
  let output = engine
    .run(&ExecutionRequest::new(Language::Python, "10 ** 400"))
    .await
    .unwrap();
  assert_eq!(output.value.unwrap().as_str().map(|text| text.len()), Some(401));
}

#[tokio::test]
async fn it_should_collect_the_plot() {
  setup();
  if !has_python() {
    return;
  }

  let code = r#"
import sys
with open(sys.argv[3], "wb") as f:
    f.write(b"\x89PNG\r\n\x1a\nplot")
print(sys.argv[3])
"#;
  let output = engine()
    .run(&ExecutionRequest::new(Language::Python, code))
    .await
    .unwrap();
  assert_eq!(output.image.as_deref(), Some(&b"\x89PNG\r\n\x1a\nplot"[..]));

  let plot = output.stdout.trim_end();
  assert!(plot.ends_with("plot.png"), "{}", plot);
  assert!(!Path::new(plot).exists());

  let body = serde_json::to_value(&output).unwrap();
  assert_eq!(body["image"], json!(STANDARD.encode(b"\x89PNG\r\n\x1a\nplot")));
  assert_eq!(body["result"], json!(null));
}

#[test]
fn it_should_treat_cpu_limit_as_timeout() {
  let status = ExitStatus::from_raw(Signal::SIGXCPU as i32);
  assert!(exceeded_cpu_limit(&status));

  let status = ExitStatus::from_raw(Signal::SIGSEGV as i32);
  assert!(!exceeded_cpu_limit(&status));

  // Normal exit with code 24
  let status = ExitStatus::from_raw(24 << 8);
  assert!(!exceeded_cpu_limit(&status));
}

#[tokio::test]
async fn it_should_accept_huge_timeout() {
  setup();
  if !has_python() {
    return;
  }

  let output = engine()
    .run(&ExecutionRequest::new(Language::Python, "1 + 1").timeout(u64::MAX))
    .await
    .unwrap();
  assert_eq!(output.value, Some(json!(2)));
}
