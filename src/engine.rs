use std::io;
use std::path::PathBuf;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::libc::rlim_t;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{setsid, Pid};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::TERMINATION_GRACE;
use crate::context::{ExecutionContext, ExecutionOutput, ExecutionRequest};
use crate::language::RawOutcome;
use crate::CatGateError;

/// 输出文件大小 256 MB
const FILE_SIZE_LIMIT: rlim_t = 256 * 1024 * 1024;

/// 标准输出 / 错误最多保留 16 MB
const OUTPUT_LIMIT: usize = 16 * 1024 * 1024;

/// 子进程退出后等待输出管道关闭的时间
const PIPE_GRACE: Duration = Duration::from_secs(1);

/// Interpreters and limits shared by every execution context
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub python: String,
  pub node: String,
  /// `NODE_PATH` for resolving the vm2 module
  pub node_path: Option<String>,
  /// Wait between SIGTERM and SIGKILL
  pub grace: Duration,
  /// Address space limit in bytes
  pub memory_limit: Option<u64>,
  pub output_limit: usize,
  /// Parent directory of the workspaces, system temp dir if unset
  pub workspace_root: Option<PathBuf>,
  pub env: Vec<(String, String)>,
}

/// Runs each request in a fresh, disposable process with hard time bounds
pub struct IsolationEngine {
  config: EngineConfig,
}

/// Resource limits applied in the child before exec
#[derive(Debug, Clone, Copy)]
struct ContextLimits {
  cpu_seconds: rlim_t,
  file_size: rlim_t,
  address_space: Option<rlim_t>,
}

/// The process group of a running context, SIGKILLed when dropped while armed
struct ProcessGroup {
  pgid: Option<Pid>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      python: "python3".to_string(),
      node: "node".to_string(),
      node_path: None,
      grace: TERMINATION_GRACE,
      memory_limit: None,
      output_limit: OUTPUT_LIMIT,
      workspace_root: None,
      env: vec![],
    }
  }
}

fn errno_to_io(errno: Errno) -> io::Error {
  io::Error::from_raw_os_error(errno as i32)
}

impl ContextLimits {
  /// Runs between fork and exec, only async-signal-safe calls here
  fn apply(&self) -> io::Result<()> {
    // 新会话，超时后可以整组终止
    setsid().map_err(errno_to_io)?;
    // 软限制先触发 SIGXCPU，硬限制再 SIGKILL
    let cpu_hard = self.cpu_seconds.saturating_add(1);
    setrlimit(Resource::RLIMIT_CPU, self.cpu_seconds, cpu_hard).map_err(errno_to_io)?;
    setrlimit(Resource::RLIMIT_FSIZE, self.file_size, self.file_size).map_err(errno_to_io)?;
    if let Some(bytes) = self.address_space {
      setrlimit(Resource::RLIMIT_AS, bytes, bytes).map_err(errno_to_io)?;
    }
    Ok(())
  }
}

impl ProcessGroup {
  fn of(child: &Child) -> Self {
    ProcessGroup {
      pgid: child.id().map(|pid| Pid::from_raw(pid as i32)),
    }
  }

  fn signal(&self, signal: Signal) {
    if let Some(pgid) = self.pgid {
      match killpg(pgid, signal) {
        Ok(()) => debug!("Send {} to process group {}", signal, pgid),
        Err(Errno::ESRCH) => {}
        Err(err) => warn!("Send {} to process group {} fails: {}", signal, pgid, err),
      }
    }
  }

  /// Kill whatever is left in the group and disarm
  fn release(&mut self) {
    self.signal(Signal::SIGKILL);
    self.pgid = None;
  }
}

impl Drop for ProcessGroup {
  fn drop(&mut self) {
    self.release();
  }
}

/// CPU seconds a context may use: every core busy for the whole wall time, plus one
fn cpu_budget(timeout_seconds: u64) -> rlim_t {
  let cores = std::thread::available_parallelism().map_or(1, |n| n.get()) as u64;
  timeout_seconds.saturating_mul(cores).saturating_add(1)
}

/// Whether the context was stopped by its CPU time limit
pub fn exceeded_cpu_limit(status: &ExitStatus) -> bool {
  status.signal() == Some(Signal::SIGXCPU as i32)
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> io::Result<Vec<u8>> {
  let mut kept = Vec::new();
  let mut buf = [0u8; 8192];
  loop {
    let size = reader.read(&mut buf).await?;
    if size == 0 {
      break;
    }
    let room = limit.saturating_sub(kept.len());
    kept.extend_from_slice(&buf[..size.min(room)]);
  }
  Ok(kept)
}

async fn collect(reader: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Vec<u8> {
  let Some(handle) = reader else {
    return vec![];
  };
  let abort = handle.abort_handle();
  match timeout(PIPE_GRACE, handle).await {
    Ok(Ok(Ok(bytes))) => bytes,
    Ok(Ok(Err(err))) => {
      warn!("Read execution context output fails: {}", err);
      vec![]
    }
    Ok(Err(err)) => {
      warn!("Output reader task fails: {}", err);
      vec![]
    }
    Err(_) => {
      warn!("Output pipe still open after the context exited");
      abort.abort();
      vec![]
    }
  }
}

/// SIGTERM, wait for the grace interval, then SIGKILL
async fn terminate(child: &mut Child, group: &mut ProcessGroup, grace: Duration) {
  group.signal(Signal::SIGTERM);
  match timeout(grace, child.wait()).await {
    Ok(_) => debug!("Execution context exited after SIGTERM"),
    Err(_) => {
      group.signal(Signal::SIGKILL);
      if let Err(err) = child.wait().await {
        error!("Reap execution context fails: {}", err);
      }
    }
  }
  group.release();
}

impl IsolationEngine {
  pub fn new(config: EngineConfig) -> Self {
    IsolationEngine { config }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Run one request in its own execution context.
  ///
  /// The context is terminated and its workspace removed on every path. A
  /// timeout discards any partial output and yields a timeout error.
  pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionOutput, CatGateError> {
    if request.timeout_seconds() == 0 {
      return Err(CatGateError::validation("Timeout should be a positive integer"));
    }

    let context = ExecutionContext::create(self.config.workspace_root.as_deref())?;
    let result = self.run_in(&context, request).await;
    context.close();
    result
  }

  async fn run_in(&self, context: &ExecutionContext, request: &ExecutionRequest) -> Result<ExecutionOutput, CatGateError> {
    let executor = request.language().executor();
    let mut command = executor.prepare(context, request, &self.config)?;

    let limits = ContextLimits {
      cpu_seconds: cpu_budget(request.timeout_seconds()),
      file_size: FILE_SIZE_LIMIT,
      address_space: self.config.memory_limit,
    };
    command
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    unsafe {
      command.pre_exec(move || limits.apply());
    }

    let start = Instant::now();
    let mut child = command
      .spawn()
      .map_err(|err| CatGateError::infrastructure(format!("Spawn execution context fails: {}", err)))?;
    let mut group = ProcessGroup::of(&child);
    info!(
      "Start running {} context (pid = {:?}, timeout = {}s)",
      request.language(),
      child.id(),
      request.timeout_seconds()
    );

    let limit = self.config.output_limit;
    let stdout = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe, limit)));
    let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe, limit)));

    let duration = Duration::from_secs(request.timeout_seconds());
    let status = match timeout(duration, child.wait()).await {
      Ok(Ok(status)) => status,
      Ok(Err(err)) => {
        return Err(CatGateError::infrastructure(format!("Wait execution context fails: {}", err)));
      }
      Err(_) => {
        warn!("Execution context timed out after {}s", request.timeout_seconds());
        terminate(&mut child, &mut group, self.config.grace).await;
        for reader in [stdout, stderr].into_iter().flatten() {
          reader.abort();
        }
        return Err(CatGateError::timeout("Execution timed out"));
      }
    };
    group.release();
    info!("Execution context exited with {} in {:?}", status, start.elapsed());
    if exceeded_cpu_limit(&status) {
      warn!("Execution context exceeded its CPU time limit");
      for reader in [stdout, stderr].into_iter().flatten() {
        reader.abort();
      }
      return Err(CatGateError::timeout("Execution timed out"));
    }

    let outcome = RawOutcome {
      status,
      stdout: collect(stdout).await,
      stderr: collect(stderr).await,
    };
    executor.interpret(context, outcome)
  }
}
