use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::{Args, Parser, Subcommand};
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use log::{error, info};
use tokio::net::TcpListener;

use catgate::cluster::{ClusterApi, KubeClient, KubeConfig, UnitTemplate};
use catgate::config::{
  ADMISSION_THRESHOLD, DEFAULT_EXEC_TIMEOUT, DEFAULT_FILES_DIR, DEFAULT_UNIT_IMAGE, DEFAULT_UNIT_PORT,
  MAX_EXEC_TIMEOUT, MAX_FILE_SIZE, MULTIPART_OVERHEAD, PROVISION_POLL_ATTEMPTS,
};
use catgate::provision::ProvisionConfig;
use catgate::utils::{default_format, parse_env};
use catgate::{
  gateway, runtime, CatGateError, EngineConfig, ExecutionRequest, Gateway, GatewayConfig, IsolationEngine,
  Language, RuntimeConfig, RuntimeState,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[arg(long, default_value_t = false, help = "Print debug messages")]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  #[command(about = "Serve the session gateway with an embedded local backend")]
  Gateway {
    #[arg(long, env = "CATGATE_LISTEN", default_value = "0.0.0.0:8000")]
    listen: SocketAddr,

    #[command(flatten)]
    cluster: ClusterArgs,

    #[command(flatten)]
    runtime: RuntimeArgs,
  },

  #[command(about = "Serve the sandbox runtime of a compute unit")]
  Runtime {
    #[arg(long, env = "CATGATE_LISTEN", default_value = "0.0.0.0:5858")]
    listen: SocketAddr,

    #[command(flatten)]
    runtime: RuntimeArgs,
  },

  #[command(about = "Run one source file in an isolated context and print the result")]
  Exec {
    #[arg(help = "Language (python, javascript, ...)")]
    language: String,

    #[arg(help = "Source file")]
    file: PathBuf,

    #[arg(short, long, default_value_t = DEFAULT_EXEC_TIMEOUT, help = "Time limit (s)")]
    timeout: u64,

    #[command(flatten)]
    engine: EngineArgs,
  },
}

#[derive(Args, Debug)]
struct EngineArgs {
  #[arg(long, env = "CATGATE_PYTHON", default_value = "python3")]
  python: String,

  #[arg(long, env = "CATGATE_NODE", default_value = "node")]
  node: String,

  #[arg(long, env = "NODE_PATH", help = "Module path of the JavaScript sandbox")]
  node_path: Option<String>,

  #[arg(long, default_value_t = 100, help = "Wait between SIGTERM and SIGKILL (ms)")]
  grace: u64,

  #[arg(long, help = "Address space limit (KB)")]
  memory: Option<u64>,

  #[arg(long = "env", value_parser = parse_env_arg, help = "Pass environment variable KEY[=VALUE]")]
  env: Vec<(String, String)>,
}

#[derive(Args, Debug)]
struct RuntimeArgs {
  #[arg(long, env = "CATGATE_FILES_DIR", default_value = DEFAULT_FILES_DIR)]
  files_dir: PathBuf,

  #[arg(long, default_value_t = MAX_FILE_SIZE, help = "Upload size limit (bytes)")]
  max_file_size: usize,

  #[arg(long, default_value_t = DEFAULT_EXEC_TIMEOUT)]
  default_timeout: u64,

  #[arg(long, default_value_t = MAX_EXEC_TIMEOUT)]
  max_timeout: u64,

  #[command(flatten)]
  engine: EngineArgs,
}

#[derive(Args, Debug)]
struct ClusterArgs {
  #[arg(long, env = "CATGATE_API_SERVER", help = "Cluster API server, in-cluster settings if absent")]
  api_server: Option<String>,

  #[arg(long, env = "CATGATE_TOKEN_FILE")]
  token_file: Option<PathBuf>,

  #[arg(long, env = "CATGATE_CA_CERT")]
  ca_cert: Option<PathBuf>,

  #[arg(long, env = "CATGATE_NAMESPACE")]
  namespace: Option<String>,

  #[arg(long, default_value_t = false)]
  insecure: bool,

  #[arg(long, default_value_t = 10, help = "Cluster request timeout (s)")]
  cluster_timeout: u64,

  #[arg(long, env = "CATGATE_IMAGE", default_value = DEFAULT_UNIT_IMAGE)]
  image: String,

  #[arg(long, default_value = "Always")]
  image_pull_policy: String,

  #[arg(long, default_value_t = DEFAULT_UNIT_PORT)]
  unit_port: u16,

  #[arg(long, default_value = "0.5")]
  cpu_request: String,

  #[arg(long, default_value = "256Mi")]
  memory_request: String,

  #[arg(long, default_value = "1")]
  cpu_limit: String,

  #[arg(long, default_value = "512Mi")]
  memory_limit: String,

  #[arg(long, default_value_t = 500, help = "Provisioning poll interval (ms)")]
  poll_interval: u64,

  #[arg(long, default_value_t = PROVISION_POLL_ATTEMPTS)]
  poll_attempts: u32,

  #[arg(long, default_value_t = ADMISSION_THRESHOLD, help = "CPU / memory usage percentage")]
  threshold: f64,

  #[arg(long, default_value_t = 330, help = "Upstream forwarding timeout (s)")]
  upstream_timeout: u64,
}

fn parse_env_arg(text: &str) -> Result<(String, String), String> {
  parse_env(text).map_err(|err| err.message())
}

impl EngineArgs {
  fn resolve(self) -> EngineConfig {
    EngineConfig {
      python: self.python,
      node: self.node,
      node_path: self.node_path,
      grace: Duration::from_millis(self.grace),
      memory_limit: self.memory.map(|kb| kb * 1024),
      env: self.env,
      ..EngineConfig::default()
    }
  }
}

impl RuntimeArgs {
  fn resolve(self) -> Router {
    let config = RuntimeConfig {
      files_dir: self.files_dir,
      max_file_size: self.max_file_size,
      default_timeout: self.default_timeout,
      max_timeout: self.max_timeout,
    };
    info!("Serve files under {}", config.files_dir.display());
    let engine = IsolationEngine::new(self.engine.resolve());
    runtime::router(Arc::new(RuntimeState::new(engine, config)))
  }
}

impl ClusterArgs {
  fn kube_config(&self) -> Result<KubeConfig, CatGateError> {
    let mut config = match &self.api_server {
      Some(api_server) => KubeConfig {
        api_server: api_server.clone(),
        ..KubeConfig::default()
      },
      None => KubeConfig::in_cluster(),
    };
    if let Some(path) = &self.token_file {
      config.token = Some(fs::read_to_string(path)?.trim().to_string());
    }
    if self.ca_cert.is_some() {
      config.ca_cert = self.ca_cert.clone();
    }
    if let Some(namespace) = &self.namespace {
      config.namespace = namespace.clone();
    }
    config.accept_invalid_certs = self.insecure;
    config.timeout = Duration::from_secs(self.cluster_timeout);
    Ok(config)
  }

  fn gateway_config(self, max_file_size: usize) -> GatewayConfig {
    let template = UnitTemplate {
      image: self.image,
      image_pull_policy: self.image_pull_policy,
      ports: vec![8000, self.unit_port],
      cpu_request: self.cpu_request,
      memory_request: self.memory_request,
      cpu_limit: self.cpu_limit,
      memory_limit: self.memory_limit,
    };
    GatewayConfig {
      provision: ProvisionConfig {
        template,
        port: self.unit_port,
        poll_interval: Duration::from_millis(self.poll_interval),
        poll_attempts: self.poll_attempts,
      },
      threshold: self.threshold,
      upstream_timeout: Duration::from_secs(self.upstream_timeout),
      max_body: max_file_size + MULTIPART_OVERHEAD,
    }
  }
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    error!("Failed to listen for shutdown signal: {}", err);
  }
  info!("Shutting down");
}

async fn serve(listen: SocketAddr, app: Router) -> Result<(), CatGateError> {
  let listener = TcpListener::bind(listen).await?;
  info!("Listening on {}", listen);
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn exec(language: String, file: PathBuf, timeout: u64, engine: EngineArgs) -> Result<(), CatGateError> {
  let language = language.parse::<Language>()?;
  let code = fs::read_to_string(&file)?;
  let engine = IsolationEngine::new(engine.resolve());

  info!("Run {} as {}", file.display(), language);
  let request = ExecutionRequest::new(language, code).timeout(timeout);
  let output = engine.run(&request).await?;
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

fn setup_logger(verbose: bool) -> Result<LoggerHandle, CatGateError> {
  let (spec, duplicate) = if verbose {
    ("catgate=debug", Duplicate::All)
  } else {
    ("catgate=info", Duplicate::Warn)
  };
  let handle = Logger::try_with_str(spec)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("catgate")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(duplicate)
    .format_for_files(default_format)
    .print_message()
    .start()?;
  Ok(handle)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();
  let _logger = setup_logger(cli.verbose)?;

  match cli.command {
    Commands::Gateway { listen, cluster, runtime } => {
      info!("Start running gateway");
      let api: Arc<dyn ClusterApi> = Arc::new(KubeClient::new(cluster.kube_config()?)?);
      let config = cluster.gateway_config(runtime.max_file_size);
      let gateway = Gateway::new(api, runtime.resolve(), config)?;
      serve(listen, gateway::router(Arc::new(gateway))).await?;
    }
    Commands::Runtime { listen, runtime } => {
      info!("Start running sandbox runtime");
      serve(listen, runtime.resolve()).await?;
    }
    Commands::Exec { language, file, timeout, engine } => {
      exec(language, file, timeout, engine).await?;
    }
  }

  info!("Running catgate finished");

  Ok(())
}
