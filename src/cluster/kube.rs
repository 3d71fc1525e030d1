use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cluster::{ClusterApi, CreateOutcome, NodeCapacity, NodeMetrics, UnitSpec};
use crate::CatGateError;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Connection settings of the cluster API server
#[derive(Debug, Clone)]
pub struct KubeConfig {
  pub api_server: String,
  pub token: Option<String>,
  pub ca_cert: Option<PathBuf>,
  pub namespace: String,
  pub accept_invalid_certs: bool,
  pub timeout: Duration,
}

/// Kubernetes REST client
pub struct KubeClient {
  http: Client,
  config: KubeConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectMeta {
  name: String,
}

#[derive(Debug, Deserialize)]
struct List<T> {
  #[serde(default)]
  items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Node {
  metadata: ObjectMeta,
  status: NodeStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeStatus {
  capacity: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeMetricsItem {
  metadata: ObjectMeta,
  usage: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Pod {
  status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PodStatus {
  phase: Option<String>,
  #[serde(rename = "podIP")]
  pod_ip: Option<String>,
}

impl KubeConfig {
  /// Read in-cluster settings: service host / port from the environment,
  /// token, CA and namespace from the mounted service account.
  pub fn in_cluster() -> Self {
    let host = env::var("KUBERNETES_SERVICE_HOST").unwrap_or("kubernetes.default.svc".into());
    let port = env::var("KUBERNETES_SERVICE_PORT").unwrap_or("443".into());
    let account = PathBuf::from(SERVICE_ACCOUNT_DIR);

    let token = fs::read_to_string(account.join("token"))
      .ok()
      .map(|token| token.trim().to_string());
    let ca_cert = Some(account.join("ca.crt")).filter(|path| path.exists());
    let namespace = fs::read_to_string(account.join("namespace"))
      .map(|ns| ns.trim().to_string())
      .unwrap_or("default".into());

    KubeConfig {
      api_server: format!("https://{}:{}", host, port),
      token,
      ca_cert,
      namespace,
      ..KubeConfig::default()
    }
  }
}

impl Default for KubeConfig {
  fn default() -> Self {
    KubeConfig {
      api_server: "https://kubernetes.default.svc".to_string(),
      token: None,
      ca_cert: None,
      namespace: "default".to_string(),
      accept_invalid_certs: false,
      timeout: Duration::from_secs(10),
    }
  }
}

impl KubeClient {
  pub fn new(config: KubeConfig) -> Result<Self, CatGateError> {
    let mut builder = Client::builder()
      .timeout(config.timeout)
      .danger_accept_invalid_certs(config.accept_invalid_certs);

    if let Some(path) = &config.ca_cert {
      let pem = fs::read(path)?;
      let cert = Certificate::from_pem(&pem)?;
      builder = builder.add_root_certificate(cert);
    }

    let http = builder.build()?;
    info!("Cluster API server {} (namespace {})", config.api_server, config.namespace);
    Ok(KubeClient { http, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.api_server.trim_end_matches('/'), path)
  }

  fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.config.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, CatGateError> {
    let response = self.authorize(self.http.get(self.url(path))).send().await?;
    let status = response.status();
    if !status.is_success() {
      return Err(api_error(status, response.text().await.unwrap_or_default()));
    }
    Ok(response.json::<T>().await?)
  }

  fn pod_manifest(&self, unit: &UnitSpec) -> Value {
    let template = &unit.template;
    let ports = template
      .ports
      .iter()
      .map(|port| json!({ "containerPort": port }))
      .collect::<Vec<Value>>();

    json!({
      "apiVersion": "v1",
      "kind": "Pod",
      "metadata": {
        "name": unit.name,
        "labels": {
          "app": "sandbox",
          "sessionid": unit.session_id
        }
      },
      "spec": {
        "containers": [
          {
            "name": "sandbox",
            "image": template.image,
            "imagePullPolicy": template.image_pull_policy,
            "ports": ports,
            "resources": {
              "limits": {
                "cpu": template.cpu_limit,
                "memory": template.memory_limit
              },
              "requests": {
                "cpu": template.cpu_request,
                "memory": template.memory_request
              }
            }
          }
        ]
      }
    })
  }
}

fn api_error(status: StatusCode, body: String) -> CatGateError {
  warn!("Cluster API error: {}, Body: {}", status, body);
  CatGateError::infrastructure(format!("Cluster API error: {}, Body: {}", status, body))
}

#[async_trait]
impl ClusterApi for KubeClient {
  async fn list_nodes(&self) -> Result<Vec<NodeCapacity>, CatGateError> {
    let nodes: List<Node> = self.get_json("/api/v1/nodes").await?;
    Ok(
      nodes
        .items
        .into_iter()
        .map(|node| NodeCapacity {
          cpu: node.status.capacity.get("cpu").cloned().unwrap_or_default(),
          memory: node.status.capacity.get("memory").cloned().unwrap_or_default(),
          name: node.metadata.name,
        })
        .collect(),
    )
  }

  async fn node_metrics(&self) -> Result<Vec<NodeMetrics>, CatGateError> {
    let metrics: List<NodeMetricsItem> = self.get_json("/apis/metrics.k8s.io/v1beta1/nodes").await?;
    Ok(
      metrics
        .items
        .into_iter()
        .map(|item| NodeMetrics {
          cpu: item.usage.get("cpu").cloned().unwrap_or_default(),
          memory: item.usage.get("memory").cloned().unwrap_or_default(),
          name: item.metadata.name,
        })
        .collect(),
    )
  }

  async fn create_unit(&self, unit: &UnitSpec) -> Result<CreateOutcome, CatGateError> {
    let path = format!("/api/v1/namespaces/{}/pods", self.config.namespace);
    let response = self
      .authorize(self.http.post(self.url(&path)))
      .json(&self.pod_manifest(unit))
      .send()
      .await?;

    match response.status() {
      status if status.is_success() => {
        info!("Pod created for sessionid: {}, name: {}", unit.session_id, unit.name);
        Ok(CreateOutcome::Created)
      }
      StatusCode::CONFLICT => {
        info!("Pod {} already exists", unit.name);
        Ok(CreateOutcome::AlreadyExists)
      }
      status => Err(api_error(status, response.text().await.unwrap_or_default())),
    }
  }

  async fn unit_address(&self, name: &str) -> Result<Option<String>, CatGateError> {
    let path = format!("/api/v1/namespaces/{}/pods/{}", self.config.namespace, name);
    let pod: Pod = self.get_json(&path).await?;
    debug!(
      "Pod {} phase {:?} ip {:?}",
      name, pod.status.phase, pod.status.pod_ip
    );
    let running = pod.status.phase.as_deref() == Some("Running");
    Ok(pod.status.pod_ip.filter(|ip| running && !ip.is_empty()))
  }
}
