#![allow(dead_code)]

use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use flexi_logger::Logger;

use catgate::cluster::{ClusterApi, CreateOutcome, NodeCapacity, NodeMetrics, UnitSpec};
use catgate::provision::ProvisionConfig;
use catgate::CatGateError;

static INIT: Once = Once::new();

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("catgate=debug,info")
      .unwrap()
      .start()
      .unwrap();
  });
}

/// In-memory control plane
#[derive(Default)]
pub struct FakeCluster {
  pub nodes: Vec<NodeCapacity>,
  pub metrics: Vec<NodeMetrics>,
  pub fail_metrics: bool,
  pub fail_create: bool,
  pub unit_ip: Option<String>,
  pub creates: AtomicUsize,
  pub polls: AtomicUsize,
}

pub fn node(name: &str, cpu: &str, memory: &str) -> NodeCapacity {
  NodeCapacity {
    name: name.to_string(),
    cpu: cpu.to_string(),
    memory: memory.to_string(),
  }
}

pub fn usage(name: &str, cpu: &str, memory: &str) -> NodeMetrics {
  NodeMetrics {
    name: name.to_string(),
    cpu: cpu.to_string(),
    memory: memory.to_string(),
  }
}

impl FakeCluster {
  pub fn creates(&self) -> usize {
    self.creates.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ClusterApi for FakeCluster {
  async fn list_nodes(&self) -> Result<Vec<NodeCapacity>, CatGateError> {
    Ok(self.nodes.clone())
  }

  async fn node_metrics(&self) -> Result<Vec<NodeMetrics>, CatGateError> {
    if self.fail_metrics {
      return Err(CatGateError::infrastructure("metrics unavailable"));
    }
    Ok(self.metrics.clone())
  }

  async fn create_unit(&self, _unit: &UnitSpec) -> Result<CreateOutcome, CatGateError> {
    if self.fail_create {
      return Err(CatGateError::infrastructure("Cluster API error: 403 Forbidden, Body: "));
    }
    let previous = self.creates.fetch_add(1, Ordering::SeqCst);
    // Give concurrent callers a chance to interleave
    tokio::time::sleep(Duration::from_millis(20)).await;
    if previous == 0 {
      Ok(CreateOutcome::Created)
    } else {
      Ok(CreateOutcome::AlreadyExists)
    }
  }

  async fn unit_address(&self, _name: &str) -> Result<Option<String>, CatGateError> {
    let polls = self.polls.fetch_add(1, Ordering::SeqCst);
    // The first poll sees a pending unit
    if polls == 0 {
      return Ok(None);
    }
    Ok(self.unit_ip.clone())
  }
}

pub fn fast_provision(port: u16) -> ProvisionConfig {
  ProvisionConfig {
    port,
    poll_interval: Duration::from_millis(10),
    poll_attempts: 5,
    ..ProvisionConfig::default()
  }
}

pub fn has_python() -> bool {
  Command::new("python3").arg("--version").output().is_ok_and(|output| output.status.success())
}

pub fn has_vm2() -> bool {
  Command::new("node")
    .args(["-e", "require('vm2')"])
    .output()
    .is_ok_and(|output| output.status.success())
}
