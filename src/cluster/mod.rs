use async_trait::async_trait;

use crate::CatGateError;

pub use kube::{KubeClient, KubeConfig};
pub use quantity::parse_quantity;

mod kube;
mod quantity;

/// Declared capacity of one node, raw quantity strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCapacity {
  pub name: String,
  pub cpu: String,
  pub memory: String,
}

/// Live usage of one node as reported by the metrics source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetrics {
  pub name: String,
  pub cpu: String,
  pub memory: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
  Created,
  AlreadyExists,
}

/// Image and sizing of a compute unit
#[derive(Debug, Clone)]
pub struct UnitTemplate {
  pub image: String,
  pub image_pull_policy: String,
  pub ports: Vec<u16>,
  pub cpu_request: String,
  pub memory_request: String,
  pub cpu_limit: String,
  pub memory_limit: String,
}

/// A compute unit about to be created for one session
#[derive(Debug, Clone)]
pub struct UnitSpec {
  pub name: String,
  pub session_id: String,
  pub template: UnitTemplate,
}

/// Control plane operations consumed by the gateway
#[async_trait]
pub trait ClusterApi: Send + Sync {
  /// Node inventory with declared capacity
  async fn list_nodes(&self) -> Result<Vec<NodeCapacity>, CatGateError>;

  /// Live per-node usage
  async fn node_metrics(&self) -> Result<Vec<NodeMetrics>, CatGateError>;

  /// Request creation of an isolated unit
  async fn create_unit(&self, unit: &UnitSpec) -> Result<CreateOutcome, CatGateError>;

  /// Network address of a unit, `None` until one is assigned
  async fn unit_address(&self, name: &str) -> Result<Option<String>, CatGateError>;
}

impl Default for UnitTemplate {
  fn default() -> Self {
    UnitTemplate {
      image: crate::config::DEFAULT_UNIT_IMAGE.to_string(),
      image_pull_policy: "Always".to_string(),
      ports: vec![8000, crate::config::DEFAULT_UNIT_PORT],
      cpu_request: "0.5".to_string(),
      memory_request: "256Mi".to_string(),
      cpu_limit: "1".to_string(),
      memory_limit: "512Mi".to_string(),
    }
  }
}
