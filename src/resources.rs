use std::collections::HashMap;

use log::{debug, warn};

use crate::cluster::{parse_quantity, ClusterApi};
use crate::CatGateError;

/// Normalized usage of one node (CPU in cores, memory in bytes)
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUsage {
  pub node: String,
  pub cpu_usage: f64,
  pub cpu_capacity: f64,
  pub mem_usage: f64,
  pub mem_capacity: f64,
}

/// Per-node usage at one point in time, in inventory order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSnapshot {
  nodes: Vec<NodeUsage>,
}

fn percent(usage: f64, capacity: f64) -> f64 {
  if capacity > 0.0 {
    usage / capacity * 100.0
  } else {
    0.0
  }
}

impl NodeUsage {
  pub fn cpu_percent(&self) -> f64 {
    percent(self.cpu_usage, self.cpu_capacity)
  }

  pub fn memory_percent(&self) -> f64 {
    percent(self.mem_usage, self.mem_capacity)
  }
}

impl ResourceSnapshot {
  pub fn new(nodes: Vec<NodeUsage>) -> Self {
    ResourceSnapshot { nodes }
  }

  pub fn nodes(&self) -> &[NodeUsage] {
    &self.nodes
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

/// Query node inventory and live metrics, then join them by node name.
///
/// A node missing from the metrics source counts as idle. Any failure of
/// either query, or a malformed quantity, fails the whole snapshot.
pub async fn collect(api: &dyn ClusterApi) -> Result<ResourceSnapshot, CatGateError> {
  let metrics = api.node_metrics().await?;
  let inventory = api.list_nodes().await?;

  let mut usage = metrics
    .into_iter()
    .map(|item| (item.name.clone(), item))
    .collect::<HashMap<_, _>>();

  let mut nodes = Vec::with_capacity(inventory.len());
  for node in inventory {
    let (cpu_usage, mem_usage) = match usage.remove(&node.name) {
      Some(item) => (parse_quantity(&item.cpu)?, parse_quantity(&item.memory)?),
      None => {
        warn!("Node {} has no metrics, assume zero usage", node.name);
        (0.0, 0.0)
      }
    };
    nodes.push(NodeUsage {
      cpu_usage,
      cpu_capacity: parse_quantity(&node.cpu)?,
      mem_usage,
      mem_capacity: parse_quantity(&node.memory)?,
      node: node.name,
    });
  }

  for name in usage.keys() {
    debug!("Ignore metrics of unknown node {}", name);
  }

  Ok(ResourceSnapshot { nodes })
}
