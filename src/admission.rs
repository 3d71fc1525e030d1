use std::sync::Arc;

use log::{error, info};

use crate::cluster::ClusterApi;
use crate::resources::{collect, ResourceSnapshot};

/// Where a session's traffic should be served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
  /// Serve on the shared, co-located backend
  Local,
  /// Require a dedicated compute unit
  Dedicated,
}

/// Decides between local serving and dedicated provisioning from cluster headroom
pub struct AdmissionController {
  api: Arc<dyn ClusterApi>,
  threshold: f64,
}

impl Admission {
  pub fn is_local(&self) -> bool {
    matches!(self, Admission::Local)
  }
}

impl AdmissionController {
  pub fn new(api: Arc<dyn ClusterApi>, threshold: f64) -> Self {
    AdmissionController { api, threshold }
  }

  pub fn threshold(&self) -> f64 {
    self.threshold
  }

  /// Take a fresh snapshot and decide. Collection errors yield `Dedicated`.
  pub async fn decide(&self) -> Admission {
    match collect(self.api.as_ref()).await {
      Ok(snapshot) => self.evaluate(&snapshot),
      Err(err) => {
        error!("Error checking cluster usage: {}", err);
        Admission::Dedicated
      }
    }
  }

  /// `Local` only when every node is below the threshold for both CPU and memory.
  /// An empty snapshot cannot confirm headroom and yields `Dedicated`.
  pub fn evaluate(&self, snapshot: &ResourceSnapshot) -> Admission {
    if snapshot.is_empty() {
      info!("No node reported, can not confirm headroom");
      return Admission::Dedicated;
    }

    for node in snapshot.nodes() {
      let cpu = node.cpu_percent();
      let memory = node.memory_percent();
      if cpu >= self.threshold || memory >= self.threshold {
        info!(
          "Node {} exceeds {}% usage: CPU={:.2}%, Memory={:.2}%",
          node.node, self.threshold, cpu, memory
        );
        return Admission::Dedicated;
      }
    }

    info!("All nodes have resource usage below {}%", self.threshold);
    Admission::Local
  }
}
