use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::cluster::{ClusterApi, UnitSpec, UnitTemplate};
use crate::config::{
  DEFAULT_UNIT_PORT, PROVISION_POLL_ATTEMPTS, PROVISION_POLL_INTERVAL, UNIT_NAME_PREFIX,
};

/// How units are created and how long to wait for their address
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
  pub template: UnitTemplate,
  pub port: u16,
  pub poll_interval: Duration,
  pub poll_attempts: u32,
}

/// Creates dedicated compute units and resolves their access URL
pub struct Provisioner {
  api: Arc<dyn ClusterApi>,
  config: ProvisionConfig,
}

impl Default for ProvisionConfig {
  fn default() -> Self {
    ProvisionConfig {
      template: UnitTemplate::default(),
      port: DEFAULT_UNIT_PORT,
      poll_interval: PROVISION_POLL_INTERVAL,
      poll_attempts: PROVISION_POLL_ATTEMPTS,
    }
  }
}

/// Unit name derived from an already normalized session id
pub fn unit_name(session_id: &str) -> String {
  format!("{}{}", UNIT_NAME_PREFIX, session_id)
}

impl Provisioner {
  pub fn new(api: Arc<dyn ClusterApi>, config: ProvisionConfig) -> Self {
    Provisioner { api, config }
  }

  /// Create (or adopt) the unit of a session and wait for its address.
  /// Returns the access URL, `None` when no route is available.
  pub async fn provision(&self, session_id: &str) -> Option<String> {
    let name = unit_name(session_id);
    let unit = UnitSpec {
      name: name.clone(),
      session_id: session_id.to_string(),
      template: self.config.template.clone(),
    };

    match self.api.create_unit(&unit).await {
      Ok(outcome) => debug!("Create unit {}: {:?}", name, outcome),
      Err(err) => {
        error!("Error creating Pod for sessionid {}: {}", session_id, err);
        return None;
      }
    }

    for attempt in 0..self.config.poll_attempts {
      match self.api.unit_address(&name).await {
        Ok(Some(ip)) => {
          let url = format!("http://{}:{}", ip, self.config.port);
          info!("Unit {} is reachable at {}", name, url);
          return Some(url);
        }
        Ok(None) => debug!("Unit {} has no address yet (attempt {})", name, attempt + 1),
        Err(err) => warn!("Error retrieving address of unit {}: {}", name, err),
      }
      sleep(self.config.poll_interval).await;
    }

    error!(
      "Unit {} did not become reachable after {} attempts",
      name, self.config.poll_attempts
    );
    None
  }
}
