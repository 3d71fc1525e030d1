use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;

use crate::provision::{unit_name, Provisioner};
use crate::CatGateError;

const MAX_SESSION_ID_LENGTH: usize = 50;

/// A session bound to its dedicated compute unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
  pub session_id: String,
  pub unit_name: String,
  pub unit_address: String,
}

type Slot = Arc<Mutex<Option<Session>>>;

/// Process-wide map from session id to compute unit.
///
/// Every session has its own slot lock, so concurrent first requests for one
/// session provision exactly once while other sessions proceed in parallel.
pub struct SessionRegistry {
  slots: Mutex<HashMap<String, Slot>>,
  provisioner: Provisioner,
}

/// Lowercase the id and check it can name a unit and a directory
pub fn normalize_session_id(session_id: &str) -> Result<String, CatGateError> {
  let id = session_id.to_ascii_lowercase();
  let valid_chars = id
    .bytes()
    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
  if id.is_empty()
    || id.len() > MAX_SESSION_ID_LENGTH
    || !valid_chars
    || id.starts_with('-')
    || id.ends_with('-')
  {
    return Err(CatGateError::validation(format!("Invalid session id {:?}", session_id)));
  }
  Ok(id)
}

impl SessionRegistry {
  pub fn new(provisioner: Provisioner) -> Self {
    SessionRegistry {
      slots: Mutex::new(HashMap::new()),
      provisioner,
    }
  }

  async fn slot(&self, session_id: &str) -> Slot {
    let mut slots = self.slots.lock().await;
    slots.entry(session_id.to_string()).or_default().clone()
  }

  /// Bound session, if any, without provisioning
  pub async fn get(&self, session_id: &str) -> Option<Session> {
    let slot = self.slots.lock().await.get(session_id).cloned()?;
    let session = slot.lock().await;
    session.clone()
  }

  /// Resolve the unit of a session, provisioning it on first use.
  /// `None` means no route is available right now.
  pub async fn get_or_create(&self, session_id: &str) -> Option<Session> {
    let slot = self.slot(session_id).await;
    let mut guard = slot.lock().await;

    if let Some(session) = guard.as_ref() {
      debug!("Session {} already bound to {}", session_id, session.unit_address);
      return Some(session.clone());
    }

    let unit_address = self.provisioner.provision(session_id).await?;
    let session = Session {
      session_id: session_id.to_string(),
      unit_name: unit_name(session_id),
      unit_address,
    };
    info!("Session {} bound to unit {}", session_id, session.unit_name);
    *guard = Some(session.clone());
    Some(session)
  }

  /// Number of sessions bound to a unit
  pub async fn bound_sessions(&self) -> usize {
    let slots = self.slots.lock().await.values().cloned().collect::<Vec<_>>();
    let mut count = 0;
    for slot in slots {
      if slot.lock().await.is_some() {
        count += 1;
      }
    }
    count
  }
}
