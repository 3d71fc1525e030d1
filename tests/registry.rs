use std::sync::Arc;

use catgate::provision::{unit_name, Provisioner};
use catgate::registry::normalize_session_id;
use catgate::SessionRegistry;

use crate::common::{fast_provision, setup, FakeCluster};

mod common;

fn registry(cluster: Arc<FakeCluster>) -> SessionRegistry {
  SessionRegistry::new(Provisioner::new(cluster, fast_provision(5858)))
}

#[test]
fn it_should_normalize_session_ids() {
  assert_eq!(normalize_session_id("Alice-01").unwrap(), "alice-01");
  assert!(normalize_session_id("").is_err());
  assert!(normalize_session_id("-abc").is_err());
  assert!(normalize_session_id("abc-").is_err());
  assert!(normalize_session_id("a_b").is_err());
  assert!(normalize_session_id("../etc").is_err());
  assert!(normalize_session_id(&"x".repeat(51)).is_err());
  assert!(normalize_session_id(&"x".repeat(50)).is_ok());
}

#[tokio::test]
async fn it_should_provision_once_and_reuse() {
  setup();
  let cluster = Arc::new(FakeCluster {
    unit_ip: Some("10.0.0.7".to_string()),
    ..FakeCluster::default()
  });
  let registry = registry(cluster.clone());

  assert!(registry.get("s1").await.is_none());
  let session = registry.get_or_create("s1").await.unwrap();
  assert_eq!(session.unit_name, unit_name("s1"));
  assert_eq!(session.unit_name, "sandbox-pod-s1");
  assert_eq!(session.unit_address, "http://10.0.0.7:5858");

  let again = registry.get_or_create("s1").await.unwrap();
  assert_eq!(again, session);
  assert_eq!(registry.get("s1").await, Some(session));
  assert_eq!(cluster.creates(), 1);
  assert_eq!(registry.bound_sessions().await, 1);
}

#[tokio::test]
async fn it_should_provision_once_under_concurrent_first_requests() {
  setup();
  let cluster = Arc::new(FakeCluster {
    unit_ip: Some("10.0.0.8".to_string()),
    ..FakeCluster::default()
  });
  let registry = Arc::new(registry(cluster.clone()));

  let mut handles = vec![];
  for _ in 0..16 {
    let registry = registry.clone();
    handles.push(tokio::spawn(async move { registry.get_or_create("racy").await }));
  }

  let mut addresses = vec![];
  for handle in handles {
    addresses.push(handle.await.unwrap().unwrap().unit_address);
  }
  assert!(addresses.iter().all(|address| address == "http://10.0.0.8:5858"));
  assert_eq!(cluster.creates(), 1);
}

#[tokio::test]
async fn it_should_report_no_route_when_creation_fails() {
  setup();
  let cluster = Arc::new(FakeCluster {
    fail_create: true,
    unit_ip: Some("10.0.0.9".to_string()),
    ..FakeCluster::default()
  });
  let registry = registry(cluster.clone());

  assert!(registry.get_or_create("broken").await.is_none());
  assert!(registry.get("broken").await.is_none());
  assert_eq!(registry.bound_sessions().await, 0);
}

#[tokio::test]
async fn it_should_give_up_when_unit_never_gets_address() {
  setup();
  let cluster = Arc::new(FakeCluster::default());
  let registry = registry(cluster.clone());

  assert!(registry.get_or_create("pending").await.is_none());
  assert_eq!(cluster.polls.load(std::sync::atomic::Ordering::SeqCst), 5);
}
