use std::sync::Arc;

use catgate::resources::collect;
use catgate::{Admission, AdmissionController, NodeUsage, ResourceSnapshot};

use crate::common::{node, setup, usage, FakeCluster};

mod common;

fn usage_of(name: &str, cpu: f64, memory: f64) -> NodeUsage {
  NodeUsage {
    node: name.to_string(),
    cpu_usage: cpu,
    cpu_capacity: 100.0,
    mem_usage: memory,
    mem_capacity: 100.0,
  }
}

fn controller() -> AdmissionController {
  AdmissionController::new(Arc::new(FakeCluster::default()), 80.0)
}

#[test]
fn it_should_admit_when_all_nodes_are_under_threshold() {
  setup();
  let snapshot = ResourceSnapshot::new(vec![usage_of("a", 10.0, 20.0), usage_of("b", 79.9, 79.9)]);
  assert_eq!(controller().evaluate(&snapshot), Admission::Local);
}

#[test]
fn it_should_require_dedicated_when_any_node_is_busy() {
  setup();
  // The busy node is neither the first nor the last one
  let snapshot = ResourceSnapshot::new(vec![
    usage_of("a", 10.0, 10.0),
    usage_of("b", 10.0, 85.0),
    usage_of("c", 10.0, 10.0),
  ]);
  assert_eq!(controller().evaluate(&snapshot), Admission::Dedicated);

  let snapshot = ResourceSnapshot::new(vec![usage_of("a", 10.0, 10.0), usage_of("b", 80.0, 10.0)]);
  assert_eq!(controller().evaluate(&snapshot), Admission::Dedicated);
}

#[test]
fn it_should_not_admit_without_nodes() {
  setup();
  assert_eq!(controller().evaluate(&ResourceSnapshot::default()), Admission::Dedicated);
}

#[test]
fn it_should_treat_zero_capacity_as_idle() {
  setup();
  let node = NodeUsage {
    node: "empty".to_string(),
    cpu_usage: 5.0,
    cpu_capacity: 0.0,
    mem_usage: 5.0,
    mem_capacity: 0.0,
  };
  assert_eq!(node.cpu_percent(), 0.0);
  assert_eq!(node.memory_percent(), 0.0);
  assert_eq!(controller().evaluate(&ResourceSnapshot::new(vec![node])), Admission::Local);
}

#[tokio::test]
async fn it_should_join_inventory_and_metrics() {
  setup();
  let cluster = FakeCluster {
    nodes: vec![node("a", "4", "8Gi"), node("b", "2", "4Gi")],
    metrics: vec![usage("a", "2000m", "2Gi"), usage("ghost", "1", "1Gi")],
    ..FakeCluster::default()
  };

  let snapshot = collect(&cluster).await.unwrap();
  let nodes = snapshot.nodes();
  assert_eq!(nodes.len(), 2);
  assert_eq!(nodes[0].node, "a");
  assert_eq!(nodes[0].cpu_percent(), 50.0);
  assert_eq!(nodes[0].memory_percent(), 25.0);
  // No metrics for b
  assert_eq!(nodes[1].node, "b");
  assert_eq!(nodes[1].cpu_usage, 0.0);
  assert_eq!(nodes[1].mem_usage, 0.0);
}

#[tokio::test]
async fn it_should_fail_closed_on_collection_error() {
  setup();
  let cluster = FakeCluster {
    nodes: vec![node("a", "4", "8Gi")],
    fail_metrics: true,
    ..FakeCluster::default()
  };
  let controller = AdmissionController::new(Arc::new(cluster), 80.0);
  assert_eq!(controller.decide().await, Admission::Dedicated);
}

#[tokio::test]
async fn it_should_fail_closed_on_malformed_quantity() {
  setup();
  let cluster = FakeCluster {
    nodes: vec![node("a", "four", "8Gi")],
    metrics: vec![usage("a", "1", "1Gi")],
    ..FakeCluster::default()
  };
  let controller = AdmissionController::new(Arc::new(cluster), 80.0);
  assert_eq!(controller.decide().await, Admission::Dedicated);
}

#[tokio::test]
async fn it_should_decide_from_live_usage() {
  setup();
  let idle = FakeCluster {
    nodes: vec![node("a", "4", "8Gi"), node("b", "4", "8Gi")],
    metrics: vec![usage("a", "1", "1Gi"), usage("b", "500m", "2Gi")],
    ..FakeCluster::default()
  };
  assert!(AdmissionController::new(Arc::new(idle), 80.0).decide().await.is_local());

  let busy = FakeCluster {
    nodes: vec![node("a", "4", "8Gi"), node("b", "4", "8Gi")],
    metrics: vec![usage("a", "1", "1Gi"), usage("b", "3900m", "2Gi")],
    ..FakeCluster::default()
  };
  assert!(!AdmissionController::new(Arc::new(busy), 80.0).decide().await.is_local());
}
