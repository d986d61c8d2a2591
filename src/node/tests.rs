//! Unit tests for the instance handle state machine.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::compute::{InstanceTags, KeyMaterial, SecurityGroupSpec};
use crate::remote::RemoteConfig;
use crate::test_support::{CommandInvocation, FakeCompute, ScriptedRunner};

const MARKER: &str = "/home/ubuntu/user_data_done";

fn fast_policy() -> WaitPolicy {
    WaitPolicy::new(Duration::from_millis(1), Duration::from_millis(200))
}

fn request(name: &str) -> LaunchRequest {
    LaunchRequest::builder(
        SecurityGroupSpec {
            id: String::from("sg-1"),
            name: String::from("armada-cluster-sg-v1"),
        },
        InstanceTags {
            group_id: String::from("1700000000"),
            role: NodeRole::Worker,
            key_pair: String::from("armada-key-pair-1700000000"),
        },
    )
    .name(name)
    .image("ubuntu")
    .instance_type("DEV1-S")
    .boot_script("#!/bin/sh\n")
    .build()
    .expect("valid request")
}

#[fixture]
fn fake() -> FakeCompute {
    FakeCompute::new()
}

fn remote(runner: ScriptedRunner) -> RemoteExecutor<ScriptedRunner> {
    let config = RemoteConfig {
        connect_attempts: 1,
        connect_backoff_ms: 0,
        ..RemoteConfig::default()
    };
    RemoteExecutor::new(config, runner, Some(&KeyMaterial::new("key"))).expect("executor")
}

async fn launched_ready(fake: &FakeCompute) -> InstanceHandle {
    let compute = ComputeAdapter::new(fake.clone());
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");
    handle
        .launch(&compute, &request("worker-1"))
        .await
        .expect("launch");
    handle
        .wait_until_ready(&compute, fast_policy(), &CancellationToken::new())
        .await
        .expect("ready");
    handle
}

#[rstest]
#[tokio::test]
async fn launch_records_instance_id(fake: FakeCompute) {
    let compute = ComputeAdapter::new(fake);
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");

    handle
        .launch(&compute, &request("worker-1"))
        .await
        .expect("launch");

    assert_eq!(handle.state(), &NodeState::Launching);
    assert_eq!(handle.instance_id(), Some("instance-1"));
    assert!(handle.address().is_none());
}

#[rstest]
#[tokio::test]
async fn launch_failure_marks_handle_failed(fake: FakeCompute) {
    fake.fail_launch_named("worker-1");
    let compute = ComputeAdapter::new(fake);
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");

    let err = handle
        .launch(&compute, &request("worker-1"))
        .await
        .expect_err("launch should fail");

    assert!(matches!(err, NodeError::Compute { .. }));
    assert!(matches!(
        handle.state(),
        NodeState::Failed {
            stage: FailureStage::Launch,
            ..
        }
    ));
}

#[rstest]
#[tokio::test]
async fn wait_until_ready_records_networking_after_pending_polls(fake: FakeCompute) {
    fake.set_pending_polls(3);

    let handle = launched_ready(&fake).await;

    assert_eq!(handle.state(), &NodeState::Ready);
    assert!(handle.address().is_some());
    assert_eq!(handle.dns_name(), Some("instance-1.nodes.test"));
    assert_eq!(handle.process_count(), Some(2));
    assert_eq!(fake.call_count("describe_instance"), 4);
}

#[rstest]
#[tokio::test]
async fn wait_until_ready_times_out(fake: FakeCompute) {
    fake.set_pending_polls(u32::MAX);
    let compute = ComputeAdapter::new(fake);
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");
    handle
        .launch(&compute, &request("worker-1"))
        .await
        .expect("launch");

    let policy = WaitPolicy::new(Duration::from_millis(1), Duration::from_millis(10));
    let err = handle
        .wait_until_ready(&compute, policy, &CancellationToken::new())
        .await
        .expect_err("should time out");

    assert!(matches!(err, NodeError::ReadinessTimeout { .. }));
    assert!(handle.state().is_failed());
    assert!(handle.address().is_none());
}

#[rstest]
#[tokio::test]
async fn wait_until_ready_honours_cancellation(fake: FakeCompute) {
    fake.set_pending_polls(u32::MAX);
    let compute = ComputeAdapter::new(fake);
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");
    handle
        .launch(&compute, &request("worker-1"))
        .await
        .expect("launch");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = handle
        .wait_until_ready(&compute, fast_policy(), &cancel)
        .await
        .expect_err("should be cancelled");

    assert!(matches!(err, NodeError::Cancelled { .. }));
}

#[rstest]
#[tokio::test]
async fn wait_until_ready_rejects_unlaunched_handle(fake: FakeCompute) {
    let compute = ComputeAdapter::new(fake);
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");

    let err = handle
        .wait_until_ready(&compute, fast_policy(), &CancellationToken::new())
        .await
        .expect_err("not launched");

    assert!(matches!(err, NodeError::NotReady { .. }));
}

#[rstest]
#[tokio::test]
async fn await_boot_polls_until_marker_exists(fake: FakeCompute) {
    let mut handle = launched_ready(&fake).await;
    let runner = ScriptedRunner::new();
    runner.push_output(Some(1), "", "");
    runner.push_output(Some(255), "", "Connection refused");
    runner.push_output(Some(0), "true\n", "");

    handle
        .await_boot(
            &remote(runner.clone()),
            MARKER,
            fast_policy(),
            &CancellationToken::new(),
        )
        .await
        .expect("boot finished");

    assert!(handle.is_boot_configured());
    let checks = runner.invocations();
    assert_eq!(checks.len(), 3);
    assert_eq!(
        checks.last().and_then(CommandInvocation::last_arg).as_deref(),
        Some("[ -e /home/ubuntu/user_data_done ] && echo \"true\"")
    );
}

#[rstest]
#[tokio::test]
async fn await_boot_requires_ready_state() {
    let mut handle = InstanceHandle::new(NodeRole::Worker, "worker-1");
    let err = handle
        .await_boot(
            &remote(ScriptedRunner::succeeding()),
            MARKER,
            fast_policy(),
            &CancellationToken::new(),
        )
        .await
        .expect_err("not ready");

    assert!(matches!(err, NodeError::NotReady { .. }));
}

#[rstest]
#[tokio::test]
async fn await_boot_without_key_reports_missing_material(fake: FakeCompute) {
    let mut handle = launched_ready(&fake).await;
    let executor = RemoteExecutor::new(RemoteConfig::default(), ScriptedRunner::succeeding(), None)
        .expect("executor");

    let err = handle
        .await_boot(&executor, MARKER, fast_policy(), &CancellationToken::new())
        .await
        .expect_err("no key");

    assert!(matches!(
        err,
        NodeError::Remote {
            source: RemoteError::MissingKeyMaterial,
            ..
        }
    ));
}

#[test]
fn from_snapshot_starts_ready() {
    let snapshot = InstanceSnapshot {
        id: String::from("srv-9"),
        state: InstanceState::Running,
        public_ip: Some("198.51.100.7".parse().expect("ip")),
        private_ip: None,
        dns_name: Some(String::from("srv-9.pub.instances.scw.cloud")),
        process_count: Some(4),
        security_group: None,
        key_pair: None,
        role: Some(NodeRole::Coordinator),
        group_id: Some(String::from("1")),
    };

    let handle = InstanceHandle::from_snapshot(NodeRole::Coordinator, &snapshot);

    assert_eq!(handle.state(), &NodeState::Ready);
    assert_eq!(handle.instance_id(), Some("srv-9"));
    assert_eq!(handle.process_count(), Some(4));
    assert_eq!(handle.dns_name(), Some("srv-9.pub.instances.scw.cloud"));
}

#[test]
fn boot_marker_check_quotes_marker_paths_with_spaces() {
    assert_eq!(
        boot_marker_check("/tmp/boot done"),
        "[ -e '/tmp/boot done' ] && echo \"true\""
    );
}
