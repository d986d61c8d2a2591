//! Unit tests for find-or-create resource resolution.

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::test_support::FakeCompute;

#[fixture]
fn fake() -> FakeCompute {
    FakeCompute::new()
}

fn snapshot(id: &str, state: InstanceState, role: NodeRole) -> InstanceSnapshot {
    InstanceSnapshot {
        id: id.to_owned(),
        state,
        public_ip: None,
        private_ip: None,
        dns_name: None,
        process_count: None,
        security_group: None,
        key_pair: None,
        role: Some(role),
        group_id: Some(String::from("42")),
    }
}

#[rstest]
#[tokio::test]
async fn security_group_is_created_once_and_reused(fake: FakeCompute) {
    let adapter = ComputeAdapter::new(fake.clone());

    let first = adapter
        .resolve_or_create_security_group(None)
        .await
        .expect("first resolution");
    let second = adapter
        .resolve_or_create_security_group(None)
        .await
        .expect("second resolution");

    assert_eq!(first, second);
    assert_eq!(first.name, DEFAULT_SECURITY_GROUP_NAME);
    assert_eq!(fake.call_count("create_security_group"), 1);
    assert_eq!(fake.call_count("authorize_ingress"), 2);
}

#[rstest]
#[tokio::test]
async fn existing_security_group_is_not_recreated(fake: FakeCompute) {
    fake.seed_security_group("sg-7", "shared");
    let adapter = ComputeAdapter::new(fake.clone());

    let group = adapter
        .resolve_or_create_security_group(Some("shared"))
        .await
        .expect("resolution");

    assert_eq!(group.id, "sg-7");
    assert_eq!(fake.call_count("create_security_group"), 0);
}

#[rstest]
#[tokio::test]
async fn duplicate_security_groups_are_ambiguous(fake: FakeCompute) {
    fake.seed_security_group("sg-1", "shared");
    fake.seed_security_group("sg-2", "shared");
    let adapter = ComputeAdapter::new(fake);

    let err = adapter
        .resolve_or_create_security_group(Some("shared"))
        .await
        .expect_err("two matches");

    assert!(matches!(err, ComputeError::ResourceAmbiguity { count: 2, .. }));
}

#[rstest]
#[tokio::test]
async fn missing_key_pair_is_created_with_material(fake: FakeCompute) {
    let adapter = ComputeAdapter::new(fake.clone());

    let pair = adapter
        .resolve_or_create_key_pair(None, "42", None)
        .await
        .expect("creation");

    assert_eq!(pair.name, "armada-key-pair-42");
    assert!(pair.created);
    assert!(pair.has_material());
    assert_eq!(fake.call_count("create_key_pair"), 1);
}

#[rstest]
#[tokio::test]
async fn existing_key_pair_without_local_file_has_no_material(fake: FakeCompute) {
    fake.seed_key_pair("team-key");
    let adapter = ComputeAdapter::new(fake.clone());
    let dir = TempDir::new().expect("tempdir");
    let missing = Utf8PathBuf::from_path_buf(dir.path().join("absent.pem")).expect("utf-8");

    let pair = adapter
        .resolve_or_create_key_pair(Some("team-key"), "42", Some(&missing))
        .await
        .expect("resolution");

    assert!(!pair.created);
    assert!(!pair.has_material());
    assert_eq!(fake.call_count("create_key_pair"), 0);
}

#[rstest]
#[tokio::test]
async fn existing_key_pair_loads_local_file(fake: FakeCompute) {
    fake.seed_key_pair("team-key");
    let adapter = ComputeAdapter::new(fake);
    let dir = TempDir::new().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("team.pem")).expect("utf-8");
    KeyMaterial::new("PRIVATE KEY\n")
        .persist(&path)
        .expect("persist");

    let pair = adapter
        .resolve_or_create_key_pair(Some("team-key"), "42", Some(&path))
        .await
        .expect("resolution");

    assert_eq!(
        pair.material.as_ref().map(KeyMaterial::expose),
        Some("PRIVATE KEY\n")
    );
}

#[rstest]
#[tokio::test]
async fn key_pair_listing_failure_never_creates(fake: FakeCompute) {
    fake.fail_key_pair_listing("503 service unavailable");
    let adapter = ComputeAdapter::new(fake.clone());

    let err = adapter
        .resolve_or_create_key_pair(None, "42", None)
        .await
        .expect_err("listing fails");

    assert!(matches!(err, ComputeError::Adapter { .. }));
    assert_eq!(fake.call_count("create_key_pair"), 0);
}

#[rstest]
#[tokio::test]
async fn duplicate_key_pairs_are_ambiguous(fake: FakeCompute) {
    fake.seed_key_pair("team-key");
    fake.seed_key_pair("team-key");
    let adapter = ComputeAdapter::new(fake);

    let err = adapter
        .resolve_or_create_key_pair(Some("team-key"), "42", None)
        .await
        .expect_err("two matches");

    assert!(matches!(err, ComputeError::ResourceAmbiguity { count: 2, .. }));
}

#[rstest]
#[tokio::test]
async fn find_running_instances_drops_stopped_and_other_roles(fake: FakeCompute) {
    fake.seed_instance(snapshot("a", InstanceState::Running, NodeRole::Coordinator));
    fake.seed_instance(snapshot("b", InstanceState::Stopped, NodeRole::Coordinator));
    fake.seed_instance(snapshot("c", InstanceState::Running, NodeRole::Worker));
    let adapter = ComputeAdapter::new(fake);

    let found = adapter
        .find_running_instances(&InstanceFilter::group("42").with_role(NodeRole::Coordinator))
        .await
        .expect("listing");

    let ids: Vec<&str> = found.iter().map(|snapshot| snapshot.id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);
}

#[rstest]
#[tokio::test]
async fn describe_unknown_instance_is_an_error(fake: FakeCompute) {
    let adapter = ComputeAdapter::new(fake);

    let err = adapter
        .describe_instance("missing")
        .await
        .expect_err("unknown id");

    assert!(err.to_string().contains("missing"));
}

#[rstest]
#[tokio::test]
async fn launch_rejects_incomplete_requests(fake: FakeCompute) {
    let adapter = ComputeAdapter::new(fake.clone());
    let request = LaunchRequest {
        name: String::from("node"),
        image: String::new(),
        instance_type: String::from("DEV1-S"),
        security_group: SecurityGroupSpec {
            id: String::from("sg-1"),
            name: String::from("sg"),
        },
        boot_script: String::new(),
        tags: InstanceTags {
            group_id: String::from("42"),
            role: NodeRole::Worker,
            key_pair: String::from("kp"),
        },
    };

    let err = adapter
        .launch_instance(&request)
        .await
        .expect_err("missing image");

    assert!(matches!(err, ComputeError::Validation(_)));
    assert!(fake.launches().is_empty());
}

#[test]
fn tags_round_trip_through_labels() {
    let tags = InstanceTags {
        group_id: String::from("42"),
        role: NodeRole::Coordinator,
        key_pair: String::from("kp"),
    };
    let labels = tags.to_labels();

    assert_eq!(InstanceTags::lookup(&labels, TAG_GROUP), Some("42"));
    assert_eq!(
        InstanceTags::lookup(&labels, TAG_ROLE).and_then(NodeRole::from_tag),
        Some(NodeRole::Coordinator)
    );
    assert_eq!(InstanceTags::lookup(&labels, TAG_KEY_PAIR), Some("kp"));
}

#[test]
fn key_material_debug_is_redacted() {
    let material = KeyMaterial::new("secret");
    assert!(!format!("{material:?}").contains("secret"));
}

#[rstest]
#[tokio::test]
async fn inventory_counts_active_instances_of_every_group(fake: FakeCompute) {
    fake.seed_instance(snapshot("a", InstanceState::Running, NodeRole::Coordinator));
    fake.seed_instance(snapshot("b", InstanceState::Stopped, NodeRole::Worker));
    let mut untagged = snapshot("c", InstanceState::Starting, NodeRole::Worker);
    untagged.role = None;
    untagged.group_id = None;
    fake.seed_instance(untagged);
    let adapter = ComputeAdapter::new(fake);

    let inventory = adapter.inventory().await.expect("inventory");

    assert_eq!(inventory.zone, crate::test_support::FAKE_ZONE);
    assert_eq!(inventory.total, 2);
    let ids: Vec<&str> = inventory
        .instances
        .iter()
        .map(|entry| entry.id.as_str())
        .collect();
    assert_eq!(ids, ["a", "c"]);
    assert_eq!(inventory.instances.get(1).map(|entry| entry.role), Some(None));
}

#[rstest]
#[tokio::test]
async fn zones_are_passed_through(fake: FakeCompute) {
    fake.seed_zone("fr-par-1", Some(true));
    fake.seed_zone("nl-ams-1", None);
    let adapter = ComputeAdapter::new(fake.clone());

    let zones = adapter.list_zones("DEV1-S").await.expect("zones");

    assert_eq!(zones.len(), 2);
    assert_eq!(zones.first().and_then(|zone| zone.available), Some(true));
    assert_eq!(fake.call_count("list_zones"), 1);
}

#[test]
fn unscoped_filter_matches_untagged_instances() {
    let mut untagged = snapshot("x", InstanceState::Running, NodeRole::Worker);
    untagged.group_id = None;

    assert!(InstanceFilter::all().matches(&untagged));
    assert!(!InstanceFilter::group("42").matches(&untagged));
}
