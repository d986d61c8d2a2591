//! Unit tests for Scaleway payload mapping and image selection.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use rstest::rstest;
use scaleway_rs::ScalewayImage;

use super::image::{ImageQuery, resolve_image_id_with, select_image_id};
use super::models::{IpModel, ServerModel, ServerSecurityGroup};
use super::{ScalewayComputeError, is_instance_type_error, snapshot_from};
use crate::compute::{InstanceState, NodeRole};

#[derive(Copy, Clone)]
struct ImageSpec {
    id: &'static str,
    arch: &'static str,
    state: &'static str,
    creation_date: &'static str,
}

fn image(spec: ImageSpec) -> ScalewayImage {
    ScalewayImage {
        id: spec.id.to_owned(),
        name: String::new(),
        arch: spec.arch.to_owned(),
        creation_date: spec.creation_date.to_owned(),
        modification_date: String::new(),
        from_server: None,
        organization: String::new(),
        public: true,
        state: spec.state.to_owned(),
        project: String::new(),
        tags: vec![],
        zone: String::new(),
        root_volume: scaleway_rs::ScalewayImageRootVolume {
            id: String::new(),
            name: String::new(),
            size: 0,
            volume_type: String::new(),
        },
        default_bootscript: None,
        extra_volumes: scaleway_rs::ScalewayImageExtraVolumes {
            volumes: HashMap::new(),
        },
    }
}

fn query() -> ImageQuery {
    ImageQuery {
        label: "Ubuntu 24.04 Noble Numbat".to_owned(),
        architecture: "x86_64".to_owned(),
        zone: "fr-par-1".to_owned(),
        project_id: "proj".to_owned(),
        organisation_id: None,
    }
}

fn server(tags: &[&str], public_ip: Option<&str>) -> ServerModel {
    ServerModel {
        id: "srv-1".to_owned(),
        state: "running".to_owned(),
        commercial_type: "DEV1-M".to_owned(),
        tags: tags.iter().map(|tag| (*tag).to_owned()).collect(),
        public_ip: public_ip.map(|address| IpModel {
            address: address.to_owned(),
        }),
        public_ips: Vec::new(),
        private_ip: Some("10.1.2.3".to_owned()),
        security_group: Some(ServerSecurityGroup {
            id: "sg-1".to_owned(),
            name: "armada-cluster-sg-v1".to_owned(),
        }),
    }
}

#[test]
fn select_image_id_returns_newest_creation_date() {
    let images = vec![
        image(ImageSpec {
            id: "older",
            arch: "x86_64",
            state: "available",
            creation_date: "2025-01-01T00:00:00Z",
        }),
        image(ImageSpec {
            id: "newest",
            arch: "x86_64",
            state: "available",
            creation_date: "2025-02-01T00:00:00Z",
        }),
    ];

    let id = select_image_id(images, &query()).expect("image selected");
    assert_eq!(id, "newest");
}

#[test]
fn select_image_id_errors_on_empty() {
    let err = select_image_id(Vec::new(), &query()).expect_err("empty candidates should fail");
    assert!(matches!(err, ScalewayComputeError::ImageNotFound { .. }));
}

#[tokio::test]
async fn resolve_image_id_falls_back_to_public_and_filters_arch() {
    let result = resolve_image_id_with(
        &query(),
        || async { Ok(Vec::new()) },
        || async {
            Ok(vec![
                image(ImageSpec {
                    id: "arm-img",
                    arch: "arm64",
                    state: "available",
                    creation_date: "2025-03-01T00:00:00Z",
                }),
                image(ImageSpec {
                    id: "public-img",
                    arch: "x86_64",
                    state: "available",
                    creation_date: "2025-01-01T00:00:00Z",
                }),
            ])
        },
    )
    .await
    .expect("public fallback should resolve");

    assert_eq!(result, "public-img");
}

#[tokio::test]
async fn resolve_image_id_propagates_errors() {
    let err = resolve_image_id_with(
        &query(),
        || async {
            Err(ScalewayComputeError::Provider {
                message: "boom".to_owned(),
            })
        },
        || async { Ok(Vec::new()) },
    )
    .await
    .expect_err("error should surface");

    assert!(matches!(err, ScalewayComputeError::Provider { message } if message == "boom"));
}

#[test]
fn snapshot_recovers_tags_dns_and_process_count() {
    let catalogue = HashMap::from([("DEV1-M".to_owned(), 3)]);
    let snapshot = snapshot_from(
        server(
            &["armada-group=1700000000", "armada-role=coordinator", "armada-key=kp"],
            Some("51.15.0.10"),
        ),
        Some(&catalogue),
    );

    assert_eq!(snapshot.state, InstanceState::Running);
    assert_eq!(
        snapshot.public_ip,
        Some(IpAddr::V4(Ipv4Addr::new(51, 15, 0, 10)))
    );
    assert_eq!(
        snapshot.dns_name.as_deref(),
        Some("srv-1.pub.instances.scw.cloud")
    );
    assert_eq!(snapshot.process_count, Some(3));
    assert_eq!(snapshot.role, Some(NodeRole::Coordinator));
    assert_eq!(snapshot.group_id.as_deref(), Some("1700000000"));
    assert_eq!(snapshot.key_pair.as_deref(), Some("kp"));
    assert_eq!(
        snapshot.security_group.map(|group| group.name).as_deref(),
        Some("armada-cluster-sg-v1")
    );
}

#[test]
fn snapshot_without_public_ip_has_no_dns() {
    let snapshot = snapshot_from(server(&[], None), None);

    assert!(snapshot.public_ip.is_none());
    assert!(snapshot.dns_name.is_none());
    assert!(snapshot.process_count.is_none());
    assert_eq!(snapshot.address(), Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
}

#[rstest]
#[case(Some("commercial_type"), "bad request", true)]
#[case(None, "invalid commercial_type DEV9-XL", true)]
#[case(None, "quota exceeded", false)]
fn detects_instance_type_errors(
    #[case] resource: Option<&str>,
    #[case] message: &str,
    #[case] expected: bool,
) {
    let err = ScalewayComputeError::Http {
        status: 400,
        message: message.to_owned(),
        resource: resource.map(str::to_owned),
    };
    assert_eq!(is_instance_type_error(&err), expected);
}
