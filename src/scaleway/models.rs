//! Request and response payloads for the Scaleway Instances and IAM APIs.
//!
//! Only the fields the provider reads are modelled; serde ignores the rest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Error body returned with non-success statuses.
#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorModel {
    pub(super) message: String,
    #[serde(default)]
    pub(super) resource: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupModel {
    pub(super) id: String,
    pub(super) name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupList {
    #[serde(default)]
    pub(super) security_groups: Vec<SecurityGroupModel>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SecurityGroupEnvelope {
    pub(super) security_group: SecurityGroupModel,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSecurityGroupRequest<'a> {
    pub(super) name: &'a str,
    pub(super) description: &'a str,
    pub(super) project: &'a str,
    pub(super) stateful: bool,
    pub(super) inbound_default_policy: &'static str,
    pub(super) outbound_default_policy: &'static str,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateRuleRequest<'a> {
    pub(super) protocol: &'static str,
    pub(super) direction: &'static str,
    pub(super) action: &'static str,
    pub(super) ip_range: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) dest_port_from: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) dest_port_to: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub(super) struct SshKeyModel {
    pub(super) id: String,
    pub(super) name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct SshKeyList {
    #[serde(default)]
    pub(super) ssh_keys: Vec<SshKeyModel>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateSshKeyRequest<'a> {
    pub(super) name: &'a str,
    pub(super) public_key: &'a str,
    pub(super) project_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateServerRequest<'a> {
    pub(super) name: &'a str,
    pub(super) commercial_type: &'a str,
    pub(super) image: &'a str,
    pub(super) project: &'a str,
    pub(super) security_group: &'a str,
    pub(super) dynamic_ip_required: bool,
    pub(super) routed_ip_enabled: bool,
    pub(super) tags: Vec<String>,
    pub(super) stopped: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct IpModel {
    pub(super) address: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerSecurityGroup {
    pub(super) id: String,
    pub(super) name: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerModel {
    pub(super) id: String,
    pub(super) state: String,
    #[serde(default)]
    pub(super) commercial_type: String,
    #[serde(default)]
    pub(super) tags: Vec<String>,
    #[serde(default)]
    pub(super) public_ip: Option<IpModel>,
    #[serde(default)]
    pub(super) public_ips: Vec<IpModel>,
    #[serde(default)]
    pub(super) private_ip: Option<String>,
    #[serde(default)]
    pub(super) security_group: Option<ServerSecurityGroup>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: ServerModel,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerList {
    #[serde(default)]
    pub(super) servers: Vec<ServerModel>,
}

#[derive(Debug, Serialize)]
pub(super) struct ServerActionRequest {
    pub(super) action: &'static str,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductModel {
    pub(super) ncpus: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductCatalogue {
    #[serde(default)]
    pub(super) servers: HashMap<String, ProductModel>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AvailabilityModel {
    pub(super) availability: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerAvailability {
    #[serde(default)]
    pub(super) servers: HashMap<String, AvailabilityModel>,
}
