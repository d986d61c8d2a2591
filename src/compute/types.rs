//! Provider-neutral records exchanged across the compute seam.

use std::fmt;
use std::net::IpAddr;

use camino::Utf8Path;
use serde::Serialize;

use super::ComputeError;
use crate::files;

/// Tag key carrying the group identifier.
pub const TAG_GROUP: &str = "armada-group";
/// Tag key carrying the node role.
pub const TAG_ROLE: &str = "armada-role";
/// Tag key carrying the key pair name.
pub const TAG_KEY_PAIR: &str = "armada-key";

/// Role a node plays in the cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// The single node that orchestrates the worker pool.
    Coordinator,
    /// A node performing delegated execution.
    Worker,
}

impl NodeRole {
    /// Tag value for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Worker => "worker",
        }
    }

    /// Label used for the role in the node manifest.
    #[must_use]
    pub const fn manifest_label(self) -> &'static str {
        match self {
            Self::Coordinator => "master",
            Self::Worker => "worker",
        }
    }

    /// Parses a tag value produced by [`NodeRole::as_str`].
    #[must_use]
    pub fn from_tag(value: &str) -> Option<Self> {
        match value {
            "coordinator" => Some(Self::Coordinator),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state reported by the provider for an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceState {
    /// Created but not powered on.
    Stopped,
    /// Power-on in progress.
    Starting,
    /// Powered on.
    Running,
    /// Power-off in progress.
    Stopping,
    /// Any state the adapter does not model.
    Other(String),
}

impl InstanceState {
    /// Maps a provider state string onto the model.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        match value {
            "stopped" | "stopped in place" => Self::Stopped,
            "starting" => Self::Starting,
            "running" => Self::Running,
            "stopping" => Self::Stopping,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns `true` for instances that are up or on their way up.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Starting => f.write_str("starting"),
            Self::Running => f.write_str("running"),
            Self::Stopping => f.write_str("stopping"),
            Self::Other(value) => f.write_str(value),
        }
    }
}

/// Resolved security group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SecurityGroupSpec {
    /// Provider identifier.
    pub id: String,
    /// Resolved name.
    pub name: String,
}

/// Transport protocol of an inbound rule.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngressProtocol {
    /// TCP traffic over a port range.
    Tcp,
    /// ICMP traffic.
    Icmp,
}

/// One inbound rule on a security group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    /// Protocol the rule admits.
    pub protocol: IngressProtocol,
    /// Inclusive port range for TCP rules.
    pub ports: Option<(u16, u16)>,
    /// Source range in CIDR notation.
    pub source: String,
}

impl IngressRule {
    /// Rules applied to a freshly created cluster security group: every TCP
    /// port and ICMP, from anywhere.
    #[must_use]
    pub fn cluster_defaults() -> [Self; 2] {
        [
            Self {
                protocol: IngressProtocol::Tcp,
                ports: Some((1, 65535)),
                source: String::from("0.0.0.0/0"),
            },
            Self {
                protocol: IngressProtocol::Icmp,
                ports: None,
                source: String::from("0.0.0.0/0"),
            },
        ]
    }
}

/// Private key material held in memory.
///
/// `Debug` output is redacted so the key never reaches logs.
#[derive(Clone, Eq, PartialEq)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    /// Wraps PEM or OpenSSH encoded key text.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the key text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns `true` when no key text is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Loads key material from `path` when the file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::KeyFile`] when the file exists but cannot be
    /// read.
    pub fn load(path: &Utf8Path) -> Result<Option<Self>, ComputeError> {
        let key_file_error = |message: String| ComputeError::KeyFile {
            path: path.to_string(),
            message,
        };
        if !files::file_exists(path.as_str()).map_err(key_file_error)? {
            return Ok(None);
        }
        let text = files::read_to_string(path.as_str()).map_err(key_file_error)?;
        Ok(Some(Self(text)))
    }

    /// Writes the key to `path` with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::KeyFile`] when the file cannot be written.
    pub fn persist(&self, path: &Utf8Path) -> Result<(), ComputeError> {
        files::write_owner_only(path.as_str(), &self.0).map_err(|message| {
            ComputeError::KeyFile {
                path: path.to_string(),
                message,
            }
        })
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// Key pair as listed by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPairRecord {
    /// Provider identifier.
    pub id: String,
    /// Key pair name.
    pub name: String,
}

/// Key pair returned by a create call, including its private half.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedKeyPair {
    /// Provider identifier.
    pub id: String,
    /// Key pair name.
    pub name: String,
    /// Private key text.
    pub material: KeyMaterial,
}

/// Resolved key pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyPairSpec {
    /// Resolved name.
    pub name: String,
    /// Private key, present when this run created the pair or a local key
    /// file was loaded.
    pub material: Option<KeyMaterial>,
    /// Whether this run created the pair.
    pub created: bool,
}

impl KeyPairSpec {
    /// Returns `true` when usable private key material is held.
    #[must_use]
    pub fn has_material(&self) -> bool {
        self.material
            .as_ref()
            .is_some_and(|material| !material.is_empty())
    }
}

/// Metadata attached to every launched instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceTags {
    /// Group identifier correlating every resource of one run.
    pub group_id: String,
    /// Role of the node.
    pub role: NodeRole,
    /// Key pair the node trusts.
    pub key_pair: String,
}

impl InstanceTags {
    /// Renders tags as `key=value` labels.
    #[must_use]
    pub fn to_labels(&self) -> Vec<String> {
        vec![
            format!("{TAG_GROUP}={}", self.group_id),
            format!("{TAG_ROLE}={}", self.role.as_str()),
            format!("{TAG_KEY_PAIR}={}", self.key_pair),
        ]
    }

    /// Returns the value of tag `key` among `labels`.
    #[must_use]
    pub fn lookup<'a>(labels: &'a [String], key: &str) -> Option<&'a str> {
        labels.iter().find_map(|label| {
            label
                .split_once('=')
                .filter(|(name, _)| *name == key)
                .map(|(_, value)| value)
        })
    }
}

/// Parameters for launching one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequest {
    /// Instance name.
    pub name: String,
    /// Image label or identifier.
    pub image: String,
    /// Commercial type or flavour.
    pub instance_type: String,
    /// Security group the instance joins.
    pub security_group: SecurityGroupSpec,
    /// First-boot script delivered as user data.
    pub boot_script: String,
    /// Cluster metadata.
    pub tags: InstanceTags,
}

impl LaunchRequest {
    /// Starts a builder for a [`LaunchRequest`].
    #[must_use]
    pub fn builder(security_group: SecurityGroupSpec, tags: InstanceTags) -> LaunchRequestBuilder {
        LaunchRequestBuilder::new(security_group, tags)
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] when any required field is empty.
    pub fn validate(&self) -> Result<(), ComputeError> {
        for (field, value) in [
            ("name", &self.name),
            ("image", &self.image),
            ("instance_type", &self.instance_type),
            ("security_group", &self.security_group.id),
            ("group_id", &self.tags.group_id),
            ("key_pair", &self.tags.key_pair),
        ] {
            if value.trim().is_empty() {
                return Err(ComputeError::Validation(field.to_owned()));
            }
        }
        Ok(())
    }
}

/// Builder for [`LaunchRequest`] that trims inputs and validates on build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequestBuilder {
    name: String,
    image: String,
    instance_type: String,
    security_group: SecurityGroupSpec,
    boot_script: String,
    tags: InstanceTags,
}

impl LaunchRequestBuilder {
    /// Creates a builder for an instance joining `security_group`.
    #[must_use]
    pub const fn new(security_group: SecurityGroupSpec, tags: InstanceTags) -> Self {
        Self {
            name: String::new(),
            image: String::new(),
            instance_type: String::new(),
            security_group,
            boot_script: String::new(),
            tags,
        }
    }

    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the image label or identifier.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the instance type.
    #[must_use]
    pub fn instance_type(mut self, value: impl Into<String>) -> Self {
        self.instance_type = value.into();
        self
    }

    /// Sets the first-boot script.
    #[must_use]
    pub fn boot_script(mut self, value: impl Into<String>) -> Self {
        self.boot_script = value.into();
        self
    }

    /// Builds and validates the [`LaunchRequest`]. The boot script is kept
    /// verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<LaunchRequest, ComputeError> {
        let request = LaunchRequest {
            name: self.name.trim().to_owned(),
            image: self.image.trim().to_owned(),
            instance_type: self.instance_type.trim().to_owned(),
            security_group: self.security_group,
            boot_script: self.boot_script,
            tags: self.tags,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Typed provider view of one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSnapshot {
    /// Provider identifier.
    pub id: String,
    /// Provider lifecycle state.
    pub state: InstanceState,
    /// Public address, once assigned.
    pub public_ip: Option<IpAddr>,
    /// Private address, once assigned.
    pub private_ip: Option<IpAddr>,
    /// Public DNS name, once assigned.
    pub dns_name: Option<String>,
    /// Number of vCPUs offered by the instance type.
    pub process_count: Option<u32>,
    /// Security group the instance belongs to.
    pub security_group: Option<SecurityGroupSpec>,
    /// Key pair name recovered from tags.
    pub key_pair: Option<String>,
    /// Role recovered from tags.
    pub role: Option<NodeRole>,
    /// Group identifier recovered from tags.
    pub group_id: Option<String>,
}

impl InstanceSnapshot {
    /// Returns the address remote commands should target, preferring the
    /// public one.
    #[must_use]
    pub fn address(&self) -> Option<IpAddr> {
        self.public_ip.or(self.private_ip)
    }

    /// Returns `true` when the instance is running with an address.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.state == InstanceState::Running && self.address().is_some()
    }
}

/// Selects instances by group and role tags.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceFilter {
    /// Group identifier to match; `None` matches every instance.
    pub group_id: Option<String>,
    /// Optional role to match.
    pub role: Option<NodeRole>,
}

impl InstanceFilter {
    /// Matches every instance in the project, tagged or not.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches every instance of `group_id`.
    #[must_use]
    pub fn group(group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            role: None,
        }
    }

    /// Narrows the filter to one role.
    #[must_use]
    pub const fn with_role(mut self, role: NodeRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Returns `true` when `snapshot` carries the filter's tags.
    #[must_use]
    pub fn matches(&self, snapshot: &InstanceSnapshot) -> bool {
        self.group_id
            .as_deref()
            .is_none_or(|group| snapshot.group_id.as_deref() == Some(group))
            && self.role.is_none_or(|role| snapshot.role == Some(role))
    }
}

/// Whether one zone can currently host an instance type.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ZoneAvailability {
    /// Zone name, for example `fr-par-1`.
    pub zone: String,
    /// `None` when the zone could not be queried.
    pub available: Option<bool>,
}

/// One line of an [`InstanceInventory`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InventoryEntry {
    /// Provider identifier.
    pub id: String,
    /// Provider lifecycle state.
    pub state: String,
    /// Address remote commands would target.
    pub address: Option<IpAddr>,
    /// Group identifier, for instances armada launched.
    pub group_id: Option<String>,
    /// Role, for instances armada launched.
    pub role: Option<NodeRole>,
}

impl From<&InstanceSnapshot> for InventoryEntry {
    fn from(snapshot: &InstanceSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            state: snapshot.state.to_string(),
            address: snapshot.address(),
            group_id: snapshot.group_id.clone(),
            role: snapshot.role,
        }
    }
}

/// Active instances of the whole project in the provider's zone.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceInventory {
    /// Zone the listing covers.
    pub zone: String,
    /// Number of starting or running instances.
    pub total: usize,
    /// The instances themselves.
    pub instances: Vec<InventoryEntry>,
}
