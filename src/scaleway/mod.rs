//! Scaleway implementation of the compute seam.
//!
//! Security groups and servers live in the Instances API of the configured
//! zone; key pairs are project SSH keys in IAM, which Scaleway injects into
//! every new server. Servers are created stopped so their cloud-init user
//! data is in place before first boot, then powered on.

mod error;
mod http;
mod image;
mod models;
mod user_data;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use futures::future::join_all;
use scaleway_rs::ScalewayApi;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::compute::{
    ComputeApi, ComputeFuture, CreatedKeyPair, IngressProtocol, IngressRule, InstanceFilter,
    InstanceSnapshot, InstanceState, InstanceTags, KeyPairRecord, LaunchRequest, NodeRole,
    SecurityGroupSpec, TAG_GROUP, TAG_KEY_PAIR, TAG_ROLE, ZoneAvailability,
};
use crate::config::ScalewayConfig;
use crate::keygen::SshKeygen;
use crate::remote::{CommandRunner, ProcessCommandRunner};
use models::{
    CreateRuleRequest, CreateSecurityGroupRequest, CreateServerRequest, CreateSshKeyRequest,
    ProductCatalogue, SecurityGroupEnvelope, SecurityGroupList, ServerActionRequest,
    ServerAvailability, ServerEnvelope, ServerList, ServerModel, SshKeyList, SshKeyModel,
};
use user_data::{CLOUD_INIT_USER_DATA_KEY, user_data_path};

pub use error::ScalewayComputeError;
pub use http::SCALEWAY_API_BASE;

const PUBLIC_DNS_SUFFIX: &str = "pub.instances.scw.cloud";
const PAGE_SIZE: &str = "100";

/// Zones served by the Instances API. Scaleway has no endpoint listing them.
pub const INSTANCE_ZONES: &[&str] = &[
    "fr-par-1", "fr-par-2", "fr-par-3", "nl-ams-1", "nl-ams-2", "nl-ams-3", "pl-waw-1",
    "pl-waw-2", "pl-waw-3",
];

/// Compute provider backed by the Scaleway Instances and IAM APIs.
#[derive(Clone)]
pub struct ScalewayCompute<R = ProcessCommandRunner> {
    api: ScalewayApi,
    http: http::ScalewayHttp,
    config: ScalewayConfig,
    keygen: SshKeygen<R>,
    catalogue: Arc<OnceCell<HashMap<String, u32>>>,
}

impl ScalewayCompute<ProcessCommandRunner> {
    /// Constructs a provider talking to the public Scaleway API, generating
    /// key pairs with `ssh_keygen_bin`.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayComputeError::Config`] when the configuration fails
    /// validation.
    pub fn new(config: ScalewayConfig, ssh_keygen_bin: &str) -> Result<Self, ScalewayComputeError> {
        Self::with_base_url(
            config,
            SCALEWAY_API_BASE,
            SshKeygen::new(ssh_keygen_bin, ProcessCommandRunner),
        )
    }
}

impl<R: CommandRunner> ScalewayCompute<R> {
    /// Constructs a provider against `base_url` with an explicit key
    /// generator. Used to point the provider at a local mock server.
    ///
    /// # Errors
    ///
    /// Returns [`ScalewayComputeError::Config`] when the configuration fails
    /// validation and [`ScalewayComputeError::Provider`] when the HTTP client
    /// cannot be built.
    pub fn with_base_url(
        config: ScalewayConfig,
        base_url: &str,
        keygen: SshKeygen<R>,
    ) -> Result<Self, ScalewayComputeError> {
        config.validate()?;
        Ok(Self {
            api: ScalewayApi::new(&config.secret_key),
            http: http::ScalewayHttp::new(&config.secret_key, base_url)?,
            config,
            keygen,
            catalogue: Arc::new(OnceCell::new()),
        })
    }

    fn zone(&self) -> &str {
        &self.config.default_zone
    }

    fn project(&self) -> &str {
        &self.config.default_project_id
    }

    async fn list_security_groups(
        &self,
        name: &str,
    ) -> Result<Vec<SecurityGroupSpec>, ScalewayComputeError> {
        let url = self.http.instance_url(self.zone(), "security_groups");
        let listing: SecurityGroupList = self
            .http
            .get(
                &url,
                &[
                    ("name", name),
                    ("project", self.project()),
                    ("per_page", PAGE_SIZE),
                ],
            )
            .await?;
        Ok(listing
            .security_groups
            .into_iter()
            .map(|group| SecurityGroupSpec {
                id: group.id,
                name: group.name,
            })
            .collect())
    }

    async fn post_security_group(
        &self,
        name: &str,
        description: &str,
    ) -> Result<SecurityGroupSpec, ScalewayComputeError> {
        let url = self.http.instance_url(self.zone(), "security_groups");
        let payload = CreateSecurityGroupRequest {
            name,
            description,
            project: self.project(),
            stateful: true,
            inbound_default_policy: "drop",
            outbound_default_policy: "accept",
        };
        let created: SecurityGroupEnvelope = self.http.post(&url, &payload).await?;
        Ok(SecurityGroupSpec {
            id: created.security_group.id,
            name: created.security_group.name,
        })
    }

    async fn post_rule(
        &self,
        group: &SecurityGroupSpec,
        rule: &IngressRule,
    ) -> Result<(), ScalewayComputeError> {
        let url = self
            .http
            .instance_url(self.zone(), &format!("security_groups/{}/rules", group.id));
        let payload = CreateRuleRequest {
            protocol: match rule.protocol {
                IngressProtocol::Tcp => "TCP",
                IngressProtocol::Icmp => "ICMP",
            },
            direction: "inbound",
            action: "accept",
            ip_range: &rule.source,
            dest_port_from: rule.ports.map(|(from, _)| from),
            dest_port_to: rule.ports.map(|(_, to)| to),
        };
        self.http.post_ignoring_body(&url, &payload).await
    }

    async fn list_ssh_keys(&self, name: &str) -> Result<Vec<KeyPairRecord>, ScalewayComputeError> {
        let url = self.http.iam_url("ssh-keys");
        let listing: SshKeyList = self
            .http
            .get(
                &url,
                &[
                    ("name", name),
                    ("project_id", self.project()),
                    ("page_size", PAGE_SIZE),
                ],
            )
            .await?;
        Ok(listing
            .ssh_keys
            .into_iter()
            .map(|key| KeyPairRecord {
                id: key.id,
                name: key.name,
            })
            .collect())
    }

    async fn register_ssh_key(
        &self,
        name: &str,
    ) -> Result<CreatedKeyPair, crate::compute::ComputeError> {
        let generated = self.keygen.generate(name).await?;
        let url = self.http.iam_url("ssh-keys");
        let payload = CreateSshKeyRequest {
            name,
            public_key: &generated.public_key,
            project_id: self.project(),
        };
        let registered: SshKeyModel = self
            .http
            .post(&url, &payload)
            .await
            .map_err(|err| err.into_compute("create_key_pair"))?;
        info!(key_pair = %registered.name, id = %registered.id, "registered SSH key");
        Ok(CreatedKeyPair {
            id: registered.id,
            name: registered.name,
            material: generated.private_key,
        })
    }

    async fn create_server(&self, request: &LaunchRequest) -> Result<String, ScalewayComputeError> {
        let image_id = self.resolve_image_id(&self.image_query(&request.image)).await?;
        let url = self.http.instance_url(self.zone(), "servers");
        let payload = CreateServerRequest {
            name: &request.name,
            commercial_type: &request.instance_type,
            image: &image_id,
            project: self.project(),
            security_group: &request.security_group.id,
            dynamic_ip_required: true,
            routed_ip_enabled: true,
            tags: request.tags.to_labels(),
            stopped: true,
        };
        let created: ServerEnvelope = match self.http.post(&url, &payload).await {
            Ok(created) => created,
            Err(err) if is_instance_type_error(&err) => {
                return Err(ScalewayComputeError::InstanceTypeUnavailable {
                    instance_type: request.instance_type.clone(),
                    zone: self.zone().to_owned(),
                });
            }
            Err(err) => return Err(err),
        };
        let server_id = created.server.id;

        if let Err(err) = self.start_server(&server_id, request).await {
            let discarded = self.discard_server(&server_id).await;
            return Err(ScalewayComputeError::LaunchAborted {
                server_id,
                discarded,
                message: err.to_string(),
            });
        }
        info!(instance_id = %server_id, name = %request.name, "instance powering on");
        Ok(server_id)
    }

    async fn start_server(
        &self,
        server_id: &str,
        request: &LaunchRequest,
    ) -> Result<(), ScalewayComputeError> {
        if !request.boot_script.is_empty() {
            let user_data_url = self.http.instance_url(
                self.zone(),
                &user_data_path(server_id, CLOUD_INIT_USER_DATA_KEY),
            );
            self.http
                .patch_text(&user_data_url, &request.boot_script)
                .await?;
        }

        let action_url = self
            .http
            .instance_url(self.zone(), &format!("servers/{server_id}/action"));
        self.http
            .post_ignoring_body(&action_url, &ServerActionRequest { action: "poweron" })
            .await
    }

    /// Deletes a server that never started. Returns whether it is gone.
    async fn discard_server(&self, server_id: &str) -> bool {
        let url = self
            .http
            .instance_url(self.zone(), &format!("servers/{server_id}"));
        match self.http.delete(&url).await {
            Ok(()) => {
                info!(instance_id = server_id, "deleted server that failed to start");
                true
            }
            Err(err) => {
                warn!(
                    instance_id = server_id,
                    error = %err,
                    "stopped server left behind; delete it manually"
                );
                false
            }
        }
    }

    async fn fetch_server(
        &self,
        instance_id: &str,
    ) -> Result<Option<InstanceSnapshot>, ScalewayComputeError> {
        let url = self
            .http
            .instance_url(self.zone(), &format!("servers/{instance_id}"));
        let Some(envelope) = self.http.get_optional::<ServerEnvelope>(&url).await? else {
            return Ok(None);
        };
        let catalogue = self.catalogue().await;
        Ok(Some(snapshot_from(envelope.server, catalogue)))
    }

    async fn list_servers(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<InstanceSnapshot>, ScalewayComputeError> {
        let mut tags: Vec<String> = filter
            .group_id
            .iter()
            .map(|group| format!("{TAG_GROUP}={group}"))
            .collect();
        if let Some(role) = filter.role {
            tags.push(format!("{TAG_ROLE}={}", role.as_str()));
        }
        let tag_filter = tags.join(",");
        let mut query = vec![("project", self.project()), ("per_page", PAGE_SIZE)];
        if !tag_filter.is_empty() {
            query.push(("tags", tag_filter.as_str()));
        }
        let url = self.http.instance_url(self.zone(), "servers");
        let listing: ServerList = self.http.get(&url, &query).await?;
        let catalogue = self.catalogue().await;
        Ok(listing
            .servers
            .into_iter()
            .map(|server| snapshot_from(server, catalogue))
            .collect())
    }

    async fn zone_availability(&self, zone: &str, instance_type: &str) -> ZoneAvailability {
        let url = self
            .http
            .instance_url(zone, "products/servers/availability");
        let available = match self
            .http
            .get::<ServerAvailability>(&url, &[("per_page", PAGE_SIZE)])
            .await
        {
            Ok(listing) => Some(
                listing
                    .servers
                    .get(instance_type)
                    .is_some_and(|entry| entry.availability != "shortage"),
            ),
            Err(err) => {
                warn!(zone, error = %err, "zone availability unknown");
                None
            }
        };
        ZoneAvailability {
            zone: zone.to_owned(),
            available,
        }
    }

    /// vCPU counts per commercial type, fetched once per provider.
    async fn catalogue(&self) -> Option<&HashMap<String, u32>> {
        let result = self
            .catalogue
            .get_or_try_init(|| async {
                let url = self.http.instance_url(self.zone(), "products/servers");
                let products: ProductCatalogue =
                    self.http.get(&url, &[("per_page", PAGE_SIZE)]).await?;
                debug!(types = products.servers.len(), "loaded server catalogue");
                Ok::<_, ScalewayComputeError>(
                    products
                        .servers
                        .into_iter()
                        .map(|(name, product)| (name, product.ncpus))
                        .collect(),
                )
            })
            .await;
        match result {
            Ok(catalogue) => Some(catalogue),
            Err(err) => {
                warn!(error = %err, "server catalogue unavailable; process counts unknown");
                None
            }
        }
    }
}

fn is_instance_type_error(err: &ScalewayComputeError) -> bool {
    match err {
        ScalewayComputeError::Http {
            resource, message, ..
        } => {
            resource.as_deref() == Some("commercial_type")
                || message.to_ascii_lowercase().contains("commercial_type")
        }
        _ => false,
    }
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.parse().ok()
}

fn snapshot_from(
    server: ServerModel,
    catalogue: Option<&HashMap<String, u32>>,
) -> InstanceSnapshot {
    let public_ip = server
        .public_ip
        .iter()
        .chain(server.public_ips.iter())
        .find_map(|ip| parse_ip(&ip.address));
    let dns_name = public_ip.map(|_| format!("{}.{PUBLIC_DNS_SUFFIX}", server.id));
    let process_count =
        catalogue.and_then(|products| products.get(&server.commercial_type).copied());
    InstanceSnapshot {
        state: InstanceState::from_provider(&server.state),
        public_ip,
        private_ip: server.private_ip.as_deref().and_then(parse_ip),
        dns_name,
        process_count,
        security_group: server.security_group.map(|group| SecurityGroupSpec {
            id: group.id,
            name: group.name,
        }),
        key_pair: InstanceTags::lookup(&server.tags, TAG_KEY_PAIR).map(str::to_owned),
        role: InstanceTags::lookup(&server.tags, TAG_ROLE).and_then(NodeRole::from_tag),
        group_id: InstanceTags::lookup(&server.tags, TAG_GROUP).map(str::to_owned),
        id: server.id,
    }
}

impl<R: CommandRunner> ComputeApi for ScalewayCompute<R> {
    fn find_security_groups<'a>(
        &'a self,
        name: &'a str,
    ) -> ComputeFuture<'a, Vec<SecurityGroupSpec>> {
        Box::pin(async move {
            self.list_security_groups(name)
                .await
                .map_err(|err| err.into_compute("find_security_groups"))
        })
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        description: &'a str,
    ) -> ComputeFuture<'a, SecurityGroupSpec> {
        Box::pin(async move {
            self.post_security_group(name, description)
                .await
                .map_err(|err| err.into_compute("create_security_group"))
        })
    }

    fn authorize_ingress<'a>(
        &'a self,
        group: &'a SecurityGroupSpec,
        rule: &'a IngressRule,
    ) -> ComputeFuture<'a, ()> {
        Box::pin(async move {
            self.post_rule(group, rule)
                .await
                .map_err(|err| err.into_compute("authorize_ingress"))
        })
    }

    fn find_key_pairs<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Vec<KeyPairRecord>> {
        Box::pin(async move {
            self.list_ssh_keys(name)
                .await
                .map_err(|err| err.into_compute("find_key_pairs"))
        })
    }

    fn create_key_pair<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, CreatedKeyPair> {
        Box::pin(async move { self.register_ssh_key(name).await })
    }

    fn launch_instance<'a>(&'a self, request: &'a LaunchRequest) -> ComputeFuture<'a, String> {
        Box::pin(async move {
            self.create_server(request)
                .await
                .map_err(|err| err.into_compute("launch_instance"))
        })
    }

    fn describe_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ComputeFuture<'a, Option<InstanceSnapshot>> {
        Box::pin(async move {
            self.fetch_server(instance_id)
                .await
                .map_err(|err| err.into_compute("describe_instance"))
        })
    }

    fn list_instances<'a>(
        &'a self,
        filter: &'a InstanceFilter,
    ) -> ComputeFuture<'a, Vec<InstanceSnapshot>> {
        Box::pin(async move {
            self.list_servers(filter)
                .await
                .map_err(|err| err.into_compute("list_instances"))
        })
    }

    fn location(&self) -> &str {
        self.zone()
    }

    fn list_zones<'a>(
        &'a self,
        instance_type: &'a str,
    ) -> ComputeFuture<'a, Vec<ZoneAvailability>> {
        Box::pin(async move {
            Ok(join_all(
                INSTANCE_ZONES
                    .iter()
                    .map(|zone| self.zone_availability(zone, instance_type)),
            )
            .await)
        })
    }
}

#[cfg(test)]
mod tests;
