//! Find-or-create semantics over [`ComputeApi`].

use camino::Utf8Path;
use tracing::{debug, info, warn};

use super::{
    ComputeApi, ComputeError, IngressRule, InstanceFilter, InstanceInventory, InstanceSnapshot,
    InventoryEntry, KeyMaterial, KeyPairSpec, LaunchRequest, SecurityGroupSpec, ZoneAvailability,
};

/// Security group shared by every cluster unless the caller names another.
pub const DEFAULT_SECURITY_GROUP_NAME: &str = "armada-cluster-sg-v1";

const SECURITY_GROUP_DESCRIPTION: &str = "armada cluster traffic";

/// Key pair name used for `group_id` when the caller names none.
#[must_use]
pub fn default_key_pair_name(group_id: &str) -> String {
    format!("armada-key-pair-{group_id}")
}

/// Wraps a [`ComputeApi`] with idempotent resource resolution.
#[derive(Clone, Debug)]
pub struct ComputeAdapter<A> {
    api: A,
}

impl<A: ComputeApi> ComputeAdapter<A> {
    /// Wraps `api`.
    #[must_use]
    pub const fn new(api: A) -> Self {
        Self { api }
    }

    /// Returns the wrapped provider.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Returns the named security group, creating and opening it when absent.
    ///
    /// A freshly created group receives the [`IngressRule::cluster_defaults`]
    /// and is looked up again so the caller receives the provider's record.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ResourceAmbiguity`] when more than one group
    /// carries the name, and [`ComputeError::Adapter`] when a provider call
    /// fails or the created group cannot be found again.
    pub async fn resolve_or_create_security_group(
        &self,
        name: Option<&str>,
    ) -> Result<SecurityGroupSpec, ComputeError> {
        let wanted = name.unwrap_or(DEFAULT_SECURITY_GROUP_NAME);
        if let Some(existing) = self.find_unique_security_group(wanted).await? {
            debug!(security_group = %existing.name, id = %existing.id, "reusing security group");
            return Ok(existing);
        }

        info!(security_group = wanted, "creating security group");
        let created = self
            .api
            .create_security_group(wanted, SECURITY_GROUP_DESCRIPTION)
            .await?;
        for rule in IngressRule::cluster_defaults() {
            self.api.authorize_ingress(&created, &rule).await?;
        }

        self.find_unique_security_group(wanted)
            .await?
            .ok_or_else(|| {
                ComputeError::adapter(
                    "resolve_or_create_security_group",
                    format!("security group '{wanted}' missing after creation"),
                )
            })
    }

    async fn find_unique_security_group(
        &self,
        name: &str,
    ) -> Result<Option<SecurityGroupSpec>, ComputeError> {
        let mut matches: Vec<SecurityGroupSpec> = self
            .api
            .find_security_groups(name)
            .await?
            .into_iter()
            .filter(|group| group.name == name)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(ComputeError::ResourceAmbiguity {
                resource: String::from("security group"),
                name: name.to_owned(),
                count,
            }),
        }
    }

    /// Returns the named key pair, creating it when absent.
    ///
    /// A created pair carries its private key in memory only. An existing
    /// pair carries material only when `existing_key_path` names a readable
    /// file; otherwise a warning is logged and remote operations will later
    /// fail for want of a key.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::ResourceAmbiguity`] when more than one pair
    /// carries the name, [`ComputeError::KeyFile`] when the local key exists
    /// but cannot be read, and [`ComputeError::Adapter`] when a provider call
    /// fails. A failed listing never triggers creation.
    pub async fn resolve_or_create_key_pair(
        &self,
        name: Option<&str>,
        group_id: &str,
        existing_key_path: Option<&Utf8Path>,
    ) -> Result<KeyPairSpec, ComputeError> {
        let wanted = name.map_or_else(|| default_key_pair_name(group_id), ToOwned::to_owned);
        let matches = self
            .api
            .find_key_pairs(&wanted)
            .await?
            .into_iter()
            .filter(|pair| pair.name == wanted)
            .count();

        match matches {
            0 => {
                info!(key_pair = %wanted, "creating key pair");
                let created = self.api.create_key_pair(&wanted).await?;
                if created.material.is_empty() {
                    return Err(ComputeError::KeyGeneration {
                        message: format!("provider returned no private key for '{wanted}'"),
                    });
                }
                Ok(KeyPairSpec {
                    name: created.name,
                    material: Some(created.material),
                    created: true,
                })
            }
            1 => {
                let material = match existing_key_path {
                    Some(path) => KeyMaterial::load(path)?,
                    None => None,
                };
                if material.is_none() {
                    warn!(
                        key_pair = %wanted,
                        path = existing_key_path.map_or("<unset>", Utf8Path::as_str),
                        "key pair exists but no local private key was found"
                    );
                }
                Ok(KeyPairSpec {
                    name: wanted,
                    material,
                    created: false,
                })
            }
            count => Err(ComputeError::ResourceAmbiguity {
                resource: String::from("key pair"),
                name: wanted,
                count,
            }),
        }
    }

    /// Validates and submits a launch request, returning the new identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Validation`] for incomplete requests and
    /// [`ComputeError::Adapter`] when the provider rejects the launch.
    pub async fn launch_instance(&self, request: &LaunchRequest) -> Result<String, ComputeError> {
        request.validate()?;
        debug!(
            name = %request.name,
            role = %request.tags.role,
            instance_type = %request.instance_type,
            "launching instance"
        );
        self.api.launch_instance(request).await
    }

    /// Fetches the current snapshot of `instance_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Adapter`] when the provider call fails or the
    /// identifier is unknown.
    pub async fn describe_instance(
        &self,
        instance_id: &str,
    ) -> Result<InstanceSnapshot, ComputeError> {
        self.api
            .describe_instance(instance_id)
            .await?
            .ok_or_else(|| {
                ComputeError::adapter(
                    "describe_instance",
                    format!("instance {instance_id} not found"),
                )
            })
    }

    /// Lists starting or running instances matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Adapter`] when the provider call fails.
    pub async fn find_running_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<InstanceSnapshot>, ComputeError> {
        let instances = self.api.list_instances(filter).await?;
        Ok(instances
            .into_iter()
            .filter(|snapshot| snapshot.state.is_active() && filter.matches(snapshot))
            .collect())
    }

    /// Lists every active instance of the project, whichever group launched
    /// it, together with the zone the listing covers.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Adapter`] when the provider call fails.
    pub async fn inventory(&self) -> Result<InstanceInventory, ComputeError> {
        let active = self.find_running_instances(&InstanceFilter::all()).await?;
        debug!(zone = self.api.location(), total = active.len(), "instances listed");
        Ok(InstanceInventory {
            zone: self.api.location().to_owned(),
            total: active.len(),
            instances: active.iter().map(InventoryEntry::from).collect(),
        })
    }

    /// Reports per zone whether `instance_type` can currently be launched.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Adapter`] when the provider call fails.
    pub async fn list_zones(
        &self,
        instance_type: &str,
    ) -> Result<Vec<ZoneAvailability>, ComputeError> {
        let zones = self.api.list_zones(instance_type).await?;
        if zones.iter().all(|zone| zone.available != Some(true)) {
            warn!(instance_type, "no zone reports the instance type as available");
        }
        Ok(zones)
    }
}
