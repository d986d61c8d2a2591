//! Typed seam over the compute provider.
//!
//! [`ComputeApi`] exposes the raw primitives a provider must offer: security
//! group and key pair listing and creation, instance launch, instance
//! inspection, and zone availability. [`ComputeAdapter`] layers find-or-create semantics, ambiguity
//! detection, and state filtering on top, so the orchestrator never sees a
//! provider payload.

mod adapter;
mod error;
mod types;

use std::future::Future;
use std::pin::Pin;

pub use adapter::{ComputeAdapter, DEFAULT_SECURITY_GROUP_NAME, default_key_pair_name};
pub use error::ComputeError;
pub use types::{
    CreatedKeyPair, IngressProtocol, IngressRule, InstanceFilter, InstanceInventory,
    InstanceSnapshot, InstanceState, InstanceTags, InventoryEntry, KeyMaterial, KeyPairRecord,
    KeyPairSpec, LaunchRequest, LaunchRequestBuilder, NodeRole, SecurityGroupSpec, TAG_GROUP,
    TAG_KEY_PAIR, TAG_ROLE, ZoneAvailability,
};

/// Future returned by compute operations.
pub type ComputeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ComputeError>> + Send + 'a>>;

/// Provider primitives consumed by [`ComputeAdapter`].
///
/// Implementations translate each call into one or more provider requests
/// and map every failure to [`ComputeError::Adapter`]. They never retry.
pub trait ComputeApi: Send + Sync {
    /// Lists security groups whose name matches `name` exactly.
    fn find_security_groups<'a>(&'a self, name: &'a str)
    -> ComputeFuture<'a, Vec<SecurityGroupSpec>>;

    /// Creates an empty security group.
    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        description: &'a str,
    ) -> ComputeFuture<'a, SecurityGroupSpec>;

    /// Adds one inbound rule to an existing security group.
    fn authorize_ingress<'a>(
        &'a self,
        group: &'a SecurityGroupSpec,
        rule: &'a IngressRule,
    ) -> ComputeFuture<'a, ()>;

    /// Lists key pairs whose name matches `name` exactly.
    fn find_key_pairs<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Vec<KeyPairRecord>>;

    /// Creates a key pair and returns its private half.
    fn create_key_pair<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, CreatedKeyPair>;

    /// Requests a new instance and returns its identifier once accepted.
    fn launch_instance<'a>(&'a self, request: &'a LaunchRequest) -> ComputeFuture<'a, String>;

    /// Fetches an instance by identifier. `None` means the provider does not
    /// know the identifier.
    fn describe_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ComputeFuture<'a, Option<InstanceSnapshot>>;

    /// Lists instances tagged for the filter's group and role, in any state.
    /// An unscoped filter lists every instance of the project.
    fn list_instances<'a>(
        &'a self,
        filter: &'a InstanceFilter,
    ) -> ComputeFuture<'a, Vec<InstanceSnapshot>>;

    /// Zone every other call targets.
    fn location(&self) -> &str;

    /// Reports, per zone the provider offers, whether `instance_type` can
    /// be launched there.
    fn list_zones<'a>(&'a self, instance_type: &'a str)
    -> ComputeFuture<'a, Vec<ZoneAvailability>>;
}

impl<T: ComputeApi + ?Sized> ComputeApi for std::sync::Arc<T> {
    fn find_security_groups<'a>(
        &'a self,
        name: &'a str,
    ) -> ComputeFuture<'a, Vec<SecurityGroupSpec>> {
        (**self).find_security_groups(name)
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        description: &'a str,
    ) -> ComputeFuture<'a, SecurityGroupSpec> {
        (**self).create_security_group(name, description)
    }

    fn authorize_ingress<'a>(
        &'a self,
        group: &'a SecurityGroupSpec,
        rule: &'a IngressRule,
    ) -> ComputeFuture<'a, ()> {
        (**self).authorize_ingress(group, rule)
    }

    fn find_key_pairs<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, Vec<KeyPairRecord>> {
        (**self).find_key_pairs(name)
    }

    fn create_key_pair<'a>(&'a self, name: &'a str) -> ComputeFuture<'a, CreatedKeyPair> {
        (**self).create_key_pair(name)
    }

    fn launch_instance<'a>(&'a self, request: &'a LaunchRequest) -> ComputeFuture<'a, String> {
        (**self).launch_instance(request)
    }

    fn describe_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> ComputeFuture<'a, Option<InstanceSnapshot>> {
        (**self).describe_instance(instance_id)
    }

    fn list_instances<'a>(
        &'a self,
        filter: &'a InstanceFilter,
    ) -> ComputeFuture<'a, Vec<InstanceSnapshot>> {
        (**self).list_instances(filter)
    }

    fn location(&self) -> &str {
        (**self).location()
    }

    fn list_zones<'a>(
        &'a self,
        instance_type: &'a str,
    ) -> ComputeFuture<'a, Vec<ZoneAvailability>> {
        (**self).list_zones(instance_type)
    }
}

#[cfg(test)]
mod tests;
