//! Cloud-init user-data helpers for the Scaleway provider.
//!
//! Scaleway exposes instance user-data as a per-server key/value store. When
//! the key is set to `cloud-init`, the value is consumed by cloud-init on the
//! instance's first boot, so it must be written while the server is still
//! stopped.

/// Reserved user-data key that Scaleway recognises for cloud-init payloads.
pub(super) const CLOUD_INIT_USER_DATA_KEY: &str = "cloud-init";

/// Path of a user-data entry relative to the zone's instance endpoint.
pub(super) fn user_data_path(server_id: &str, key: &str) -> String {
    format!("servers/{server_id}/user_data/{key}")
}
