//! Directional VNet peering data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `peeringState` of a peering as reported by Azure.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeeringState {
    /// Only this side exists.
    Initiated,
    /// Both sides exist and traffic flows.
    Connected,
    /// The remote side was removed.
    Disconnected,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PeeringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeeringState::Initiated => "Initiated",
            PeeringState::Connected => "Connected",
            PeeringState::Disconnected => "Disconnected",
            PeeringState::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// `peeringSyncLevel`: whether the peering knows the current remote address space.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLevel {
    FullyInSync,
    RemoteNotInSync,
    LocalNotInSync,
    LocalAndRemoteNotInSync,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SyncLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncLevel::FullyInSync => "FullyInSync",
            SyncLevel::RemoteNotInSync => "RemoteNotInSync",
            SyncLevel::LocalNotInSync => "LocalNotInSync",
            SyncLevel::LocalAndRemoteNotInSync => "LocalAndRemoteNotInSync",
            SyncLevel::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// One direction of a hub-spoke connection, owned by `owner_vnet_id`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Peering {
    /// Peering resource name.
    pub name: String,
    /// Id of the VNet the peering belongs to.
    pub owner_vnet_id: String,
    /// Id of the VNet it points at.
    pub remote_vnet_id: String,
    /// Connection state.
    pub connection_state: PeeringState,
    pub allow_virtual_network_access: bool,
    pub allow_forwarded_traffic: bool,
    pub allow_gateway_transit: bool,
    pub use_remote_gateways: bool,
    /// Not reported by older API versions.
    pub sync_level: Option<SyncLevel>,
    /// ARM `provisioningState`, e.g. `Succeeded`, `Updating`.
    pub provisioning_state: Option<String>,
}

impl Peering {
    /// True when this peering targets `vnet_id`. Resource ids compare case-insensitively.
    pub fn points_at(&self, vnet_id: &str) -> bool {
        self.remote_vnet_id.eq_ignore_ascii_case(vnet_id)
    }
}

/// Attributes applied to every peering this tool creates (`peering_config`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PeeringSettings {
    pub allow_virtual_network_access: bool,
    pub allow_forwarded_traffic: bool,
    pub allow_gateway_transit: bool,
    pub use_remote_gateways: bool,
}

impl Default for PeeringSettings {
    fn default() -> Self {
        PeeringSettings {
            allow_virtual_network_access: true,
            allow_forwarded_traffic: true,
            allow_gateway_transit: false,
            use_remote_gateways: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_states_deserialize() {
        let state: PeeringState = serde_json::from_str("\"Connected\"").unwrap();
        assert_eq!(state, PeeringState::Connected);
        let state: PeeringState = serde_json::from_str("\"SomethingNew\"").unwrap();
        assert_eq!(state, PeeringState::Unknown);
        let sync: SyncLevel = serde_json::from_str("\"LocalNotInSync\"").unwrap();
        assert_eq!(sync, SyncLevel::LocalNotInSync);
    }

    #[test]
    fn test_peering_settings_defaults() {
        let settings: PeeringSettings =
            serde_yaml::from_str("allow_gateway_transit: true").unwrap();
        assert!(settings.allow_virtual_network_access);
        assert!(settings.allow_forwarded_traffic);
        assert!(settings.allow_gateway_transit);
        assert!(!settings.use_remote_gateways);
    }
}
