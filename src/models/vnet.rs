//! Azure Virtual Network (VNet) data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Role of a classified VNet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VnetRole {
    Hub,
    Spoke,
}

impl fmt::Display for VnetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VnetRole::Hub => write!(f, "Hub"),
            VnetRole::Spoke => write!(f, "Spoke"),
        }
    }
}

/// Unclassified VNet as returned by a subscription listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VnetRecord {
    /// Full ARM resource id.
    pub id: String,
    /// Name of the virtual network.
    pub name: String,
    /// Subscription the VNet lives in.
    pub subscription_id: String,
    /// Azure region, as reported by the API.
    pub location: String,
    /// Resource tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl VnetRecord {
    /// Look up a tag value. Azure tag names are case-insensitive.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A VNet that passed the hub or spoke predicate. Read-only after discovery.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VirtualNetwork {
    /// Full ARM resource id.
    pub id: String,
    /// Name of the virtual network.
    pub name: String,
    /// Subscription the VNet lives in.
    pub subscription_id: String,
    /// Azure region, lowercased.
    pub region: String,
    /// Hub or spoke.
    pub role: VnetRole,
    /// Resource tags.
    pub tags: BTreeMap<String, String>,
}

impl VirtualNetwork {
    pub fn from_record(record: &VnetRecord, role: VnetRole) -> Self {
        VirtualNetwork {
            id: record.id.clone(),
            name: record.name.clone(),
            subscription_id: record.subscription_id.clone(),
            region: record.location.to_ascii_lowercase(),
            role,
            tags: record.tags.clone(),
        }
    }
}

impl fmt::Display for VirtualNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {}] ({})",
            self.name, self.role, self.region, self.subscription_id
        )
    }
}
