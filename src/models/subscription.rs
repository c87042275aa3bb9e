//! Azure subscription data model.

use serde::{Deserialize, Serialize};

/// Role a subscription plays in a reconciliation run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionRole {
    /// Listed in the hub subscription ids, searched for hubs (and spokes).
    HubCandidate,
    /// Any other visible subscription, searched for spokes only.
    SpokeCandidate,
    /// Named in the spoke exclude list, never searched for spokes.
    Excluded,
}

/// A subscription as seen by discovery. Immutable for the run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Subscription GUID.
    pub id: String,
    /// Display name, or the id when the tenant listing was unavailable.
    pub display_name: String,
    /// Classification for this run.
    pub role: SubscriptionRole,
}

impl Subscription {
    pub fn new(id: &str, display_name: &str, role: SubscriptionRole) -> Self {
        Subscription {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role,
        }
    }
}

/// Raw tenant subscription as returned by the subscription listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TenantSubscription {
    /// Subscription GUID.
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Lifecycle state, e.g. `Enabled`, `Disabled`, `Warned`.
    pub state: String,
}

impl TenantSubscription {
    pub fn is_enabled(&self) -> bool {
        self.state.eq_ignore_ascii_case("Enabled")
    }
}
