//! Subscription and VNet discovery.
//!
//! Runs once per run, read-only. A failing subscription is logged and left
//! out; only losing every hub subscription stops the run.

use crate::azure::NetworkClient;
use crate::config::Settings;
use crate::error::Error;
use crate::models::{
    Subscription, SubscriptionRole, TenantSubscription, VirtualNetwork, VnetRecord, VnetRole,
};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;

/// Subscriptions to search, split by role.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionScope {
    /// Searched for hubs.
    pub hub_subscriptions: Vec<Subscription>,
    /// Searched for spokes. Hub subscriptions appear here too unless excluded.
    pub spoke_subscriptions: Vec<Subscription>,
    /// Visible but excluded from the spoke search.
    pub excluded: Vec<Subscription>,
    /// The tenant listing failed and only hub subscriptions are searched.
    pub degraded: bool,
}

impl SubscriptionScope {
    /// Every subscription id to list VNets for, each once, hubs first.
    pub fn search_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.hub_subscriptions
            .iter()
            .chain(self.spoke_subscriptions.iter())
            .filter(|s| seen.insert(s.id.to_ascii_lowercase()))
            .map(|s| s.id.clone())
            .collect()
    }

    fn is_hub(&self, subscription_id: &str) -> bool {
        self.hub_subscriptions
            .iter()
            .any(|s| s.id.eq_ignore_ascii_case(subscription_id))
    }

    fn is_spoke(&self, subscription_id: &str) -> bool {
        self.spoke_subscriptions
            .iter()
            .any(|s| s.id.eq_ignore_ascii_case(subscription_id))
    }
}

/// A subscription whose VNet listing failed.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailure {
    pub subscription_id: String,
    pub error: String,
}

/// Classified VNets of the run. Read-only after discovery.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Hub VNets sorted by name.
    pub hubs: Vec<VirtualNetwork>,
    /// Spoke VNets sorted by name.
    pub spokes: Vec<VirtualNetwork>,
    /// Lowercased ids of every VNet listed, classified or not.
    pub known_vnet_ids: HashSet<String>,
    pub failures: Vec<DiscoveryFailure>,
    /// Subscriptions whose listing succeeded.
    pub subscriptions_listed: usize,
}

impl Inventory {
    pub fn is_known(&self, vnet_id: &str) -> bool {
        self.known_vnet_ids.contains(&vnet_id.to_ascii_lowercase())
    }

    /// Hubs then spokes.
    pub fn all_vnets(&self) -> impl Iterator<Item = &VirtualNetwork> {
        self.hubs.iter().chain(self.spokes.iter())
    }
}

/// Work out which subscriptions to search.
///
/// Spokes are searched in every enabled subscription the credential can see,
/// minus the exclude list. If the tenant listing is refused the hub
/// subscriptions become the spoke scope as well.
pub async fn discover_subscriptions(
    client: &dyn NetworkClient,
    settings: &Settings,
) -> Result<SubscriptionScope, Error> {
    match client.list_subscriptions().await {
        Ok(tenant) => scope_from_tenant(&tenant, settings),
        Err(e) => {
            log::warn!(
                "{} tenant subscription listing failed, searching only hub subscriptions for spokes: {e}",
                "Degraded mode:".yellow()
            );
            Ok(degraded_scope(settings))
        }
    }
}

fn scope_from_tenant(
    tenant: &[TenantSubscription],
    settings: &Settings,
) -> Result<SubscriptionScope, Error> {
    let mut scope = SubscriptionScope::default();

    for id in &settings.hub_subscription_ids {
        match tenant.iter().find(|s| s.id.eq_ignore_ascii_case(id)) {
            Some(sub) if sub.is_enabled() => scope.hub_subscriptions.push(Subscription::new(
                &sub.id,
                &sub.display_name,
                SubscriptionRole::HubCandidate,
            )),
            Some(sub) => log::warn!(
                "Hub subscription {} ({}) is {}, skipping",
                sub.display_name,
                sub.id,
                sub.state
            ),
            None => log::warn!("Hub subscription {id} is not visible to the credential"),
        }
    }
    if scope.hub_subscriptions.is_empty() {
        return Err(Error::NoHubSubscriptions(
            settings.hub_subscription_ids.clone(),
        ));
    }

    for sub in tenant.iter().filter(|s| s.is_enabled()) {
        if settings.is_spoke_excluded(&sub.id) {
            scope.excluded.push(Subscription::new(
                &sub.id,
                &sub.display_name,
                SubscriptionRole::Excluded,
            ));
            continue;
        }
        let role = if settings.is_hub_subscription(&sub.id) {
            SubscriptionRole::HubCandidate
        } else {
            SubscriptionRole::SpokeCandidate
        };
        scope
            .spoke_subscriptions
            .push(Subscription::new(&sub.id, &sub.display_name, role));
    }
    let skipped = tenant.iter().filter(|s| !s.is_enabled()).count();
    if skipped > 0 {
        log::info!("Ignoring {skipped} subscriptions that are not Enabled");
    }
    Ok(scope)
}

fn degraded_scope(settings: &Settings) -> SubscriptionScope {
    let hubs: Vec<Subscription> = settings
        .hub_subscription_ids
        .iter()
        .map(|id| Subscription::new(id, id, SubscriptionRole::HubCandidate))
        .collect();
    let spokes = hubs
        .iter()
        .filter(|s| !settings.is_spoke_excluded(&s.id))
        .cloned()
        .collect();
    SubscriptionScope {
        hub_subscriptions: hubs,
        spoke_subscriptions: spokes,
        excluded: Vec::new(),
        degraded: true,
    }
}

/// Hub: name starts with a hub prefix and the hub tag contains the hub value.
pub fn is_hub_vnet(record: &VnetRecord, settings: &Settings) -> bool {
    let prefixed = settings
        .hub_prefixes
        .iter()
        .any(|p| record.name.starts_with(p.as_str()));
    let tagged = record
        .tag(&settings.hub_tag_key)
        .map(|v| {
            v.to_lowercase()
                .contains(&settings.hub_tag_value.to_lowercase())
        })
        .unwrap_or(false);
    prefixed && tagged
}

pub fn is_spoke_vnet(record: &VnetRecord, settings: &Settings) -> bool {
    settings
        .spoke_prefixes
        .iter()
        .any(|p| record.name.starts_with(p.as_str()))
}

/// List and classify the VNets of every subscription in `scope`.
///
/// Listings run concurrently, at most `max_workers` at a time.
pub async fn discover_vnets(
    client: &dyn NetworkClient,
    settings: &Settings,
    scope: &SubscriptionScope,
) -> Result<Inventory, Error> {
    let ids = scope.search_ids();
    let listings: Vec<(String, _)> = stream::iter(ids)
        .map(|id| async move {
            let result = client.list_virtual_networks(&id).await;
            (id, result)
        })
        .buffer_unordered(settings.max_workers.max(1))
        .collect()
        .await;

    let mut inventory = Inventory::default();
    let mut hub_listings_ok = 0;
    for (subscription_id, result) in listings {
        let records = match result {
            Ok(records) => records,
            Err(source) => {
                let err = Error::Discovery {
                    subscription: subscription_id.clone(),
                    source,
                };
                log::error!("{err}");
                inventory.failures.push(DiscoveryFailure {
                    subscription_id,
                    error: err.to_string(),
                });
                continue;
            }
        };
        inventory.subscriptions_listed += 1;
        let hub_scope = scope.is_hub(&subscription_id);
        let spoke_scope = scope.is_spoke(&subscription_id);
        if hub_scope {
            hub_listings_ok += 1;
        }
        log::debug!(
            "Subscription {subscription_id}: {} VNets listed",
            records.len()
        );

        for record in &records {
            inventory.known_vnet_ids.insert(record.id.to_ascii_lowercase());
            if hub_scope && is_hub_vnet(record, settings) {
                inventory
                    .hubs
                    .push(VirtualNetwork::from_record(record, VnetRole::Hub));
            } else if spoke_scope && is_spoke_vnet(record, settings) {
                inventory
                    .spokes
                    .push(VirtualNetwork::from_record(record, VnetRole::Spoke));
            }
        }
    }

    if hub_listings_ok == 0 {
        return Err(Error::NoHubSubscriptions(
            scope.hub_subscriptions.iter().map(|s| s.id.clone()).collect(),
        ));
    }

    inventory.failures.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
    inventory.hubs.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    inventory.spokes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    log::info!(
        "Discovered {} hub VNets and {} spoke VNets in {} subscriptions ({} failed)",
        inventory.hubs.len().to_string().green(),
        inventory.spokes.len().to_string().green(),
        inventory.subscriptions_listed,
        inventory.failures.len()
    );
    Ok(inventory)
}
