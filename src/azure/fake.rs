//! In-memory [`NetworkClient`] used by the test suites.
//!
//! Behaves like ARM where the engine can tell the difference: a peering is
//! `Initiated` until its counterpart exists, both sides turn `Connected` once it
//! does, and deleting one side leaves the other `Disconnected`. Faults can be
//! queued per operation, and every mutating call is tracked so overlapping
//! mutations on one VNet are detected.

use super::client::NetworkClient;
use crate::error::CloudError;
use crate::models::{Peering, PeeringSettings, PeeringState, SyncLevel, TenantSubscription, VnetRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Operations faults can be queued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOperation {
    ListPeerings,
    CreatePeering,
    DeletePeering,
    VnetExists,
}

#[derive(Default)]
struct FakeState {
    subscriptions: Vec<TenantSubscription>,
    tenant_listing_fails: bool,
    failing_subscriptions: HashSet<String>,
    vnets: BTreeMap<String, Vec<VnetRecord>>,
    /// Peerings keyed by lowercased owner VNet id.
    peerings: HashMap<String, Vec<Peering>>,
    faults: HashMap<FakeOperation, VecDeque<CloudError>>,
    in_flight: HashMap<String, usize>,
    overlap_detected: bool,
    mutation_calls: usize,
    mutation_log: Vec<String>,
}

/// Fake Azure tenant held in memory.
#[derive(Default)]
pub struct FakeNetworkClient {
    state: Mutex<FakeState>,
    mutation_delay: Duration,
}

pub const FAKE_RESOURCE_GROUP: &str = "rg-network";

/// Resource id the fake assigns to a VNet.
pub fn fake_vnet_id(subscription_id: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription_id}/resourceGroups/{FAKE_RESOURCE_GROUP}/providers/Microsoft.Network/virtualNetworks/{name}"
    )
}

impl FakeNetworkClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every mutating call open for `delay`, widening race windows.
    pub fn with_mutation_delay(mut self, delay: Duration) -> Self {
        self.mutation_delay = delay;
        self
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_subscription(&self, id: &str, display_name: &str) {
        self.add_subscription_with_state(id, display_name, "Enabled");
    }

    pub fn add_subscription_with_state(&self, id: &str, display_name: &str, state: &str) {
        self.state().subscriptions.push(TenantSubscription {
            id: id.to_string(),
            display_name: display_name.to_string(),
            state: state.to_string(),
        });
    }

    /// Add a VNet and return its resource id.
    pub fn add_vnet(
        &self,
        subscription_id: &str,
        name: &str,
        location: &str,
        tags: &[(&str, &str)],
    ) -> String {
        let id = fake_vnet_id(subscription_id, name);
        self.state()
            .vnets
            .entry(subscription_id.to_string())
            .or_default()
            .push(VnetRecord {
                id: id.clone(),
                name: name.to_string(),
                subscription_id: subscription_id.to_string(),
                location: location.to_string(),
                tags: tags
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        id
    }

    /// Remove a VNet, leaving any peerings pointing at it dangling.
    pub fn remove_vnet(&self, vnet_id: &str) {
        let mut state = self.state();
        for vnets in state.vnets.values_mut() {
            vnets.retain(|v| !v.id.eq_ignore_ascii_case(vnet_id));
        }
        state.peerings.remove(&vnet_id.to_ascii_lowercase());
    }

    /// Insert a peering exactly as given, bypassing state derivation.
    pub fn insert_peering(&self, peering: Peering) {
        self.state()
            .peerings
            .entry(peering.owner_vnet_id.to_ascii_lowercase())
            .or_default()
            .push(peering);
    }

    pub fn fail_tenant_listing(&self) {
        self.state().tenant_listing_fails = true;
    }

    /// Make VNet listing of `subscription_id` fail with HTTP 403.
    pub fn fail_subscription(&self, subscription_id: &str) {
        self.state()
            .failing_subscriptions
            .insert(subscription_id.to_string());
    }

    /// Queue `count` copies of `error` for the next calls of `operation`.
    pub fn fail_next(&self, operation: FakeOperation, error: CloudError, count: usize) {
        let mut state = self.state();
        let queue = state.faults.entry(operation).or_default();
        for _ in 0..count {
            queue.push_back(error.clone());
        }
    }

    pub fn peerings_of(&self, vnet_id: &str) -> Vec<Peering> {
        self.state()
            .peerings
            .get(&vnet_id.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// Number of create/delete calls issued, failed ones included.
    pub fn mutation_calls(&self) -> usize {
        self.state().mutation_calls
    }

    /// `"create <vnet> <name>"` / `"delete <vnet> <name>"` entries in call order.
    pub fn mutation_log(&self) -> Vec<String> {
        self.state().mutation_log.clone()
    }

    /// True if two mutating calls were ever open on the same VNet at once.
    pub fn overlap_detected(&self) -> bool {
        self.state().overlap_detected
    }

    fn take_fault(&self, operation: FakeOperation) -> Option<CloudError> {
        self.state()
            .faults
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
    }

    /// Open a mutation window on `vnet_id`, hold it for the configured delay.
    async fn enter_mutation(&self, vnet_id: &str, entry: String) {
        {
            let mut state = self.state();
            state.mutation_calls += 1;
            state.mutation_log.push(entry);
            let open = state.in_flight.entry(vnet_id.to_ascii_lowercase()).or_insert(0);
            *open += 1;
            if *open > 1 {
                state.overlap_detected = true;
            }
        }
        if !self.mutation_delay.is_zero() {
            tokio::time::sleep(self.mutation_delay).await;
        }
    }

    fn leave_mutation(&self, state: &mut FakeState, vnet_id: &str) {
        if let Some(open) = state.in_flight.get_mut(&vnet_id.to_ascii_lowercase()) {
            *open = open.saturating_sub(1);
        }
    }

    fn vnet_exists_in(state: &FakeState, vnet_id: &str) -> bool {
        state
            .vnets
            .values()
            .flatten()
            .any(|v| v.id.eq_ignore_ascii_case(vnet_id))
    }
}

/// Recompute connection state of `owner -> remote` and its counterpart.
fn sync_pair(state: &mut FakeState, owner_id: &str, remote_id: &str) {
    let owner_key = owner_id.to_ascii_lowercase();
    let remote_key = remote_id.to_ascii_lowercase();
    let forward_exists = state
        .peerings
        .get(&owner_key)
        .is_some_and(|list| list.iter().any(|p| p.points_at(remote_id)));
    let reverse_exists = state
        .peerings
        .get(&remote_key)
        .is_some_and(|list| list.iter().any(|p| p.points_at(owner_id)));

    let update = |list: Option<&mut Vec<Peering>>, target: &str, counterpart: bool| {
        if let Some(list) = list {
            for p in list.iter_mut().filter(|p| p.points_at(target)) {
                if counterpart {
                    p.connection_state = PeeringState::Connected;
                    p.sync_level = Some(SyncLevel::FullyInSync);
                } else if p.connection_state == PeeringState::Connected {
                    p.connection_state = PeeringState::Disconnected;
                }
            }
        }
    };
    update(state.peerings.get_mut(&owner_key), remote_id, reverse_exists);
    update(state.peerings.get_mut(&remote_key), owner_id, forward_exists);
}

#[async_trait]
impl NetworkClient for FakeNetworkClient {
    async fn list_subscriptions(&self) -> Result<Vec<TenantSubscription>, CloudError> {
        let state = self.state();
        if state.tenant_listing_fails {
            return Err(CloudError::http(
                "list subscriptions",
                403,
                "AuthorizationFailed",
            ));
        }
        Ok(state.subscriptions.clone())
    }

    async fn list_virtual_networks(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<VnetRecord>, CloudError> {
        let state = self.state();
        if state.failing_subscriptions.contains(subscription_id) {
            return Err(CloudError::http(
                &format!("list VNets in {subscription_id}"),
                403,
                "AuthorizationFailed",
            ));
        }
        Ok(state.vnets.get(subscription_id).cloned().unwrap_or_default())
    }

    async fn list_peerings(&self, vnet_id: &str) -> Result<Vec<Peering>, CloudError> {
        if let Some(fault) = self.take_fault(FakeOperation::ListPeerings) {
            return Err(fault);
        }
        Ok(self.peerings_of(vnet_id))
    }

    async fn create_peering(
        &self,
        vnet_id: &str,
        name: &str,
        remote_vnet_id: &str,
        settings: &PeeringSettings,
    ) -> Result<Peering, CloudError> {
        self.enter_mutation(vnet_id, format!("create {vnet_id} {name}"))
            .await;
        let fault = self.take_fault(FakeOperation::CreatePeering);
        let mut state = self.state();
        self.leave_mutation(&mut state, vnet_id);
        if let Some(fault) = fault {
            return Err(fault);
        }
        if !Self::vnet_exists_in(&state, vnet_id) || !Self::vnet_exists_in(&state, remote_vnet_id) {
            return Err(CloudError::http(
                &format!("create peering {name}"),
                404,
                "ResourceNotFound",
            ));
        }

        let peering = Peering {
            name: name.to_string(),
            owner_vnet_id: vnet_id.to_string(),
            remote_vnet_id: remote_vnet_id.to_string(),
            connection_state: PeeringState::Initiated,
            allow_virtual_network_access: settings.allow_virtual_network_access,
            allow_forwarded_traffic: settings.allow_forwarded_traffic,
            allow_gateway_transit: settings.allow_gateway_transit,
            use_remote_gateways: settings.use_remote_gateways,
            sync_level: None,
            provisioning_state: Some("Succeeded".to_string()),
        };
        let list = state
            .peerings
            .entry(vnet_id.to_ascii_lowercase())
            .or_default();
        list.retain(|p| p.name != name);
        list.push(peering);
        sync_pair(&mut state, vnet_id, remote_vnet_id);

        let created = state
            .peerings
            .get(&vnet_id.to_ascii_lowercase())
            .and_then(|list| list.iter().find(|p| p.name == name))
            .cloned();
        created.ok_or_else(|| CloudError::http(&format!("create peering {name}"), 500, "lost"))
    }

    async fn delete_peering(&self, vnet_id: &str, name: &str) -> Result<(), CloudError> {
        self.enter_mutation(vnet_id, format!("delete {vnet_id} {name}"))
            .await;
        let fault = self.take_fault(FakeOperation::DeletePeering);
        let mut state = self.state();
        self.leave_mutation(&mut state, vnet_id);
        if let Some(fault) = fault {
            return Err(fault);
        }

        let mut removed = Vec::new();
        if let Some(list) = state.peerings.get_mut(&vnet_id.to_ascii_lowercase()) {
            removed.extend(list.iter().filter(|p| p.name == name).cloned());
            list.retain(|p| p.name != name);
        }
        for peering in removed {
            sync_pair(&mut state, vnet_id, &peering.remote_vnet_id);
        }
        Ok(())
    }

    async fn virtual_network_exists(&self, vnet_id: &str) -> Result<bool, CloudError> {
        if let Some(fault) = self.take_fault(FakeOperation::VnetExists) {
            return Err(fault);
        }
        Ok(Self::vnet_exists_in(&self.state(), vnet_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_state_follows_both_sides() {
        let fake = FakeNetworkClient::new();
        let a = fake.add_vnet("s1", "a", "eastus", &[]);
        let b = fake.add_vnet("s1", "b", "eastus", &[]);
        let settings = PeeringSettings::default();

        let first = fake.create_peering(&a, "a-to-b", &b, &settings).await.unwrap();
        assert_eq!(first.connection_state, PeeringState::Initiated);

        fake.create_peering(&b, "b-to-a", &a, &settings).await.unwrap();
        assert_eq!(fake.peerings_of(&a)[0].connection_state, PeeringState::Connected);
        assert_eq!(fake.peerings_of(&b)[0].connection_state, PeeringState::Connected);

        fake.delete_peering(&b, "b-to-a").await.unwrap();
        assert!(fake.peerings_of(&b).is_empty());
        assert_eq!(
            fake.peerings_of(&a)[0].connection_state,
            PeeringState::Disconnected
        );
        assert_eq!(fake.mutation_calls(), 3);
        assert!(!fake.overlap_detected());
    }

    #[tokio::test]
    async fn test_queued_faults_are_consumed_in_order() {
        let fake = FakeNetworkClient::new();
        let a = fake.add_vnet("s1", "a", "eastus", &[]);
        let b = fake.add_vnet("s1", "b", "eastus", &[]);
        fake.fail_next(
            FakeOperation::CreatePeering,
            CloudError::http("create", 503, "busy"),
            1,
        );
        let settings = PeeringSettings::default();
        assert!(fake.create_peering(&a, "x", &b, &settings).await.is_err());
        assert!(fake.create_peering(&a, "x", &b, &settings).await.is_ok());
        assert_eq!(fake.mutation_calls(), 2);
    }
}
