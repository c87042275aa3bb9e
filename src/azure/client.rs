//! Capability interface to the cloud network API.
//!
//! The reconciliation engine only talks to Azure through [`NetworkClient`], so
//! transport and authentication stay outside of it.

use crate::error::CloudError;
use crate::models::{Peering, PeeringSettings, TenantSubscription, VnetRecord};
use async_trait::async_trait;

#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// List every subscription visible to the credential at tenant scope.
    async fn list_subscriptions(&self) -> Result<Vec<TenantSubscription>, CloudError>;

    /// List all VNets (with tags) of one subscription.
    async fn list_virtual_networks(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<VnetRecord>, CloudError>;

    /// List the peerings owned by a VNet.
    async fn list_peerings(&self, vnet_id: &str) -> Result<Vec<Peering>, CloudError>;

    /// Create (or overwrite) a peering from `vnet_id` to `remote_vnet_id`.
    ///
    /// Returns once the resource finished provisioning.
    async fn create_peering(
        &self,
        vnet_id: &str,
        name: &str,
        remote_vnet_id: &str,
        settings: &PeeringSettings,
    ) -> Result<Peering, CloudError>;

    /// Delete a peering. Deleting a peering that is already gone succeeds.
    async fn delete_peering(&self, vnet_id: &str, name: &str) -> Result<(), CloudError>;

    /// Direct existence check for a VNet outside the discovered inventory.
    async fn virtual_network_exists(&self, vnet_id: &str) -> Result<bool, CloudError>;
}
