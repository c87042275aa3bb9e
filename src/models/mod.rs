//! Domain models for hub-spoke peering reconciliation.
//!
//! This module contains the core data structures used throughout the application:
//! - [`Subscription`] - Tenant subscription and its role in the run
//! - [`VirtualNetwork`] and [`VnetRecord`] - Classified and raw virtual networks
//! - [`Peering`] - One directional VNet peering
//! - [`RegionPair`] - Hub and spoke region sets that are peered together
//! - [`ReconciliationOutcome`] and [`OrphanRecord`] - Per unit results

mod outcome;
mod peering;
mod region;
mod subscription;
mod vnet;

// Re-export public types
pub use outcome::{Action, OrphanRecord, PlannedAction, ReconciliationOutcome};
pub use peering::{Peering, PeeringSettings, PeeringState, SyncLevel};
pub use region::RegionPair;
pub use subscription::{Subscription, SubscriptionRole, TenantSubscription};
pub use vnet::{VirtualNetwork, VnetRecord, VnetRole};
