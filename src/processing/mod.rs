//! Reconciliation engine.
//!
//! This module contains the business logic of a run:
//! - [`discovery`] - Subscription scope and VNet classification
//! - [`regions`] - Region pair loading and candidate enumeration
//! - [`naming`] - Deterministic peering names
//! - [`health`] - Peering and connection health rules
//! - [`retry`] - Retry policy for cloud calls
//! - [`locks`] - Per-VNet mutation locks
//! - [`scheduler`] - Bounded worker pool with a run deadline
//! - [`reconcile`] - Create and repair of hub-spoke connections
//! - [`orphans`] - Orphan peering detection and cleanup
//! - [`report`] - Thread-safe report aggregation

pub mod discovery;
pub mod health;
pub mod locks;
pub mod naming;
pub mod orphans;
pub mod reconcile;
pub mod regions;
pub mod report;
pub mod retry;
pub mod scheduler;

// Re-export public types and functions
pub use discovery::{discover_subscriptions, discover_vnets, DiscoveryFailure, Inventory, SubscriptionScope};
pub use health::{is_healthy, ConnectionState, DirectionState, HealthViolation};
pub use locks::VnetLocks;
pub use naming::peering_name;
pub use orphans::{find_orphans, OrphanCandidate, OrphanUnit};
pub use reconcile::{reconcile_connection, ConnectionUnit, ReconcileContext};
pub use regions::{load_region_pairs, parse_region_list, resolve_candidates, Candidate, Resolution};
pub use report::{Counters, Report, ReportAggregator};
pub use retry::{Attempted, RetryPolicy};
pub use scheduler::{ScheduleSummary, Scheduler, WorkUnit};
