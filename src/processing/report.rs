//! Report aggregation.
//!
//! Workers append outcomes through [`ReportAggregator`]; [`ReportAggregator::finalize`]
//! freezes everything into a [`Report`] for the renderers.

use super::discovery::{DiscoveryFailure, Inventory, SubscriptionScope};
use crate::models::{Action, OrphanRecord, ReconciliationOutcome};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub attempted: usize,
    pub created: usize,
    pub repaired: usize,
    pub skipped_healthy: usize,
    pub dry_run: usize,
    pub failed: usize,
    pub critical_failed: usize,
    pub orphans_found: usize,
    pub orphans_deleted: usize,
    pub orphan_failures: usize,
}

#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub hub_subscriptions: usize,
    pub spoke_subscriptions: usize,
    pub excluded_subscriptions: usize,
    pub degraded: bool,
    pub hub_vnets: usize,
    pub spoke_vnets: usize,
    pub failures: Vec<DiscoveryFailure>,
}

/// Immutable result of a run.
#[derive(Serialize, Debug, Clone)]
pub struct Report {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    /// The run deadline expired before all work completed.
    pub timed_out: bool,
    pub counters: Counters,
    pub discovery: DiscoverySummary,
    /// One entry per connection, in enumeration order.
    pub outcomes: Vec<ReconciliationOutcome>,
    /// Sorted by owner VNet, then peering name.
    pub orphans: Vec<OrphanRecord>,
    pub warnings: Vec<String>,
}

impl Report {
    pub fn successes(&self) -> impl Iterator<Item = &ReconciliationOutcome> {
        self.outcomes.iter().filter(|o| o.action.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReconciliationOutcome> {
        self.outcomes.iter().filter(|o| o.action.is_failure())
    }

    pub fn critical_failures(&self) -> impl Iterator<Item = &ReconciliationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.action == Action::CriticalFailure)
    }

    pub fn deleted_orphans(&self) -> impl Iterator<Item = &OrphanRecord> {
        self.orphans.iter().filter(|o| o.deleted)
    }

    pub fn failed_orphans(&self) -> impl Iterator<Item = &OrphanRecord> {
        self.orphans.iter().filter(|o| o.error.is_some())
    }

    /// Outcomes grouped by region pair, pairs in enumeration order.
    pub fn by_pair(&self) -> Vec<(String, Vec<&ReconciliationOutcome>)> {
        let grouped: Vec<(String, Vec<&ReconciliationOutcome>)> = self
            .outcomes
            .iter()
            .group_by(|o| o.pair_name.clone())
            .into_iter()
            .map(|(pair, group)| (pair, group.collect()))
            .collect();
        grouped
    }

    pub fn has_critical_failures(&self) -> bool {
        self.counters.critical_failed > 0 || self.orphans.iter().any(|o| o.critical)
    }

    pub fn has_failures(&self) -> bool {
        self.counters.failed > 0 || self.counters.orphan_failures > 0 || self.has_critical_failures()
    }

    /// 2 with critical failures, 3 with ordinary failures only, 0 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.has_critical_failures() {
            2
        } else if self.has_failures() {
            3
        } else {
            0
        }
    }
}

#[derive(Default)]
struct ReportState {
    counters: Counters,
    discovery: DiscoverySummary,
    outcomes: Vec<ReconciliationOutcome>,
    orphans: Vec<OrphanRecord>,
    warnings: Vec<String>,
    timed_out: bool,
}

/// Thread-safe collector shared by every worker of a run.
pub struct ReportAggregator {
    started_at: DateTime<Utc>,
    dry_run: bool,
    state: Mutex<ReportState>,
}

impl ReportAggregator {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            dry_run,
            state: Mutex::new(ReportState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_outcome(&self, outcome: ReconciliationOutcome) {
        let mut state = self.state();
        let counters = &mut state.counters;
        counters.attempted += 1;
        match outcome.action {
            Action::Skipped => counters.skipped_healthy += 1,
            Action::Created => counters.created += 1,
            Action::Repaired => counters.repaired += 1,
            Action::DryRun => counters.dry_run += 1,
            Action::Failed => counters.failed += 1,
            Action::CriticalFailure => counters.critical_failed += 1,
        }
        state.outcomes.push(outcome);
    }

    pub fn record_orphan(&self, record: OrphanRecord) {
        let mut state = self.state();
        state.counters.orphans_found += 1;
        if record.deleted {
            state.counters.orphans_deleted += 1;
        }
        if record.error.is_some() {
            state.counters.orphan_failures += 1;
        }
        state.orphans.push(record);
    }

    pub fn record_discovery(&self, scope: &SubscriptionScope, inventory: &Inventory) {
        self.state().discovery = DiscoverySummary {
            hub_subscriptions: scope.hub_subscriptions.len(),
            spoke_subscriptions: scope.spoke_subscriptions.len(),
            excluded_subscriptions: scope.excluded.len(),
            degraded: scope.degraded,
            hub_vnets: inventory.hubs.len(),
            spoke_vnets: inventory.spokes.len(),
            failures: inventory.failures.clone(),
        };
    }

    pub fn add_warning(&self, warning: impl Into<String>) {
        self.state().warnings.push(warning.into());
    }

    pub fn add_warnings<I: IntoIterator<Item = String>>(&self, warnings: I) {
        self.state().warnings.extend(warnings);
    }

    pub fn mark_timed_out(&self) {
        self.state().timed_out = true;
    }

    /// Snapshot the collected data, sorted for stable output.
    pub fn finalize(&self) -> Report {
        let state = self.state();
        let mut outcomes = state.outcomes.clone();
        outcomes.sort_by_key(|o| o.sequence);
        let mut orphans = state.orphans.clone();
        orphans.sort_by(|a, b| {
            a.vnet_name
                .cmp(&b.vnet_name)
                .then_with(|| a.vnet_id.cmp(&b.vnet_id))
                .then_with(|| a.peering_name.cmp(&b.peering_name))
        });
        Report {
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run: self.dry_run,
            timed_out: state.timed_out,
            counters: state.counters,
            discovery: state.discovery.clone(),
            outcomes,
            orphans,
            warnings: state.warnings.clone(),
        }
    }
}
