//! Results of reconciliation and cleanup units.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to one hub-spoke connection.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Both directions were already healthy, nothing was changed.
    Skipped,
    /// Neither direction existed, both were created.
    Created,
    /// At least one direction existed but the connection was unhealthy, both were rebuilt.
    Repaired,
    /// Work was needed but the run is a dry run.
    DryRun,
    /// A permanent error, or a non-retryable condition, stopped the work.
    Failed,
    /// A transient error used up every retry attempt.
    CriticalFailure,
}

impl Action {
    pub fn is_success(&self) -> bool {
        matches!(self, Action::Created | Action::Repaired)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Action::Failed | Action::CriticalFailure)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Skipped => "Skipped",
            Action::Created => "Created",
            Action::Repaired => "Repaired",
            Action::DryRun => "DryRun",
            Action::Failed => "Failed",
            Action::CriticalFailure => "CriticalFailure",
        };
        f.write_str(s)
    }
}

/// Mutation a connection needs, recorded on dry runs and failures.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Create,
    Repair,
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedAction::Create => f.write_str("Create"),
            PlannedAction::Repair => f.write_str("Repair"),
        }
    }
}

/// One combined outcome per hub-spoke connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    /// Position in the deterministic candidate enumeration, used to order the report.
    pub sequence: usize,
    /// Region pair the connection belongs to.
    pub pair_name: String,
    /// Hub VNet name (owner of the forward peering).
    pub source_vnet: String,
    pub source_vnet_id: String,
    /// Spoke VNet name (owner of the reverse peering).
    pub target_vnet: String,
    pub target_vnet_id: String,
    /// Hub to spoke peering name.
    pub forward_peering: String,
    /// Spoke to hub peering name.
    pub reverse_peering: String,
    pub action: Action,
    /// Set when work was needed.
    pub planned: Option<PlannedAction>,
    /// Highest attempt count of any single mutating call, 0 when nothing was mutated.
    pub attempts: u32,
    /// Last error for failures.
    pub error: Option<String>,
}

/// A peering whose remote VNet no longer exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OrphanRecord {
    /// Owner VNet id.
    pub vnet_id: String,
    /// Owner VNet name.
    pub vnet_name: String,
    pub peering_name: String,
    /// The remote id that did not resolve.
    pub remote_vnet_id: String,
    /// True only when the delete call succeeded.
    pub deleted: bool,
    /// Delete suppressed by a dry run.
    pub dry_run: bool,
    /// Attempts used by the delete call.
    pub attempts: u32,
    /// Set when the delete failed or was abandoned.
    pub error: Option<String>,
    /// Delete failed after exhausting retries.
    pub critical: bool,
}
