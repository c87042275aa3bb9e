//! Hub-spoke connection reconciliation.
//!
//! A connection is the pair of peerings hub -> spoke (forward) and
//! spoke -> hub (reverse). Each run re-reads both directions, leaves healthy
//! connections alone, creates absent ones and rebuilds everything else.

use super::health::{describe, ConnectionState, DirectionState};
use super::locks::VnetGuard;
use super::naming::peering_name;
use super::regions::Candidate;
use super::report::ReportAggregator;
use super::retry::RetryPolicy;
use super::scheduler::WorkUnit;
use crate::azure::NetworkClient;
use crate::config::{Settings, POLL_INTERVAL};
use crate::error::RetryError;
use crate::models::{Action, Peering, PlannedAction, ReconciliationOutcome, VirtualNetwork};
use async_trait::async_trait;
use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Everything a unit needs, shared by all units of a run.
pub struct ReconcileContext {
    pub client: Arc<dyn NetworkClient>,
    pub settings: Arc<Settings>,
    pub retry: RetryPolicy,
    pub report: Arc<ReportAggregator>,
    /// Pause between post-create health checks.
    pub poll_interval: Duration,
}

impl ReconcileContext {
    pub fn new(
        client: Arc<dyn NetworkClient>,
        settings: Arc<Settings>,
        report: Arc<ReportAggregator>,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_settings(&settings),
            client,
            settings,
            report,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Forward and reverse peering names of a connection.
pub fn connection_names(settings: &Settings, hub: &VirtualNetwork, spoke: &VirtualNetwork) -> (String, String) {
    let forward = peering_name(
        &settings.peering_prefix,
        &hub.name,
        &spoke.name,
        settings.max_peering_name_length,
    );
    let reverse = peering_name(
        &settings.peering_prefix,
        &spoke.name,
        &hub.name,
        settings.max_peering_name_length,
    );
    (forward, reverse)
}

/// The peering of `peerings` for this direction: by name, or else by remote VNet.
///
/// Azure allows one peering per remote VNet, so a peering created under an
/// older name is still found.
pub fn find_direction<'a>(peerings: &'a [Peering], name: &str, remote_vnet_id: &str) -> Option<&'a Peering> {
    peerings
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .or_else(|| peerings.iter().find(|p| p.points_at(remote_vnet_id)))
}

fn new_outcome(candidate: &Candidate, forward: &str, reverse: &str) -> ReconciliationOutcome {
    ReconciliationOutcome {
        sequence: candidate.sequence,
        pair_name: candidate.pair_name.clone(),
        source_vnet: candidate.hub.name.clone(),
        source_vnet_id: candidate.hub.id.clone(),
        target_vnet: candidate.spoke.name.clone(),
        target_vnet_id: candidate.spoke.id.clone(),
        forward_peering: forward.to_string(),
        reverse_peering: reverse.to_string(),
        action: Action::Skipped,
        planned: None,
        attempts: 0,
        error: None,
    }
}

fn fail(mut outcome: ReconciliationOutcome, step: &str, err: RetryError) -> ReconciliationOutcome {
    outcome.action = if err.is_critical() {
        Action::CriticalFailure
    } else {
        Action::Failed
    };
    outcome.attempts = outcome.attempts.max(err.attempts);
    outcome.error = Some(format!("{step}: {err}"));
    outcome
}

/// Connection whose peerings were just written and still need a health check.
pub struct PendingVerification {
    outcome: ReconciliationOutcome,
    planned: PlannedAction,
}

impl PendingVerification {
    /// Wait for both directions to turn healthy. Needs no VNet locks.
    pub async fn verify(self, ctx: &ReconcileContext, candidate: &Candidate) -> ReconciliationOutcome {
        let mut outcome = self.outcome;
        let (hub, spoke) = (&candidate.hub, &candidate.spoke);
        let (forward_name, reverse_name) = (outcome.forward_peering.clone(), outcome.reverse_peering.clone());
        if let Err(problem) = verify_health(ctx, hub, spoke, &forward_name, &reverse_name).await {
            outcome.action = Action::Failed;
            outcome.error = Some(problem);
            return outcome;
        }

        outcome.action = match self.planned {
            PlannedAction::Create => Action::Created,
            PlannedAction::Repair => Action::Repaired,
        };
        log::info!("{} <-> {}: {}", hub.name, spoke.name, outcome.action.to_string().green());
        outcome
    }
}

/// Outcome of the mutating phase of a connection.
pub enum Applied {
    Finished(ReconciliationOutcome),
    Unverified(PendingVerification),
}

/// Drive one connection to a healthy state and describe what happened.
pub async fn reconcile_connection(ctx: &ReconcileContext, candidate: &Candidate) -> ReconciliationOutcome {
    match apply_connection(ctx, candidate).await {
        Applied::Finished(outcome) => outcome,
        Applied::Unverified(pending) => pending.verify(ctx, candidate).await,
    }
}

/// Read, classify and write one connection, stopping short of the health check.
///
/// This is the part that must hold the locks of both VNets.
pub async fn apply_connection(ctx: &ReconcileContext, candidate: &Candidate) -> Applied {
    let settings = &ctx.settings;
    let client = ctx.client.as_ref();
    let hub = &candidate.hub;
    let spoke = &candidate.spoke;
    let (forward_name, reverse_name) = connection_names(settings, hub, spoke);
    let mut outcome = new_outcome(candidate, &forward_name, &reverse_name);
    let label = format!("{} <-> {}", hub.name, spoke.name);

    let hub_peerings = match ctx
        .retry
        .execute(&format!("list peerings of {}", hub.name), || client.list_peerings(&hub.id))
        .await
    {
        Ok(listed) => listed.value,
        Err(e) => return Applied::Finished(fail(outcome, &format!("list peerings of {}", hub.name), e)),
    };
    let spoke_peerings = match ctx
        .retry
        .execute(&format!("list peerings of {}", spoke.name), || client.list_peerings(&spoke.id))
        .await
    {
        Ok(listed) => listed.value,
        Err(e) => return Applied::Finished(fail(outcome, &format!("list peerings of {}", spoke.name), e)),
    };

    let forward = find_direction(&hub_peerings, &forward_name, &spoke.id);
    let reverse = find_direction(&spoke_peerings, &reverse_name, &hub.id);
    let state = ConnectionState::classify(DirectionState::of(forward), DirectionState::of(reverse));

    let planned = match state {
        ConnectionState::HealthyConnected if settings.dry_run => {
            // No planned action: nothing would change.
            log::info!("{label}: {} healthy, no change", "DryRun".cyan());
            outcome.action = Action::DryRun;
            return Applied::Finished(outcome);
        }
        ConnectionState::HealthyConnected => {
            log::info!("{label}: {}", "healthy, skipped".green());
            return Applied::Finished(outcome);
        }
        ConnectionState::Absent => PlannedAction::Create,
        ConnectionState::Unhealthy => {
            log::info!(
                "{label}: {}; {}",
                describe("forward", forward),
                describe("reverse", reverse)
            );
            PlannedAction::Repair
        }
    };
    outcome.planned = Some(planned);

    if settings.dry_run {
        log::info!("{label}: {} {planned}", "DryRun".cyan());
        outcome.action = Action::DryRun;
        return Applied::Finished(outcome);
    }

    if planned == PlannedAction::Repair {
        let stale = [(hub, forward), (spoke, reverse)];
        for (owner, existing) in stale {
            let Some(existing) = existing else { continue };
            let step = format!("delete {} on {}", existing.name, owner.name);
            match ctx
                .retry
                .execute(&step, || client.delete_peering(&owner.id, &existing.name))
                .await
            {
                Ok(done) => outcome.attempts = outcome.attempts.max(done.attempts),
                Err(e) => return Applied::Finished(fail(outcome, &step, e)),
            }
        }
    }

    let wanted = [
        (hub, forward_name.as_str(), spoke),
        (spoke, reverse_name.as_str(), hub),
    ];
    for (owner, name, remote) in wanted {
        let step = format!("create {name} on {}", owner.name);
        match ctx
            .retry
            .execute(&step, || {
                client.create_peering(&owner.id, name, &remote.id, &settings.peering)
            })
            .await
        {
            Ok(done) => outcome.attempts = outcome.attempts.max(done.attempts),
            Err(e) => return Applied::Finished(fail(outcome, &step, e)),
        }
    }

    Applied::Unverified(PendingVerification { outcome, planned })
}

/// Poll both directions until they are healthy or `health_check_timeout` passes.
async fn verify_health(
    ctx: &ReconcileContext,
    hub: &VirtualNetwork,
    spoke: &VirtualNetwork,
    forward_name: &str,
    reverse_name: &str,
) -> Result<(), String> {
    let deadline = Instant::now() + ctx.settings.health_check_timeout;
    loop {
        let hub_peerings = ctx.client.list_peerings(&hub.id).await;
        let spoke_peerings = ctx.client.list_peerings(&spoke.id).await;
        let last = match (hub_peerings, spoke_peerings) {
            (Ok(h), Ok(s)) => {
                let forward = find_direction(&h, forward_name, &spoke.id);
                let reverse = find_direction(&s, reverse_name, &hub.id);
                if DirectionState::of(forward) == DirectionState::Healthy
                    && DirectionState::of(reverse) == DirectionState::Healthy
                {
                    return Ok(());
                }
                format!(
                    "{}; {}",
                    describe("forward", forward),
                    describe("reverse", reverse)
                )
            }
            (Err(e), _) | (_, Err(e)) => format!("health check read failed: {e}"),
        };

        let now = Instant::now();
        if now >= deadline {
            return Err(format!(
                "not healthy within {}s after creation: {last}",
                ctx.settings.health_check_timeout.as_secs()
            ));
        }
        log::debug!("{} <-> {}: waiting for health ({last})", hub.name, spoke.name);
        tokio::time::sleep(ctx.poll_interval.min(deadline - now)).await;
    }
}

/// Scheduler unit for one connection.
pub struct ConnectionUnit {
    ctx: Arc<ReconcileContext>,
    candidate: Candidate,
    reported: AtomicBool,
}

impl ConnectionUnit {
    pub fn new(ctx: Arc<ReconcileContext>, candidate: Candidate) -> Self {
        Self {
            ctx,
            candidate,
            reported: AtomicBool::new(false),
        }
    }

    fn report_once(&self, outcome: ReconciliationOutcome) {
        if !self.reported.swap(true, Ordering::SeqCst) {
            if outcome.action.is_failure() {
                log::error!(
                    "{} {} <-> {}: {}",
                    outcome.action.to_string().red(),
                    outcome.source_vnet,
                    outcome.target_vnet,
                    outcome.error.as_deref().unwrap_or_default()
                );
            }
            self.ctx.report.record_outcome(outcome);
        }
    }
}

#[async_trait]
impl WorkUnit for ConnectionUnit {
    fn label(&self) -> String {
        format!(
            "[{}] {} <-> {}",
            self.candidate.pair_name, self.candidate.hub.name, self.candidate.spoke.name
        )
    }

    fn lock_keys(&self) -> Vec<String> {
        vec![self.candidate.hub.id.clone(), self.candidate.spoke.id.clone()]
    }

    async fn execute(&self, guard: VnetGuard) {
        let outcome = match apply_connection(&self.ctx, &self.candidate).await {
            Applied::Finished(outcome) => outcome,
            Applied::Unverified(pending) => {
                drop(guard);
                pending.verify(&self.ctx, &self.candidate).await
            }
        };
        self.report_once(outcome);
    }

    fn abandon(&self, reason: &str) {
        let (forward, reverse) = connection_names(&self.ctx.settings, &self.candidate.hub, &self.candidate.spoke);
        let mut outcome = new_outcome(&self.candidate, &forward, &reverse);
        outcome.action = Action::Failed;
        outcome.error = Some(reason.to_string());
        self.report_once(outcome);
    }
}
