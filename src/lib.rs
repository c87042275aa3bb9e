//! Hub-spoke VNet peering reconciliation for Azure.
//!
//! A run discovers hub and spoke VNets, makes sure every hub-spoke pair in
//! the configured region pairs is connected by two healthy peerings, removes
//! peerings whose remote VNet is gone, and reports what it did.

pub mod azure;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod processing;

use crate::azure::{ArmClient, NetworkClient};
use crate::cli::Args;
use crate::config::Settings;
use crate::error::Error;
use crate::output::{print_summary, timestamp_suffix, write_artifacts, NotificationKind};
use crate::processing::{
    discover_subscriptions, discover_vnets, find_orphans, load_region_pairs, resolve_candidates,
    ConnectionUnit, OrphanUnit, ReconcileContext, Report, ReportAggregator, Scheduler, VnetLocks,
    WorkUnit,
};
use chrono::{DateTime, Utc};
use colored::Colorize;
use std::sync::Arc;
use tokio::time::Instant;

/// Run discovery, reconciliation and orphan cleanup against `client`.
///
/// Only authentication-level problems and losing every hub subscription are
/// errors; everything else ends up in the returned report. The run stops
/// taking on work once `settings.run_timeout` has passed.
pub async fn reconcile(
    client: Arc<dyn NetworkClient>,
    settings: Arc<Settings>,
    started_at: DateTime<Utc>,
) -> Result<Report, Error> {
    let deadline = Instant::now() + settings.run_timeout;
    let report = Arc::new(ReportAggregator::new(started_at, settings.dry_run));

    let discovery = tokio::time::timeout_at(deadline, async {
        let scope = discover_subscriptions(client.as_ref(), &settings).await?;
        let inventory = discover_vnets(client.as_ref(), &settings, &scope).await?;
        Ok::<_, Error>((scope, inventory))
    })
    .await;
    let (scope, inventory) = match discovery {
        Ok(found) => found?,
        Err(_) => {
            log::error!("{}", "Run timeout expired during discovery".red());
            report.mark_timed_out();
            report.add_warning("run timeout expired during discovery, nothing was reconciled");
            return Ok(report.finalize());
        }
    };
    report.record_discovery(&scope, &inventory);

    let (pairs, warnings) = load_region_pairs(&settings.region_pairs);
    report.add_warnings(warnings);
    let resolution = resolve_candidates(&pairs, &inventory);
    report.add_warnings(resolution.warnings);
    log::info!(
        "#Start reconciliation of {} connections (dry_run={})",
        resolution.candidates.len(),
        settings.dry_run
    );

    let ctx = Arc::new(ReconcileContext::new(
        Arc::clone(&client),
        Arc::clone(&settings),
        Arc::clone(&report),
    ));
    let scheduler = Scheduler::new(settings.max_workers, Arc::new(VnetLocks::new()), deadline);

    let units: Vec<Arc<dyn WorkUnit>> = resolution
        .candidates
        .into_iter()
        .map(|candidate| Arc::new(ConnectionUnit::new(Arc::clone(&ctx), candidate)) as Arc<dyn WorkUnit>)
        .collect();
    let summary = scheduler.run_all(units).await;
    log::info!(
        "Reconciliation finished: {} completed, {} abandoned",
        summary.completed,
        summary.abandoned
    );

    if Instant::now() >= deadline {
        report.mark_timed_out();
        report.add_warning("run timeout expired, orphan cleanup was not run");
        return Ok(report.finalize());
    }

    log::info!("#Start orphan scan of {} VNets", inventory.hubs.len() + inventory.spokes.len());
    let orphans = match tokio::time::timeout_at(deadline, find_orphans(&ctx, &inventory)).await {
        Ok(orphans) => orphans,
        Err(_) => {
            report.mark_timed_out();
            report.add_warning("run timeout expired during the orphan scan");
            return Ok(report.finalize());
        }
    };
    let units: Vec<Arc<dyn WorkUnit>> = orphans
        .into_iter()
        .map(|orphan| Arc::new(OrphanUnit::new(Arc::clone(&ctx), orphan)) as Arc<dyn WorkUnit>)
        .collect();
    let summary = scheduler.run_all(units).await;
    if summary.abandoned > 0 && Instant::now() >= deadline {
        report.mark_timed_out();
    }

    Ok(report.finalize())
}

/// The command line run: settings, logging, credential, reconciliation, artifacts.
///
/// Returns the process exit code: 0 success, 2 critical failures, 3 other failures.
pub async fn run(args: Args) -> Result<u8, Error> {
    let settings = Arc::new(Settings::from_args(args)?);
    let started_at = Utc::now();
    let stamp = timestamp_suffix(started_at, settings.report_timezone);
    let log_file = logging::init_logging(settings.log_level, &settings.output_dir, &stamp)?;

    log::info!("#Start run()");
    log::debug!("{settings:?}");

    let credential = azure::create_credential(&settings.auth)?;
    azure::verify_credential(credential.as_ref()).await?;
    log::info!("Authenticated with {} credential", settings.auth.method);
    let client: Arc<dyn NetworkClient> =
        Arc::new(ArmClient::new(credential, settings.health_check_timeout)?);

    let report = reconcile(client, Arc::clone(&settings), started_at).await?;

    print_summary(&report);
    let artifacts = write_artifacts(&report, &settings, &stamp, log_file);
    match artifacts.notification_kind() {
        NotificationKind::Success => log::info!("Notification: success"),
        NotificationKind::Failure => log::warn!("Notification: {}", "failure".red()),
    }
    for path in artifacts.attachments() {
        log::info!("Attachment: {}", path.display());
    }

    let code = report.exit_code();
    log::info!("#End run() exit code {code}");
    Ok(code)
}
