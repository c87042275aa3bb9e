//! Failure log, written only when critical failures occurred.
//!
//! Its presence is what marks a run for the failure notification.

use crate::models::Action;
use crate::processing::Report;
use chrono_tz::Tz;
use std::fmt::Write;

/// Plain text listing of every critical failure, then every other failure.
///
/// `None` when there is nothing critical to report.
pub fn render_failure_log(report: &Report, timezone: Tz) -> Option<String> {
    if !report.has_critical_failures() {
        return None;
    }
    let finished = report
        .finished_at
        .with_timezone(&timezone)
        .format("%Y-%m-%d %H:%M:%S %Z");

    let mut out = String::new();
    let _ = writeln!(out, "VNet peering run finished {finished} with critical failures");
    let _ = writeln!(
        out,
        "critical={} failed={} orphan_delete_failures={}",
        report.counters.critical_failed, report.counters.failed, report.counters.orphan_failures
    );
    out.push('\n');

    let critical_first = report
        .critical_failures()
        .chain(report.failures().filter(|o| o.action == Action::Failed));
    for o in critical_first {
        let _ = writeln!(
            out,
            "{} pair={:?} source={} ({}) target={} ({}) attempts={} error={}",
            o.action.to_string().to_uppercase(),
            o.pair_name,
            o.source_vnet,
            o.source_vnet_id,
            o.target_vnet,
            o.target_vnet_id,
            o.attempts,
            o.error.as_deref().unwrap_or("-")
        );
    }
    for o in report.failed_orphans() {
        let _ = writeln!(
            out,
            "{} orphan vnet={} ({}) peering={} remote={} attempts={} error={}",
            if o.critical { "CRITICALFAILURE" } else { "FAILED" },
            o.vnet_name,
            o.vnet_id,
            o.peering_name,
            o.remote_vnet_id,
            o.attempts,
            o.error.as_deref().unwrap_or("-")
        );
    }
    Some(out)
}
