//! End-of-run console summary.

use crate::models::Action;
use crate::processing::Report;
use colored::{ColoredString, Colorize};

const LABEL_WIDTH: usize = 24;
const VALUE_WIDTH: usize = 6;

/// Format a value right-aligned in a field of `width`, never truncated.
pub fn format_field<T: ToString>(value: T, width: usize) -> String {
    let value_str = value.to_string();
    if value_str.len() >= width {
        value_str
    } else {
        format!("{value_str:>width$}")
    }
}

fn summary_line(label: &str, value: usize) -> String {
    format!("  {label:<LABEL_WIDTH$}{}", format_field(value, VALUE_WIDTH))
}

fn highlight(line: String, value: usize, paint: fn(&str) -> ColoredString) -> String {
    if value > 0 {
        paint(&line).to_string()
    } else {
        line
    }
}

/// Summary table as printed to stdout.
pub fn render_summary(report: &Report) -> String {
    let c = &report.counters;
    let d = &report.discovery;
    let mut lines = Vec::new();

    let title = if report.dry_run {
        "VNet peering summary (dry run)"
    } else {
        "VNet peering summary"
    };
    lines.push(title.bold().to_string());
    lines.push(summary_line("Hub VNets", d.hub_vnets));
    lines.push(summary_line("Spoke VNets", d.spoke_vnets));
    lines.push(summary_line("Connections attempted", c.attempted));
    lines.push(highlight(summary_line("Created", c.created), c.created, |s| s.green()));
    lines.push(highlight(summary_line("Repaired", c.repaired), c.repaired, |s| s.green()));
    lines.push(summary_line("Skipped (healthy)", c.skipped_healthy));
    lines.push(highlight(summary_line("Dry run", c.dry_run), c.dry_run, |s| s.cyan()));
    lines.push(highlight(summary_line("Failed", c.failed), c.failed, |s| s.yellow()));
    lines.push(highlight(
        summary_line("Critical failures", c.critical_failed),
        c.critical_failed,
        |s| s.red().bold(),
    ));
    lines.push(summary_line("Orphans found", c.orphans_found));
    lines.push(summary_line("Orphans deleted", c.orphans_deleted));
    lines.push(highlight(
        summary_line("Orphan delete failures", c.orphan_failures),
        c.orphan_failures,
        |s| s.yellow(),
    ));
    if d.degraded {
        lines.push(format!("  {}", "Degraded: spokes searched in hub subscriptions only".yellow()));
    }
    if !d.failures.is_empty() {
        lines.push(format!(
            "  {} subscriptions could not be listed",
            d.failures.len().to_string().yellow()
        ));
    }
    if report.timed_out {
        lines.push(format!("  {}", "Run timeout expired, unfinished work abandoned".red()));
    }

    for o in report.failures() {
        let tag = if o.action == Action::CriticalFailure {
            "CRITICAL".red().bold()
        } else {
            "FAILED".yellow()
        };
        lines.push(format!(
            "  {tag} [{}] {} -> {}: {}",
            o.pair_name,
            o.source_vnet,
            o.target_vnet,
            o.error.as_deref().unwrap_or("-")
        ));
    }
    lines.join("\n")
}

pub fn print_summary(report: &Report) {
    println!("{}", render_summary(report));
}
