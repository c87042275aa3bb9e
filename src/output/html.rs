//! HTML report.

use crate::models::{OrphanRecord, ReconciliationOutcome};
use crate::processing::Report;
use chrono_tz::Tz;
use std::fmt::Write;

const STYLE: &str = "body { font-family: Arial, sans-serif; margin: 20px; }
h1, h2, h3 { color: #333; }
table { margin: 20px 0; border-collapse: collapse; width: 100%; }
th { text-align: left; padding: 8px; background-color: #f0f0f0; }
td { padding: 8px; }
tr:nth-child(even) { background-color: #f9f9f9; }
.summary { background-color: #e8f4f8; padding: 15px; border-radius: 5px; margin: 20px 0; }
.critical { color: #b00020; font-weight: bold; }";

/// Escape text for use inside HTML elements and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Table with escaped cells, or `empty` as a paragraph when there are no rows.
fn html_table(headers: &[&str], rows: &[Vec<String>], empty: &str) -> String {
    if rows.is_empty() {
        return format!("<p>{}</p>\n", escape_html(empty));
    }
    let mut table = String::from("<table border='1' cellspacing='0'>\n<thead><tr>");
    for h in headers {
        let _ = write!(table, "<th>{}</th>", escape_html(h));
    }
    table.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        table.push_str("<tr>");
        for cell in row {
            let _ = write!(table, "<td>{}</td>", escape_html(cell));
        }
        table.push_str("</tr>\n");
    }
    table.push_str("</tbody></table>\n");
    table
}

fn error_cell(outcome: &ReconciliationOutcome) -> String {
    outcome.error.clone().unwrap_or_else(|| "-".to_string())
}

fn orphan_rows<'a, I: Iterator<Item = &'a OrphanRecord>>(orphans: I) -> Vec<Vec<String>> {
    orphans
        .map(|o| {
            vec![
                o.vnet_name.clone(),
                o.peering_name.clone(),
                o.remote_vnet_id.clone(),
                o.attempts.to_string(),
                o.error.clone().unwrap_or_else(|| {
                    if o.dry_run {
                        "dry run".to_string()
                    } else {
                        "-".to_string()
                    }
                }),
            ]
        })
        .collect()
}

pub fn render_html(report: &Report, timezone: Tz) -> String {
    let c = &report.counters;
    let d = &report.discovery;
    let generated = report
        .finished_at
        .with_timezone(&timezone)
        .format("%Y-%m-%d %H:%M:%S %Z");

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>Azure VNet Peering Report</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n<h1>Azure VNet Peering Report</h1>\n"
    );

    html.push_str("<div class=\"summary\">\n");
    let mut line = |label: &str, value: String| {
        let _ = writeln!(html, "<strong>{}:</strong> {}<br>", escape_html(label), escape_html(&value));
    };
    line("Generated", generated.to_string());
    line("Mode", if report.dry_run { "dry run" } else { "live" }.to_string());
    line("Hub Subscriptions", d.hub_subscriptions.to_string());
    line(
        "Spoke Subscriptions",
        if d.degraded {
            format!("{} (degraded: tenant listing unavailable)", d.spoke_subscriptions)
        } else {
            d.spoke_subscriptions.to_string()
        },
    );
    line("Excluded Subscriptions", d.excluded_subscriptions.to_string());
    line("Hub VNets", d.hub_vnets.to_string());
    line("Spoke VNets", d.spoke_vnets.to_string());
    line("Connections Attempted", c.attempted.to_string());
    line("Successful Peerings", (c.created + c.repaired).to_string());
    line("Skipped (healthy)", c.skipped_healthy.to_string());
    line("Dry Run", c.dry_run.to_string());
    line("Failed Peerings", (c.failed + c.critical_failed).to_string());
    line("Critical Failures", c.critical_failed.to_string());
    line("Orphans Found", c.orphans_found.to_string());
    line("Deleted Orphans", c.orphans_deleted.to_string());
    if report.timed_out {
        line("Run Timeout", "expired, unfinished work was abandoned".to_string());
    }
    html.push_str("</div>\n");

    if report.has_critical_failures() {
        html.push_str("<p class=\"critical\">Critical failures occurred: retries were exhausted on transient errors.</p>\n");
    }

    html.push_str("<h2>Successful Peerings</h2>\n");
    let rows: Vec<Vec<String>> = report
        .successes()
        .map(|o| {
            vec![
                o.pair_name.clone(),
                o.source_vnet.clone(),
                o.forward_peering.clone(),
                o.target_vnet.clone(),
                o.reverse_peering.clone(),
                o.action.to_string(),
                o.attempts.to_string(),
            ]
        })
        .collect();
    html.push_str(&html_table(
        &["Region Pair", "Hub VNet", "Forward Peering", "Spoke VNet", "Reverse Peering", "Action", "Attempts"],
        &rows,
        "No successful peering operations.",
    ));

    html.push_str("<h2>Failed Peerings</h2>\n");
    let rows: Vec<Vec<String>> = report
        .failures()
        .map(|o| {
            vec![
                o.pair_name.clone(),
                format!("{} ({})", o.source_vnet, o.source_vnet_id),
                format!("{} ({})", o.target_vnet, o.target_vnet_id),
                o.action.to_string(),
                o.attempts.to_string(),
                error_cell(o),
            ]
        })
        .collect();
    html.push_str(&html_table(
        &["Region Pair", "Hub VNet", "Spoke VNet", "Action", "Attempts", "Error"],
        &rows,
        "No peering failures encountered.",
    ));

    html.push_str("<h2>All Peerings by Region Pair</h2>\n");
    let grouped = report.by_pair();
    if grouped.is_empty() {
        html.push_str("<p>No hub-spoke connections were in scope.</p>\n");
    }
    for (pair, outcomes) in grouped {
        let _ = writeln!(html, "<h3>{}</h3>", escape_html(&pair));
        let rows: Vec<Vec<String>> = outcomes
            .iter()
            .map(|o| {
                vec![
                    o.source_vnet.clone(),
                    o.target_vnet.clone(),
                    o.planned.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                    o.action.to_string(),
                    o.attempts.to_string(),
                    error_cell(o),
                ]
            })
            .collect();
        html.push_str(&html_table(
            &["Hub VNet", "Spoke VNet", "Planned", "Action", "Attempts", "Error"],
            &rows,
            "",
        ));
    }

    let headers = ["VNet", "Peering Name", "Remote VNet ID", "Attempts", "Note"];
    html.push_str("<h2>Deleted Orphan Peerings</h2>\n");
    html.push_str(&html_table(
        &headers,
        &orphan_rows(report.deleted_orphans()),
        "No orphan peerings were deleted.",
    ));
    html.push_str("<h2>Orphan Peerings Not Deleted</h2>\n");
    html.push_str(&html_table(
        &headers,
        &orphan_rows(report.orphans.iter().filter(|o| !o.deleted)),
        "None.",
    ));

    if !d.failures.is_empty() || !report.warnings.is_empty() {
        html.push_str("<h2>Warnings</h2>\n<ul>\n");
        for failure in &d.failures {
            let _ = writeln!(html, "<li>{}</li>", escape_html(&failure.error));
        }
        for warning in &report.warnings {
            let _ = writeln!(html, "<li>{}</li>", escape_html(warning));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
