//! Report files of a run and the notification hand-off.

use super::failure_log::render_failure_log;
use super::html::render_html;
use super::json::render_json;
use crate::config::Settings;
use crate::error::Error;
use crate::processing::Report;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Which notification the produced artifacts call for.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failure,
}

/// Files produced by a run.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub html_report: Option<PathBuf>,
    pub json_report: Option<PathBuf>,
    pub execution_log: Option<PathBuf>,
    pub failure_log: Option<PathBuf>,
    /// Report generation errors. They never change the run result.
    pub errors: Vec<String>,
}

impl Artifacts {
    /// Failure iff a failure log was written.
    pub fn notification_kind(&self) -> NotificationKind {
        if self.failure_log.is_some() {
            NotificationKind::Failure
        } else {
            NotificationKind::Success
        }
    }

    /// Files to attach to a notification: the HTML report and the execution log.
    pub fn attachments(&self) -> Vec<&Path> {
        [&self.html_report, &self.execution_log]
            .into_iter()
            .flatten()
            .map(PathBuf::as_path)
            .collect()
    }
}

/// `_%Y%m%d_%H%M%S` of `at` in `timezone`, appended to every artifact name.
pub fn timestamp_suffix(at: DateTime<Utc>, timezone: Tz) -> String {
    at.with_timezone(&timezone).format("_%Y%m%d_%H%M%S").to_string()
}

fn record_error(artifacts: &mut Artifacts, err: Error) {
    log::error!("{err}");
    artifacts.errors.push(err.to_string());
}

fn write_file(path: &Path, content: &str) -> Result<(), Error> {
    std::fs::write(path, content)
        .map_err(|e| Error::ReportGeneration(format!("{}: {e}", path.display())))
}

/// Write the HTML report, the JSON report (if enabled) and the failure log (if needed).
///
/// Failures are logged and collected in [`Artifacts::errors`], never returned.
pub fn write_artifacts(
    report: &Report,
    settings: &Settings,
    stamp: &str,
    execution_log: Option<PathBuf>,
) -> Artifacts {
    let mut artifacts = Artifacts {
        execution_log,
        ..Artifacts::default()
    };
    let dir = &settings.output_dir;

    if let Err(e) = std::fs::create_dir_all(dir) {
        record_error(
            &mut artifacts,
            Error::ReportGeneration(format!("{}: {e}", dir.display())),
        );
        return artifacts;
    }

    let html_path = dir.join(format!("vnet_peering_report{stamp}.html"));
    match write_file(&html_path, &render_html(report, settings.report_timezone)) {
        Ok(()) => {
            log::info!("HTML report written to {}", html_path.display());
            artifacts.html_report = Some(html_path);
        }
        Err(e) => record_error(&mut artifacts, e),
    }

    if settings.export_json {
        let json_path = dir.join(format!("vnet_peering_report{stamp}.json"));
        let written = render_json(report)
            .map_err(|e| Error::ReportGeneration(format!("JSON export: {e}")))
            .and_then(|json| write_file(&json_path, &json));
        match written {
            Ok(()) => {
                log::info!("JSON report written to {}", json_path.display());
                artifacts.json_report = Some(json_path);
            }
            Err(e) => record_error(&mut artifacts, e),
        }
    }

    if let Some(text) = render_failure_log(report, settings.report_timezone) {
        let failure_path = dir.join(format!("vnet_peering_failures{stamp}.log"));
        match write_file(&failure_path, &text) {
            Ok(()) => {
                log::warn!("Failure log written to {}", failure_path.display());
                artifacts.failure_log = Some(failure_path);
            }
            Err(e) => record_error(&mut artifacts, e),
        }
    }

    artifacts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use crate::processing::report::tests::outcome;
    use crate::processing::ReportAggregator;
    use chrono::TimeZone;

    fn settings(dir: &Path, export_json: bool) -> Settings {
        let mut s = Settings::new(["hub"]);
        s.output_dir = dir.to_path_buf();
        s.export_json = export_json;
        s
    }

    #[test]
    fn test_timestamp_suffix_uses_timezone() {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 23, 30, 5).unwrap();
        assert_eq!(timestamp_suffix(at, Tz::UTC), "_20240115_233005");
        assert_eq!(timestamp_suffix(at, chrono_tz::Asia::Tokyo), "_20240116_083005");
    }

    #[test]
    fn test_success_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let agg = ReportAggregator::new(Utc::now(), false);
        agg.record_outcome(outcome(0, "US", Action::Created));
        let artifacts = write_artifacts(&agg.finalize(), &settings(dir.path(), true), "_x", None);

        assert!(artifacts.errors.is_empty());
        assert_eq!(
            artifacts.html_report.as_deref(),
            Some(dir.path().join("vnet_peering_report_x.html").as_path())
        );
        assert!(artifacts.json_report.as_ref().unwrap().exists());
        assert!(artifacts.failure_log.is_none());
        assert_eq!(artifacts.notification_kind(), NotificationKind::Success);
        assert_eq!(artifacts.attachments().len(), 1);
    }

    #[test]
    fn test_failure_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let agg = ReportAggregator::new(Utc::now(), false);
        agg.record_outcome(outcome(0, "US", Action::CriticalFailure));
        let log = dir.path().join("run.log");
        let artifacts = write_artifacts(&agg.finalize(), &settings(dir.path(), false), "_x", Some(log));

        assert!(artifacts.json_report.is_none());
        assert!(artifacts.failure_log.as_ref().unwrap().exists());
        assert_eq!(artifacts.notification_kind(), NotificationKind::Failure);
        assert_eq!(artifacts.attachments().len(), 2);
    }

    #[test]
    fn test_unwritable_directory_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let agg = ReportAggregator::new(Utc::now(), false);
        let artifacts = write_artifacts(&agg.finalize(), &settings(&blocker.join("sub"), false), "_x", None);
        assert!(artifacts.html_report.is_none());
        assert_eq!(artifacts.errors.len(), 1);
    }
}
