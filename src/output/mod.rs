//! Report rendering.
//!
//! This module turns a finalized report into output:
//! - [`html`] - HTML report
//! - [`json`] - JSON export
//! - [`failure_log`] - Critical failure log
//! - [`terminal`] - Console summary with colors
//! - [`artifacts`] - Writing the files and the notification manifest

mod artifacts;
mod failure_log;
mod html;
mod json;
mod terminal;

pub use artifacts::{timestamp_suffix, write_artifacts, Artifacts, NotificationKind};
pub use failure_log::render_failure_log;
pub use html::{escape_html, render_html};
pub use json::render_json;
pub use terminal::{format_field, print_summary, render_summary};
