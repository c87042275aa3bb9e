//! log4rs setup.
//!
//! A `log4rs.yml` in the working directory wins, and its first file appender
//! becomes the run's log file. Without one the run logs to the console and to
//! `vnet_peering_<stamp>.log` in the output directory.

use crate::error::Error;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

pub const LOG4RS_FILE: &str = "log4rs.yml";

const CONSOLE_PATTERN: &str = "{d(%H:%M:%S)} {h({l:5})} {m}{n}";
const FILE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l:5} [{T}] {t} - {m}{n}";

pub fn log_file_path(output_dir: &Path, stamp: &str) -> PathBuf {
    output_dir.join(format!("vnet_peering{stamp}.log"))
}

/// Install the global logger. Returns the file the run is logged to, if any.
pub fn init_logging(
    level: LevelFilter,
    output_dir: &Path,
    stamp: &str,
) -> Result<Option<PathBuf>, Error> {
    if Path::new(LOG4RS_FILE).exists() {
        log4rs::init_file(LOG4RS_FILE, Default::default())
            .map_err(|e| Error::Logging(format!("{LOG4RS_FILE}: {e}")))?;
        log::set_max_level(level);
        let text = std::fs::read_to_string(LOG4RS_FILE)
            .map_err(|e| Error::Logging(format!("{LOG4RS_FILE}: {e}")))?;
        return Ok(configured_log_file(&text));
    }

    std::fs::create_dir_all(output_dir)
        .map_err(|e| Error::Logging(format!("{}: {e}", output_dir.display())))?;
    let path = log_file_path(output_dir, stamp);

    let config = build_config(level, &path)?;
    log4rs::init_config(config).map_err(|e| Error::Logging(e.to_string()))?;
    Ok(Some(path))
}

/// Path of the first `file` or `rolling_file` appender of a log4rs YAML config.
///
/// Paths using `$ENV{..}` substitution are skipped.
fn configured_log_file(text: &str) -> Option<PathBuf> {
    let config: serde_yaml::Value = serde_yaml::from_str(text).ok()?;
    let appenders = config.get("appenders")?.as_mapping()?;
    appenders.values().find_map(|appender| {
        let kind = appender.get("kind")?.as_str()?;
        if kind != "file" && kind != "rolling_file" {
            return None;
        }
        let path = appender.get("path")?.as_str()?;
        (!path.contains("$ENV{")).then(|| PathBuf::from(path))
    })
}

fn build_config(level: LevelFilter, path: &Path) -> Result<Config, Error> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();
    let file = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
        .build(path)
        .map_err(|e| Error::Logging(format!("{}: {e}", path.display())))?;

    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(level),
        )
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("out"), "_20240101_120000");
        assert_eq!(path, PathBuf::from("out/vnet_peering_20240101_120000.log"));
    }

    #[test]
    fn test_configured_log_file() {
        let text = r#"
appenders:
  stdout:
    kind: console
  requests:
    kind: rolling_file
    path: logs/peering.log
    policy:
      kind: compound
      trigger: { kind: size, limit: 10 mb }
      roller: { kind: delete }
  audit:
    kind: file
    path: logs/audit.log
root:
  level: info
  appenders: [stdout, requests]
"#;
        assert_eq!(configured_log_file(text), Some(PathBuf::from("logs/peering.log")));
    }

    #[test]
    fn test_configured_log_file_absent() {
        let console_only = "appenders:\n  stdout:\n    kind: console\nroot:\n  appenders: [stdout]\n";
        assert_eq!(configured_log_file(console_only), None);
        let env_path = "appenders:\n  f:\n    kind: file\n    path: $ENV{LOG_DIR}/run.log\n";
        assert_eq!(configured_log_file(env_path), None);
        assert_eq!(configured_log_file("not: [valid"), None);
    }

    #[test]
    fn test_build_config_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        assert!(build_config(LevelFilter::Debug, &path).is_ok());
        assert!(path.exists());
    }
}
