//! Run configuration.
//!
//! Settings come from three places, later ones winning: built-in defaults,
//! an optional YAML file (`--config`) and the command line.

use crate::cli::Args;
use crate::error::Error;
use crate::models::PeeringSettings;
use chrono_tz::Tz;
use clap::ValueEnum;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Timeout of a single ARM request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between provisioning and health polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Hex characters of the hash suffix appended to truncated peering names.
pub const HASH_SUFFIX_LEN: usize = 8;

/// Azure limit for peering resource names.
pub const AZURE_MAX_NAME_LENGTH: usize = 80;

/// Separators and hash a truncated name always carries, plus one character of each VNet name.
const MIN_NAME_OVERHEAD: usize = "-".len() + "-to-".len() + "-".len() + HASH_SUFFIX_LEN + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[value(name = "service_principal")]
    ServicePrincipal,
    #[value(name = "managed_identity")]
    ManagedIdentity,
    #[value(name = "default")]
    Default,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::ServicePrincipal => write!(f, "service_principal"),
            AuthMethod::ManagedIdentity => write!(f, "managed_identity"),
            AuthMethod::Default => write!(f, "default"),
        }
    }
}

#[derive(Clone)]
pub struct AuthSettings {
    pub method: AuthMethod,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl AuthSettings {
    pub fn new(method: AuthMethod) -> Self {
        Self {
            method,
            tenant_id: None,
            client_id: None,
            client_secret: None,
        }
    }

    /// The `(tenant, client, secret)` trio, all three non-empty.
    pub fn service_principal(&self) -> Result<(&str, &str, &str), Error> {
        fn present<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Error> {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(Error::Config(format!(
                    "service_principal authentication requires {name}"
                ))),
            }
        }
        Ok((
            present(&self.tenant_id, "tenant_id")?,
            present(&self.client_id, "client_id")?,
            present(&self.client_secret, "client_secret")?,
        ))
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("method", &self.method)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// One `region_pairs` entry: `[hub_file, spoke_file]` or a named mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RegionPairEntry {
    Pair(PathBuf, PathBuf),
    Named {
        name: String,
        hub: PathBuf,
        spoke: PathBuf,
    },
}

/// A region pair still pointing at its region list files.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPairSource {
    pub name: String,
    pub hub_file: PathBuf,
    pub spoke_file: PathBuf,
}

impl RegionPairSource {
    pub fn new(name: impl Into<String>, hub_file: PathBuf, spoke_file: PathBuf) -> Self {
        Self {
            name: name.into(),
            hub_file,
            spoke_file,
        }
    }

    fn from_entry(entry: RegionPairEntry, base_dir: Option<&Path>) -> Self {
        let resolve = |p: PathBuf| match base_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p,
        };
        match entry {
            RegionPairEntry::Pair(hub, spoke) => {
                let name = format!("{} <-> {}", file_stem(&hub), file_stem(&spoke));
                Self::new(name, resolve(hub), resolve(spoke))
            }
            RegionPairEntry::Named { name, hub, spoke } => {
                Self::new(name, resolve(hub), resolve(spoke))
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Shape of the YAML configuration file. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub hub_prefixes: Vec<String>,
    pub spoke_prefixes: Vec<String>,
    pub hub_tag_key: String,
    pub hub_tag_value: String,
    pub region_pairs: Vec<RegionPairEntry>,
    #[serde(rename = "peering_config", alias = "peering")]
    pub peering: PeeringSettings,
    pub peering_prefix: String,
    pub max_peering_name_length: usize,
    pub health_check_timeout: u64,
    pub retry_attempts: u32,
    pub retry_delay: u64,
    pub retry_max_delay: u64,
    pub run_timeout: u64,
    pub output_dir: Option<PathBuf>,
    pub report_timezone: String,
    pub cleanup_managed_only: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        let pair = |hub: &str, spoke: &str| RegionPairEntry::Pair(hub.into(), spoke.into());
        Self {
            hub_prefixes: vec!["cngfw-az".to_string()],
            spoke_prefixes: vec!["opencti".to_string(), "MISP".to_string()],
            hub_tag_key: "appname".to_string(),
            hub_tag_value: "hub".to_string(),
            region_pairs: vec![
                pair("hub/hubUS", "spoke/spokeUS"),
                pair("hub/hubEU", "spoke/spokeEU"),
                pair("hub/hubAPAC", "spoke/spokeAPAC"),
            ],
            peering: PeeringSettings::default(),
            peering_prefix: "cngfw_dnd".to_string(),
            max_peering_name_length: 79,
            health_check_timeout: 300,
            retry_attempts: 3,
            retry_delay: 5,
            retry_max_delay: 60,
            run_timeout: 3600,
            output_dir: None,
            report_timezone: "UTC".to_string(),
            cleanup_managed_only: false,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

/// Validated, immutable settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub hub_subscription_ids: Vec<String>,
    pub spoke_exclude_subscription_ids: Vec<String>,
    pub auth: AuthSettings,
    pub hub_prefixes: Vec<String>,
    pub spoke_prefixes: Vec<String>,
    pub hub_tag_key: String,
    pub hub_tag_value: String,
    pub region_pairs: Vec<RegionPairSource>,
    pub peering: PeeringSettings,
    pub peering_prefix: String,
    pub max_peering_name_length: usize,
    pub health_check_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub retry_max_delay: Duration,
    pub run_timeout: Duration,
    pub max_workers: usize,
    pub dry_run: bool,
    pub skip_cleanup: bool,
    pub cleanup_managed_only: bool,
    pub export_json: bool,
    pub output_dir: PathBuf,
    pub report_timezone: Tz,
    pub log_level: LevelFilter,
}

impl Settings {
    /// Defaults for the given hub subscriptions, before any file or flags.
    pub fn new<I, S>(hub_subscription_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut settings = Self {
            hub_subscription_ids: Vec::new(),
            spoke_exclude_subscription_ids: Vec::new(),
            auth: AuthSettings::new(AuthMethod::Default),
            hub_prefixes: Vec::new(),
            spoke_prefixes: Vec::new(),
            hub_tag_key: String::new(),
            hub_tag_value: String::new(),
            region_pairs: Vec::new(),
            peering: PeeringSettings::default(),
            peering_prefix: String::new(),
            max_peering_name_length: 0,
            health_check_timeout: Duration::ZERO,
            retry_attempts: 0,
            retry_delay: Duration::ZERO,
            retry_max_delay: Duration::ZERO,
            run_timeout: Duration::ZERO,
            max_workers: 10,
            dry_run: false,
            skip_cleanup: false,
            cleanup_managed_only: false,
            export_json: false,
            output_dir: PathBuf::from("."),
            report_timezone: Tz::UTC,
            log_level: LevelFilter::Info,
        };
        settings.hub_subscription_ids = clean_ids(hub_subscription_ids);
        settings.apply_file(FileConfig::default(), None);
        settings
    }

    /// Merge defaults, the optional config file and the command line, then validate.
    pub fn from_args(args: Args) -> Result<Self, Error> {
        let mut settings = Settings::new(args.hub_subscription_ids);

        if let Some(path) = &args.config {
            let file = FileConfig::load(path)?;
            let base_dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let timezone = file.report_timezone.clone();
            settings.apply_file(file, base_dir);
            settings.report_timezone = Tz::from_str(&timezone).map_err(|e| {
                Error::Config(format!("unknown report_timezone {timezone:?}: {e}"))
            })?;
        }

        settings.spoke_exclude_subscription_ids = clean_ids(args.spoke_exclude_subscription_ids);
        settings.auth = AuthSettings {
            method: args.auth_method,
            tenant_id: args.tenant_id,
            client_id: args.client_id,
            client_secret: args.client_secret,
        };
        settings.max_workers = args.max_workers;
        settings.dry_run = args.dry_run;
        settings.skip_cleanup = args.skip_cleanup;
        settings.export_json = args.export_json;
        settings.log_level = LevelFilter::from_str(&args.log_level)
            .map_err(|e| Error::Config(format!("invalid log level {:?}: {e}", args.log_level)))?;
        if let Some(secs) = args.run_timeout {
            settings.run_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = args.output_dir {
            settings.output_dir = dir;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn apply_file(&mut self, file: FileConfig, base_dir: Option<&Path>) {
        self.hub_prefixes = file.hub_prefixes;
        self.spoke_prefixes = file.spoke_prefixes;
        self.hub_tag_key = file.hub_tag_key;
        self.hub_tag_value = file.hub_tag_value;
        self.region_pairs = file
            .region_pairs
            .into_iter()
            .map(|entry| RegionPairSource::from_entry(entry, base_dir))
            .collect();
        self.peering = file.peering;
        self.peering_prefix = file.peering_prefix;
        self.max_peering_name_length = file.max_peering_name_length;
        self.health_check_timeout = Duration::from_secs(file.health_check_timeout);
        self.retry_attempts = file.retry_attempts;
        self.retry_delay = Duration::from_secs(file.retry_delay);
        self.retry_max_delay = Duration::from_secs(file.retry_max_delay);
        self.run_timeout = Duration::from_secs(file.run_timeout);
        self.cleanup_managed_only = file.cleanup_managed_only;
        if let Some(dir) = file.output_dir {
            self.output_dir = match base_dir {
                Some(base) if dir.is_relative() => base.join(dir),
                _ => dir,
            };
        }
    }

    /// Reject settings the run cannot work with, before any cloud call.
    pub fn validate(&self) -> Result<(), Error> {
        if self.hub_subscription_ids.is_empty() {
            return Err(Error::Config(
                "at least one hub subscription id is required".to_string(),
            ));
        }
        if self.auth.method == AuthMethod::ServicePrincipal {
            self.auth.service_principal()?;
        }
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Config(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.hub_prefixes.is_empty() || self.spoke_prefixes.is_empty() {
            return Err(Error::Config(
                "hub_prefixes and spoke_prefixes must not be empty".to_string(),
            ));
        }
        if self.region_pairs.is_empty() {
            return Err(Error::Config("no region pairs configured".to_string()));
        }
        if self.peering_prefix.is_empty() {
            return Err(Error::Config("peering_prefix must not be empty".to_string()));
        }
        let min_length = self.peering_prefix.len() + MIN_NAME_OVERHEAD;
        if self.max_peering_name_length < min_length
            || self.max_peering_name_length > AZURE_MAX_NAME_LENGTH
        {
            return Err(Error::Config(format!(
                "max_peering_name_length must be between {min_length} and {AZURE_MAX_NAME_LENGTH}, got {}",
                self.max_peering_name_length
            )));
        }
        Ok(())
    }

    pub fn is_hub_subscription(&self, subscription_id: &str) -> bool {
        self.hub_subscription_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(subscription_id))
    }

    pub fn is_spoke_excluded(&self, subscription_id: &str) -> bool {
        self.spoke_exclude_subscription_ids
            .iter()
            .any(|id| id.eq_ignore_ascii_case(subscription_id))
    }
}

/// Trim, drop empty entries and keep the first occurrence of each id.
fn clean_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        let id = id.into().trim().to_string();
        if !id.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(&id)) {
            out.push(id);
        }
    }
    out
}
