//! Command line interface.

use crate::config::AuthMethod;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "azure-vnet-peering")]
#[command(
    about = "Create, repair and clean up hub-spoke VNet peerings across Azure subscriptions",
    long_about = None
)]
pub struct Args {
    /// Comma-separated list of subscription ids holding hub VNets
    #[arg(long, value_delimiter = ',', required = true)]
    pub hub_subscription_ids: Vec<String>,

    /// How to obtain Azure credentials
    #[arg(long, value_enum, default_value = "default")]
    pub auth_method: AuthMethod,

    /// Entra ID tenant id (service_principal)
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Service principal client id (service_principal)
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Service principal client secret (service_principal)
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Comma-separated list of subscription ids never searched for spokes
    #[arg(long, value_delimiter = ',')]
    pub spoke_exclude_subscription_ids: Vec<String>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrent reconciliation units
    #[arg(long, default_value_t = 10)]
    pub max_workers: usize,

    /// Compute and report every decision without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Report orphan peerings but do not delete them
    #[arg(long)]
    pub skip_cleanup: bool,

    /// Also write the report as JSON
    #[arg(long)]
    pub export_json: bool,

    /// error, warn, info, debug or trace
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Upper bound for the whole run in seconds (overrides the config file)
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Directory for the report and log files (overrides the config file)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from([
            "azure-vnet-peering",
            "--hub-subscription-ids",
            "h1,h2",
            "--dry-run",
        ])
        .expect("valid args");
        assert_eq!(args.hub_subscription_ids, vec!["h1", "h2"]);
        assert_eq!(args.auth_method, AuthMethod::Default);
        assert_eq!(args.max_workers, 10);
        assert!(args.dry_run);
        assert!(!args.skip_cleanup);
        assert!(args.spoke_exclude_subscription_ids.is_empty());
    }

    #[test]
    fn test_parse_service_principal() {
        let args = Args::try_parse_from([
            "azure-vnet-peering",
            "--hub-subscription-ids",
            "h1",
            "--auth-method",
            "service_principal",
            "--tenant-id",
            "t",
            "--client-id",
            "c",
            "--client-secret",
            "s",
            "--spoke-exclude-subscription-ids",
            "x1,x2",
            "--max-workers",
            "4",
        ])
        .expect("valid args");
        assert_eq!(args.auth_method, AuthMethod::ServicePrincipal);
        assert_eq!(args.client_secret.as_deref(), Some("s"));
        assert_eq!(args.spoke_exclude_subscription_ids, vec!["x1", "x2"]);
        assert_eq!(args.max_workers, 4);
    }

    #[test]
    fn test_hub_subscriptions_required() {
        assert!(Args::try_parse_from(["azure-vnet-peering"]).is_err());
    }
}
