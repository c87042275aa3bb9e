//! End-to-end reconciliation runs against the in-memory tenant.

use azure_vnet_peering::azure::{FakeNetworkClient, FakeOperation, NetworkClient};
use azure_vnet_peering::config::{RegionPairSource, Settings};
use azure_vnet_peering::error::{CloudError, Error};
use azure_vnet_peering::models::{
    Action, Peering, PeeringSettings, PeeringState, PlannedAction, SyncLevel,
};
use azure_vnet_peering::processing::{peering_name, Report};
use azure_vnet_peering::reconcile;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const HUB: &str = "cngfw-az-hub-eastus";
const SPOKE: &str = "opencti-app-eastus";

fn write_regions(dir: &Path, name: &str, regions: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("# {name}\n{}\n", regions.join("\n"))).unwrap();
    path
}

/// Settings for a fast run with US (eastus, eastus2) and EU (westeurope) pairs.
fn settings(dir: &TempDir) -> Settings {
    let mut s = Settings::new(["h1"]);
    s.region_pairs = vec![
        RegionPairSource::new(
            "US",
            write_regions(dir.path(), "hubUS", &["eastus"]),
            write_regions(dir.path(), "spokeUS", &["eastus", "eastus2"]),
        ),
        RegionPairSource::new(
            "EU",
            write_regions(dir.path(), "hubEU", &["westeurope"]),
            write_regions(dir.path(), "spokeEU", &["westeurope"]),
        ),
    ];
    s.retry_delay = Duration::ZERO;
    s.retry_max_delay = Duration::ZERO;
    s.health_check_timeout = Duration::ZERO;
    s.output_dir = dir.path().to_path_buf();
    s
}

/// One hub and one spoke in eastus, in separate subscriptions.
fn scenario_a() -> (Arc<FakeNetworkClient>, String, String) {
    let fake = Arc::new(FakeNetworkClient::new());
    fake.add_subscription("h1", "Hub");
    fake.add_subscription("s1", "Spoke");
    let hub = fake.add_vnet("h1", HUB, "eastus", &[("appname", "hub-prod")]);
    let spoke = fake.add_vnet("s1", SPOKE, "eastus", &[]);
    (fake, hub, spoke)
}

async fn run(fake: &Arc<FakeNetworkClient>, settings: Settings) -> Report {
    let client: Arc<dyn NetworkClient> = fake.clone();
    reconcile(client, Arc::new(settings), Utc::now()).await.unwrap()
}

fn actions(report: &Report) -> Vec<Action> {
    report.outcomes.iter().map(|o| o.action).collect()
}

#[tokio::test]
async fn test_absent_connection_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, hub, spoke) = scenario_a();

    let report = run(&fake, settings(&dir)).await;

    assert_eq!(actions(&report), vec![Action::Created]);
    assert_eq!(report.successes().count(), 1);
    assert_eq!(report.counters.created, 1);
    assert_eq!(report.exit_code(), 0);
    let forward = fake.peerings_of(&hub);
    let reverse = fake.peerings_of(&spoke);
    assert_eq!(forward.len(), 1);
    assert_eq!(reverse.len(), 1);
    assert_eq!(forward[0].name, format!("cngfw_dnd-{HUB}-to-{SPOKE}"));
    assert_eq!(forward[0].connection_state, PeeringState::Connected);
    assert_eq!(reverse[0].connection_state, PeeringState::Connected);
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, _, _) = scenario_a();

    run(&fake, settings(&dir)).await;
    let calls = fake.mutation_calls();
    let report = run(&fake, settings(&dir)).await;

    assert_eq!(actions(&report), vec![Action::Skipped]);
    assert_eq!(report.counters.skipped_healthy, 1);
    assert_eq!(fake.mutation_calls(), calls);
    assert_eq!(report.counters.orphans_found, 0);
}

#[tokio::test]
async fn test_disconnected_peering_repaired_after_transient_error() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, hub, spoke) = scenario_a();
    fake.insert_peering(Peering {
        name: format!("cngfw_dnd-{HUB}-to-{SPOKE}"),
        owner_vnet_id: hub.clone(),
        remote_vnet_id: spoke.clone(),
        connection_state: PeeringState::Disconnected,
        allow_virtual_network_access: true,
        allow_forwarded_traffic: true,
        allow_gateway_transit: false,
        use_remote_gateways: false,
        sync_level: Some(SyncLevel::FullyInSync),
        provisioning_state: Some("Succeeded".to_string()),
    });
    fake.fail_next(
        FakeOperation::CreatePeering,
        CloudError::http("create", 503, "ServiceUnavailable"),
        1,
    );

    let report = run(&fake, settings(&dir)).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.action, Action::Repaired);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(fake.mutation_log().len(), 4);
    assert_eq!(fake.peerings_of(&hub)[0].connection_state, PeeringState::Connected);
    assert_eq!(fake.peerings_of(&spoke).len(), 1);
}

#[tokio::test]
async fn test_orphan_deleted_then_reported_when_cleanup_skipped() {
    for skip_cleanup in [false, true] {
        let dir = tempfile::tempdir().unwrap();
        let (fake, hub, _) = scenario_a();
        let gone = fake.add_vnet("s1", "opencti-gone-eastus", "westus", &[]);
        let client: &dyn NetworkClient = fake.as_ref();
        client
            .create_peering(&hub, "cngfw_dnd-hub-to-gone", &gone, &PeeringSettings::default())
            .await
            .unwrap();
        fake.remove_vnet(&gone);

        let mut s = settings(&dir);
        s.skip_cleanup = skip_cleanup;
        let report = run(&fake, s).await;

        assert_eq!(report.orphans.len(), 1, "skip_cleanup={skip_cleanup}");
        let orphan = &report.orphans[0];
        assert_eq!(orphan.peering_name, "cngfw_dnd-hub-to-gone");
        assert_eq!(orphan.deleted, !skip_cleanup);
        let still_there = fake
            .peerings_of(&hub)
            .iter()
            .any(|p| p.name == "cngfw_dnd-hub-to-gone");
        assert_eq!(still_there, skip_cleanup);
    }
}

#[tokio::test]
async fn test_long_names_truncate_to_the_same_name_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeNetworkClient::new());
    fake.add_subscription("h1", "Hub");
    fake.add_subscription("s1", "Spoke");
    let hub_name = format!("cngfw-az-hub-{}", "x".repeat(50));
    let spoke_name = format!("opencti-{}", "y".repeat(50));
    let hub = fake.add_vnet("h1", &hub_name, "eastus", &[("appname", "hub")]);
    fake.add_vnet("s1", &spoke_name, "eastus", &[]);

    let first = run(&fake, settings(&dir)).await;
    let second = run(&fake, settings(&dir)).await;

    let name = &first.outcomes[0].forward_peering;
    assert!(name.chars().count() <= 79);
    assert_eq!(name, &peering_name("cngfw_dnd", &hub_name, &spoke_name, 79));
    assert_eq!(&second.outcomes[0].forward_peering, name);
    assert_eq!(second.outcomes[0].action, Action::Skipped);
    assert_eq!(fake.peerings_of(&hub).len(), 1);
}

#[tokio::test]
async fn test_dry_run_never_mutates() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, hub, _) = scenario_a();
    let gone = fake.add_vnet("s1", "opencti-gone", "westus", &[]);
    let client: &dyn NetworkClient = fake.as_ref();
    client
        .create_peering(&hub, "stale", &gone, &PeeringSettings::default())
        .await
        .unwrap();
    fake.remove_vnet(&gone);
    let healthy = fake.add_vnet("s1", "opencti-healthy-eastus", "eastus", &[]);
    let attrs = PeeringSettings::default();
    client.create_peering(&hub, "hub-to-healthy", &healthy, &attrs).await.unwrap();
    client.create_peering(&healthy, "healthy-to-hub", &hub, &attrs).await.unwrap();
    let before = fake.mutation_calls();

    let mut s = settings(&dir);
    s.dry_run = true;
    let report = run(&fake, s).await;

    assert!(report.dry_run);
    assert_eq!(actions(&report), vec![Action::DryRun, Action::DryRun]);
    let planned: Vec<Option<PlannedAction>> = report.outcomes.iter().map(|o| o.planned).collect();
    assert_eq!(planned, vec![Some(PlannedAction::Create), None]);
    assert_eq!(report.counters.dry_run, 2);
    assert_eq!(report.counters.skipped_healthy, 0);
    assert_eq!(report.orphans.len(), 1);
    assert!(!report.orphans[0].deleted);
    assert!(report.orphans[0].dry_run);
    assert_eq!(fake.mutation_calls(), before);
}

#[tokio::test]
async fn test_exhausted_transient_errors_are_critical() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, _, _) = scenario_a();
    fake.fail_next(
        FakeOperation::CreatePeering,
        CloudError::http("create", 429, "TooManyRequests"),
        3,
    );

    let report = run(&fake, settings(&dir)).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.action, Action::CriticalFailure);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(fake.mutation_calls(), 3);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, _, _) = scenario_a();
    fake.fail_next(
        FakeOperation::CreatePeering,
        CloudError::http("create", 403, "AuthorizationFailed"),
        1,
    );

    let report = run(&fake, settings(&dir)).await;

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.action, Action::Failed);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.error.as_deref().unwrap().contains("403"));
    assert_eq!(report.exit_code(), 3);
}

#[tokio::test]
async fn test_candidates_follow_region_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeNetworkClient::new());
    fake.add_subscription("h1", "Hub");
    fake.add_subscription("s1", "Spoke 1");
    fake.add_subscription("s2", "Spoke 2");
    fake.add_vnet("h1", HUB, "eastus", &[("appname", "hub-prod")]);
    fake.add_vnet("h1", "cngfw-az-hub-westeurope", "westeurope", &[("appname", "HUB")]);
    fake.add_vnet("h1", "cngfw-az-untagged", "eastus", &[]);
    fake.add_vnet("s1", SPOKE, "eastus", &[]);
    fake.add_vnet("s2", "MISP-eastus2", "eastus2", &[]);
    fake.add_vnet("s2", "opencti-eu", "westeurope", &[]);
    fake.add_vnet("s2", "opencti-asia", "japaneast", &[]);
    fake.add_vnet("s1", "unrelated", "eastus", &[]);

    let report = run(&fake, settings(&dir)).await;

    assert_eq!(report.discovery.hub_vnets, 2);
    assert_eq!(report.discovery.spoke_vnets, 4);
    let pairs: Vec<(&str, &str, &str)> = report
        .outcomes
        .iter()
        .map(|o| (o.pair_name.as_str(), o.source_vnet.as_str(), o.target_vnet.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("US", HUB, "MISP-eastus2"),
            ("US", HUB, SPOKE),
            ("EU", "cngfw-az-hub-westeurope", "opencti-eu"),
        ]
    );
    assert!(report.outcomes.iter().all(|o| o.action == Action::Created));
}

#[tokio::test]
async fn test_shared_hub_mutations_never_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeNetworkClient::new().with_mutation_delay(Duration::from_millis(5)));
    fake.add_subscription("h1", "Hub");
    fake.add_subscription("s1", "Spoke");
    let hub = fake.add_vnet("h1", HUB, "eastus", &[("appname", "hub")]);
    for i in 0..12 {
        fake.add_vnet("s1", &format!("opencti-{i:02}"), "eastus", &[]);
    }

    let mut s = settings(&dir);
    s.max_workers = 6;
    let report = run(&fake, s).await;

    assert_eq!(report.counters.created, 12);
    assert!(!fake.overlap_detected());
    assert_eq!(fake.peerings_of(&hub).len(), 12);
}

#[tokio::test]
async fn test_tenant_listing_failure_falls_back_to_hub_subscriptions() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, _, _) = scenario_a();
    fake.add_vnet("h1", "opencti-in-hub-sub", "eastus", &[]);
    fake.fail_tenant_listing();

    let report = run(&fake, settings(&dir)).await;

    assert!(report.discovery.degraded);
    let targets: Vec<&str> = report.outcomes.iter().map(|o| o.target_vnet.as_str()).collect();
    assert_eq!(targets, vec!["opencti-in-hub-sub"]);
}

#[tokio::test]
async fn test_failing_subscription_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let (fake, _, _) = scenario_a();
    fake.add_subscription("s2", "Locked");
    fake.add_vnet("s2", "opencti-locked", "eastus", &[]);
    fake.fail_subscription("s2");

    let report = run(&fake, settings(&dir)).await;

    assert_eq!(report.discovery.failures.len(), 1);
    assert_eq!(report.discovery.failures[0].subscription_id, "s2");
    assert_eq!(actions(&report), vec![Action::Created]);
}

#[tokio::test]
async fn test_no_visible_hub_subscription_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeNetworkClient::new());
    fake.add_subscription("s1", "Spoke");
    let client: Arc<dyn NetworkClient> = fake.clone();

    let result = reconcile(client, Arc::new(settings(&dir)), Utc::now()).await;

    assert!(matches!(result, Err(Error::NoHubSubscriptions(_))));
}

#[tokio::test(start_paused = true)]
async fn test_run_timeout_abandons_unfinished_work() {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeNetworkClient::new().with_mutation_delay(Duration::from_secs(600)));
    fake.add_subscription("h1", "Hub");
    fake.add_subscription("s1", "Spoke");
    fake.add_vnet("h1", HUB, "eastus", &[("appname", "hub")]);
    fake.add_vnet("s1", SPOKE, "eastus", &[]);

    let mut s = settings(&dir);
    s.run_timeout = Duration::from_secs(60);
    let report = run(&fake, s).await;

    assert!(report.timed_out);
    assert_eq!(actions(&report), vec![Action::Failed]);
    assert!(report.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("run timeout"));
}
