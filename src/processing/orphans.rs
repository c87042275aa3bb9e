//! Orphan peering detection and cleanup.
//!
//! An orphan is a peering on a discovered VNet whose remote VNet is neither in
//! the inventory nor found by a direct lookup. A failed lookup never makes a
//! peering an orphan.

use super::discovery::Inventory;
use super::locks::VnetGuard;
use super::reconcile::ReconcileContext;
use super::scheduler::WorkUnit;
use crate::models::{OrphanRecord, Peering, VirtualNetwork};
use async_trait::async_trait;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A peering found to point at a VNet that no longer exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanCandidate {
    pub vnet: VirtualNetwork,
    pub peering: Peering,
}

/// List the peerings of every discovered VNet and return the orphans, sorted.
pub async fn find_orphans(ctx: &ReconcileContext, inventory: &Inventory) -> Vec<OrphanCandidate> {
    let client = ctx.client.as_ref();
    let vnets: Vec<&VirtualNetwork> = inventory.all_vnets().collect();
    let listings: Vec<_> = stream::iter(vnets)
        .map(|vnet| async move {
            let listed = ctx
                .retry
                .execute(&format!("list peerings of {}", vnet.name), || {
                    client.list_peerings(&vnet.id)
                })
                .await;
            (vnet, listed)
        })
        .buffer_unordered(ctx.settings.max_workers.max(1))
        .collect()
        .await;

    let mut orphans = Vec::new();
    for (vnet, listed) in listings {
        let peerings = match listed {
            Ok(listed) => listed.value,
            Err(e) => {
                let warning = format!("Orphan scan skipped {}: {e}", vnet.name);
                log::warn!("{warning}");
                ctx.report.add_warning(warning);
                continue;
            }
        };
        for peering in peerings {
            if ctx.settings.cleanup_managed_only
                && !peering.name.starts_with(ctx.settings.peering_prefix.as_str())
            {
                continue;
            }
            if is_orphan(ctx, inventory, &peering).await {
                orphans.push(OrphanCandidate {
                    vnet: vnet.clone(),
                    peering,
                });
            }
        }
    }
    orphans.sort_by(|a, b| {
        a.vnet
            .name
            .cmp(&b.vnet.name)
            .then_with(|| a.peering.name.cmp(&b.peering.name))
    });
    log::info!("Found {} orphan peerings", orphans.len());
    orphans
}

async fn is_orphan(ctx: &ReconcileContext, inventory: &Inventory, peering: &Peering) -> bool {
    if inventory.is_known(&peering.remote_vnet_id) {
        return false;
    }
    let client = ctx.client.as_ref();
    let remote = &peering.remote_vnet_id;
    match ctx
        .retry
        .execute(&format!("look up {remote}"), || client.virtual_network_exists(remote))
        .await
    {
        Ok(found) if found.value => {
            log::debug!("{} points outside the inventory at existing {remote}", peering.name);
            false
        }
        Ok(_) => true,
        Err(e) => {
            log::warn!(
                "Cannot tell whether {remote} of {} exists, keeping it: {e}",
                peering.name
            );
            false
        }
    }
}

/// Scheduler unit deleting one orphan.
pub struct OrphanUnit {
    ctx: Arc<ReconcileContext>,
    orphan: OrphanCandidate,
    reported: AtomicBool,
}

impl OrphanUnit {
    pub fn new(ctx: Arc<ReconcileContext>, orphan: OrphanCandidate) -> Self {
        Self {
            ctx,
            orphan,
            reported: AtomicBool::new(false),
        }
    }

    fn record(&self) -> OrphanRecord {
        OrphanRecord {
            vnet_id: self.orphan.vnet.id.clone(),
            vnet_name: self.orphan.vnet.name.clone(),
            peering_name: self.orphan.peering.name.clone(),
            remote_vnet_id: self.orphan.peering.remote_vnet_id.clone(),
            deleted: false,
            dry_run: self.ctx.settings.dry_run,
            attempts: 0,
            error: None,
            critical: false,
        }
    }

    fn report_once(&self, record: OrphanRecord) {
        if !self.reported.swap(true, Ordering::SeqCst) {
            self.ctx.report.record_orphan(record);
        }
    }

    async fn cleanup(&self) -> Option<OrphanRecord> {
        let mut record = self.record();
        let vnet = &self.orphan.vnet;
        let name = &self.orphan.peering.name;

        if self.ctx.settings.skip_cleanup || self.ctx.settings.dry_run {
            log::info!(
                "{} {name} on {} (remote {})",
                "Orphan kept:".yellow(),
                vnet.name,
                record.remote_vnet_id
            );
            return Some(record);
        }

        // Re-read under the VNet lock; the peering may have changed since the scan.
        let client = self.ctx.client.as_ref();
        let current = self
            .ctx
            .retry
            .execute(&format!("list peerings of {}", vnet.name), || {
                client.list_peerings(&vnet.id)
            })
            .await;
        match current {
            Ok(listed) => {
                let still_orphan = listed
                    .value
                    .iter()
                    .any(|p| p.name == *name && p.points_at(&record.remote_vnet_id));
                if !still_orphan {
                    log::info!("Orphan {name} on {} changed since the scan, left alone", vnet.name);
                    return None;
                }
            }
            Err(e) => {
                record.attempts = e.attempts;
                record.critical = e.is_critical();
                record.error = Some(format!("re-read before delete: {e}"));
                return Some(record);
            }
        }

        let step = format!("delete orphan {name} on {}", vnet.name);
        match self
            .ctx
            .retry
            .execute(&step, || client.delete_peering(&vnet.id, name))
            .await
        {
            Ok(done) => {
                log::info!("{} {name} on {}", "Deleted orphan".green(), vnet.name);
                record.deleted = true;
                record.attempts = done.attempts;
            }
            Err(e) => {
                log::error!("{}: {e}", step.red());
                record.attempts = e.attempts;
                record.critical = e.is_critical();
                record.error = Some(e.to_string());
            }
        }
        Some(record)
    }
}

#[async_trait]
impl WorkUnit for OrphanUnit {
    fn label(&self) -> String {
        format!(
            "orphan {} on {}",
            self.orphan.peering.name, self.orphan.vnet.name
        )
    }

    fn lock_keys(&self) -> Vec<String> {
        vec![self.orphan.vnet.id.clone()]
    }

    async fn execute(&self, _guard: VnetGuard) {
        match self.cleanup().await {
            Some(record) => self.report_once(record),
            None => {
                self.reported.store(true, Ordering::SeqCst);
            }
        }
    }

    fn abandon(&self, reason: &str) {
        let mut record = self.record();
        record.error = Some(reason.to_string());
        self.report_once(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::{fake_vnet_id, FakeNetworkClient, FakeOperation, NetworkClient};
    use crate::config::Settings;
    use crate::error::CloudError;
    use crate::models::{PeeringSettings, VnetRole};
    use crate::processing::locks::VnetLocks;
    use crate::processing::report::ReportAggregator;
    use crate::processing::retry::RetryPolicy;
    use chrono::Utc;
    use std::collections::{BTreeMap, HashSet};

    fn vnet(id: &str, name: &str) -> VirtualNetwork {
        VirtualNetwork {
            id: id.to_string(),
            name: name.to_string(),
            subscription_id: "h1".to_string(),
            region: "eastus".to_string(),
            role: VnetRole::Hub,
            tags: BTreeMap::new(),
        }
    }

    async fn execute_unit(unit: OrphanUnit) {
        let guard = VnetLocks::new().lock_all(unit.lock_keys()).await;
        unit.execute(guard).await;
    }

    fn context(fake: &Arc<FakeNetworkClient>, configure: impl FnOnce(&mut Settings)) -> ReconcileContext {
        let mut settings = Settings::new(["h1"]);
        configure(&mut settings);
        let mut ctx = ReconcileContext::new(
            fake.clone(),
            Arc::new(settings),
            Arc::new(ReportAggregator::new(Utc::now(), false)),
        );
        ctx.retry = RetryPolicy::immediate(3);
        ctx
    }

    /// Hub peered to a spoke that is then removed, plus a live peering to `kept`.
    async fn tenant() -> (Arc<FakeNetworkClient>, Inventory) {
        let fake = Arc::new(FakeNetworkClient::new());
        let hub = fake.add_vnet("h1", "cngfw-az-hub", "eastus", &[("appname", "hub")]);
        let gone = fake.add_vnet("s1", "opencti-gone", "eastus", &[]);
        let kept = fake.add_vnet("s1", "opencti-kept", "eastus", &[]);
        let settings = PeeringSettings::default();
        fake.create_peering(&hub, "cngfw_dnd-hub-to-gone", &gone, &settings).await.unwrap();
        fake.create_peering(&hub, "cngfw_dnd-hub-to-kept", &kept, &settings).await.unwrap();
        fake.create_peering(&hub, "manual-to-gone", &gone, &settings).await.unwrap();
        fake.remove_vnet(&gone);

        let inventory = Inventory {
            hubs: vec![vnet(&hub, "cngfw-az-hub")],
            spokes: vec![vnet(&kept, "opencti-kept")],
            known_vnet_ids: [hub.to_ascii_lowercase(), kept.to_ascii_lowercase()]
                .into_iter()
                .collect::<HashSet<_>>(),
            ..Inventory::default()
        };
        (fake, inventory)
    }

    #[tokio::test]
    async fn test_orphans_found_and_known_remote_kept() {
        let (fake, inventory) = tenant().await;
        let ctx = context(&fake, |_| {});
        let orphans = find_orphans(&ctx, &inventory).await;
        let names: Vec<&str> = orphans.iter().map(|o| o.peering.name.as_str()).collect();
        assert_eq!(names, vec!["cngfw_dnd-hub-to-gone", "manual-to-gone"]);
    }

    #[tokio::test]
    async fn test_managed_only_filter() {
        let (fake, inventory) = tenant().await;
        let ctx = context(&fake, |s| s.cleanup_managed_only = true);
        let orphans = find_orphans(&ctx, &inventory).await;
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].peering.name, "cngfw_dnd-hub-to-gone");
    }

    #[tokio::test]
    async fn test_remote_outside_inventory_but_existing_is_kept() {
        let (fake, mut inventory) = tenant().await;
        let kept = fake_vnet_id("s1", "opencti-kept");
        inventory.known_vnet_ids.remove(&kept.to_ascii_lowercase());
        let ctx = context(&fake, |_| {});
        let orphans = find_orphans(&ctx, &inventory).await;
        assert!(orphans.iter().all(|o| !o.peering.points_at(&kept)));
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_orphan() {
        let (fake, inventory) = tenant().await;
        fake.fail_next(
            FakeOperation::VnetExists,
            CloudError::http("get vnet", 403, "AuthorizationFailed"),
            10,
        );
        let ctx = context(&fake, |_| {});
        assert!(find_orphans(&ctx, &inventory).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_skip_cleanup() {
        let (fake, inventory) = tenant().await;
        let hub = inventory.hubs[0].id.clone();

        let ctx = Arc::new(context(&fake, |s| s.skip_cleanup = true));
        for orphan in find_orphans(&ctx, &inventory).await {
            execute_unit(OrphanUnit::new(ctx.clone(), orphan)).await;
        }
        let report = ctx.report.finalize();
        assert_eq!(report.orphans.len(), 2);
        assert!(report.orphans.iter().all(|o| !o.deleted));
        assert_eq!(fake.peerings_of(&hub).len(), 3);

        let ctx = Arc::new(context(&fake, |_| {}));
        for orphan in find_orphans(&ctx, &inventory).await {
            execute_unit(OrphanUnit::new(ctx.clone(), orphan)).await;
        }
        let report = ctx.report.finalize();
        assert_eq!(report.counters.orphans_deleted, 2);
        let left: Vec<String> = fake.peerings_of(&hub).into_iter().map(|p| p.name).collect();
        assert_eq!(left, vec!["cngfw_dnd-hub-to-kept"]);
    }

    #[tokio::test]
    async fn test_critical_delete_failure() {
        let (fake, inventory) = tenant().await;
        fake.fail_next(
            FakeOperation::DeletePeering,
            CloudError::http("delete peering", 500, "oops"),
            3,
        );
        let ctx = Arc::new(context(&fake, |s| s.cleanup_managed_only = true));
        let orphan = find_orphans(&ctx, &inventory).await.remove(0);
        execute_unit(OrphanUnit::new(ctx.clone(), orphan)).await;
        let report = ctx.report.finalize();
        assert!(report.orphans[0].critical);
        assert_eq!(report.orphans[0].attempts, 3);
        assert_eq!(report.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_records_without_delete() {
        let (fake, inventory) = tenant().await;
        let before = fake.mutation_calls();
        let ctx = Arc::new(context(&fake, |s| s.dry_run = true));
        for orphan in find_orphans(&ctx, &inventory).await {
            execute_unit(OrphanUnit::new(ctx.clone(), orphan)).await;
        }
        let report = ctx.report.finalize();
        assert!(report.orphans.iter().all(|o| o.dry_run && !o.deleted));
        assert_eq!(fake.mutation_calls(), before);
    }
}
