//! Bounded worker pool for reconciliation and cleanup units.

use super::locks::{VnetGuard, VnetLocks};
use async_trait::async_trait;
use colored::Colorize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// A self-contained piece of work that records its own result.
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    fn label(&self) -> String;

    /// Ids of the VNets whose peerings this unit may mutate.
    fn lock_keys(&self) -> Vec<String>;

    /// Run the unit. `guard` holds the locks of [`WorkUnit::lock_keys`]; a unit
    /// may drop it once it is done mutating.
    async fn execute(&self, guard: VnetGuard);

    /// Record the unit as failed because it never finished.
    fn abandon(&self, reason: &str);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub completed: usize,
    pub abandoned: usize,
}

pub struct Scheduler {
    max_workers: usize,
    locks: Arc<VnetLocks>,
    deadline: Instant,
}

impl Scheduler {
    pub fn new(max_workers: usize, locks: Arc<VnetLocks>, deadline: Instant) -> Self {
        Self {
            max_workers: max_workers.max(1),
            locks,
            deadline,
        }
    }

    /// Run every unit, at most `max_workers` at a time.
    ///
    /// A unit first takes the locks of its VNets, then a worker slot. Units
    /// still running at the deadline are aborted and abandoned.
    pub async fn run_all(&self, units: Vec<Arc<dyn WorkUnit>>) -> ScheduleSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut handles = Vec::with_capacity(units.len());

        for unit in units {
            let task_unit = Arc::clone(&unit);
            let locks = Arc::clone(&self.locks);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let guard = locks.lock_all(task_unit.lock_keys()).await;
                let _permit = semaphore.acquire_owned().await.ok();
                task_unit.execute(guard).await;
            });
            handles.push((unit, handle));
        }

        let mut summary = ScheduleSummary::default();
        for (unit, mut handle) in handles {
            let finished = match tokio::time::timeout_at(self.deadline, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    handle.await
                }
            };
            match finished {
                Ok(()) => summary.completed += 1,
                Err(e) if e.is_cancelled() => {
                    log::error!("{} {}", "Abandoned".red(), unit.label());
                    unit.abandon("abandoned: run timeout expired");
                    summary.abandoned += 1;
                }
                Err(e) => {
                    log::error!("{} {}: {e}", "Panicked".red(), unit.label());
                    unit.abandon(&format!("abandoned: unit panicked: {e}"));
                    summary.abandoned += 1;
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Tracker {
        running: AtomicUsize,
        peak: AtomicUsize,
        abandoned: Mutex<Vec<String>>,
    }

    struct SleepUnit {
        name: String,
        keys: Vec<String>,
        sleep: Duration,
        tracker: Arc<Tracker>,
    }

    #[async_trait]
    impl WorkUnit for SleepUnit {
        fn label(&self) -> String {
            self.name.clone()
        }

        fn lock_keys(&self) -> Vec<String> {
            self.keys.clone()
        }

        async fn execute(&self, _guard: VnetGuard) {
            let now = self.tracker.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.tracker.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.sleep).await;
            self.tracker.running.fetch_sub(1, Ordering::SeqCst);
        }

        fn abandon(&self, reason: &str) {
            self.tracker
                .abandoned
                .lock()
                .unwrap()
                .push(format!("{}: {reason}", self.name));
        }
    }

    fn units(tracker: &Arc<Tracker>, n: usize, shared_key: bool, sleep: Duration) -> Vec<Arc<dyn WorkUnit>> {
        (0..n)
            .map(|i| {
                let key = if shared_key { "hub".to_string() } else { format!("vnet-{i}") };
                Arc::new(SleepUnit {
                    name: format!("unit-{i}"),
                    keys: vec![key],
                    sleep,
                    tracker: Arc::clone(tracker),
                }) as Arc<dyn WorkUnit>
            })
            .collect()
    }

    #[tokio::test]
    async fn test_worker_bound() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(
            3,
            Arc::new(VnetLocks::new()),
            Instant::now() + Duration::from_secs(10),
        );
        let summary = scheduler
            .run_all(units(&tracker, 10, false, Duration::from_millis(20)))
            .await;
        assert_eq!(summary.completed, 10);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shared_vnet_never_concurrent() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(
            8,
            Arc::new(VnetLocks::new()),
            Instant::now() + Duration::from_secs(10),
        );
        let summary = scheduler
            .run_all(units(&tracker, 5, true, Duration::from_millis(10)))
            .await;
        assert_eq!(summary.completed, 5);
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_abandons_units() {
        let tracker = Arc::new(Tracker::default());
        let scheduler = Scheduler::new(
            2,
            Arc::new(VnetLocks::new()),
            Instant::now() + Duration::from_millis(50),
        );
        let summary = scheduler
            .run_all(units(&tracker, 4, false, Duration::from_secs(30)))
            .await;
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.abandoned, 4);
        let abandoned = tracker.abandoned.lock().unwrap();
        assert_eq!(abandoned.len(), 4);
        assert!(abandoned[0].contains("run timeout"));
    }
}
