//! Per-VNet mutation locks.
//!
//! A unit holds the locks of every VNet whose peerings it may change until it
//! has finished mutating them. Units on disjoint VNets never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

#[derive(Debug, Default)]
pub struct VnetLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Guards released together on drop.
#[derive(Debug)]
pub struct VnetGuard {
    keys: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl VnetGuard {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl VnetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Lock every VNet in `vnet_ids`.
    ///
    /// Keys are lowercased, deduplicated and taken in sorted order so two units
    /// sharing VNets cannot deadlock.
    pub async fn lock_all<I, S>(&self, vnet_ids: I) -> VnetGuard
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = vnet_ids
            .into_iter()
            .map(|id| id.as_ref().to_ascii_lowercase())
            .collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.lock_for(key).lock_owned().await);
        }
        VnetGuard {
            keys,
            _guards: guards,
        }
    }
}
