//! Region pairs and hub/spoke candidate enumeration.

use super::discovery::Inventory;
use crate::config::RegionPairSource;
use crate::error::Error;
use crate::models::{RegionPair, VirtualNetwork};
use itertools::{iproduct, Itertools};
use std::collections::HashMap;
use std::path::Path;

/// Region identifiers of a region list file: one per line, `#` comments and
/// blank lines ignored, lowercased, first occurrence kept.
pub fn parse_region_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_ascii_lowercase)
        .unique()
        .collect()
}

pub fn load_region_list(path: &Path) -> Result<Vec<String>, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::RegionFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_region_list(&text))
}

/// Load every pair. An unreadable list counts as empty and is reported as a warning.
pub fn load_region_pairs(sources: &[RegionPairSource]) -> (Vec<RegionPair>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut load = |path: &Path| match load_region_list(path) {
        Ok(regions) => regions,
        Err(e) => {
            log::warn!("{e}");
            warnings.push(e.to_string());
            Vec::new()
        }
    };

    let pairs = sources
        .iter()
        .map(|source| {
            let hub = load(&source.hub_file);
            let spoke = load(&source.spoke_file);
            log::info!(
                "Region pair {}: {} hub regions, {} spoke regions",
                source.name,
                hub.len(),
                spoke.len()
            );
            RegionPair::new(&source.name, hub, spoke)
        })
        .collect();
    (pairs, warnings)
}

/// One hub-spoke connection to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position in the enumeration, orders the report.
    pub sequence: usize,
    pub pair_name: String,
    pub hub: VirtualNetwork,
    pub spoke: VirtualNetwork,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<String>,
}

/// Cross product of the hubs and spokes in each pair's regions.
///
/// Pairs are taken in configuration order, hubs and spokes by name. A
/// connection claimed by more than one pair is reconciled once, under the
/// last pair that claims it.
pub fn resolve_candidates(pairs: &[RegionPair], inventory: &Inventory) -> Resolution {
    let mut resolution = Resolution::default();
    let mut slots: Vec<Option<Candidate>> = Vec::new();
    let mut claimed: HashMap<(String, String), usize> = HashMap::new();

    for pair in pairs {
        let hubs: Vec<&VirtualNetwork> = inventory
            .hubs
            .iter()
            .filter(|v| pair.has_hub_region(&v.region))
            .collect();
        let spokes: Vec<&VirtualNetwork> = inventory
            .spokes
            .iter()
            .filter(|v| pair.has_spoke_region(&v.region))
            .collect();

        if hubs.is_empty() || spokes.is_empty() {
            let warning = format!(
                "Region pair {} skipped: {} hub VNets, {} spoke VNets",
                pair.name,
                hubs.len(),
                spokes.len()
            );
            log::warn!("{warning}");
            resolution.warnings.push(warning);
            continue;
        }

        for (hub, spoke) in iproduct!(hubs, spokes) {
            if hub.id.eq_ignore_ascii_case(&spoke.id) {
                continue;
            }
            let key = (hub.id.to_ascii_lowercase(), spoke.id.to_ascii_lowercase());
            if let Some(previous) = claimed.get(&key).copied() {
                if let Some(old) = slots[previous].take() {
                    let warning = format!(
                        "{} <-> {} is in region pairs {} and {}, reconciling under {}",
                        hub.name, spoke.name, old.pair_name, pair.name, pair.name
                    );
                    log::warn!("{warning}");
                    resolution.warnings.push(warning);
                }
            }
            claimed.insert(key, slots.len());
            slots.push(Some(Candidate {
                sequence: 0,
                pair_name: pair.name.clone(),
                hub: hub.clone(),
                spoke: spoke.clone(),
            }));
        }
    }

    resolution.candidates = slots
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(sequence, candidate)| Candidate {
            sequence,
            ..candidate
        })
        .collect();
    resolution
}
