//! Region pair model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named grouping of hub regions and spoke regions that are peered together.
///
/// Region names are stored lowercased so lookups ignore case.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegionPair {
    /// Label used in logs and the report.
    pub name: String,
    /// Regions searched for hub VNets.
    pub hub_regions: BTreeSet<String>,
    /// Regions searched for spoke VNets.
    pub spoke_regions: BTreeSet<String>,
}

impl RegionPair {
    pub fn new<I, J>(name: &str, hub_regions: I, spoke_regions: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        RegionPair {
            name: name.to_string(),
            hub_regions: hub_regions
                .into_iter()
                .map(|r| r.as_ref().to_ascii_lowercase())
                .collect(),
            spoke_regions: spoke_regions
                .into_iter()
                .map(|r| r.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn has_hub_region(&self, region: &str) -> bool {
        self.hub_regions.contains(&region.to_ascii_lowercase())
    }

    pub fn has_spoke_region(&self, region: &str) -> bool {
        self.spoke_regions.contains(&region.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_lookup_ignores_case() {
        let pair = RegionPair::new("US", ["EastUS", "westus2"], ["eastus"]);
        assert!(pair.has_hub_region("eastus"));
        assert!(pair.has_hub_region("WestUS2"));
        assert!(pair.has_spoke_region("EASTUS"));
        assert!(!pair.has_spoke_region("westus2"));
    }
}
