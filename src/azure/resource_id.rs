//! ARM resource id parsing.

use regex::Regex;
use std::sync::OnceLock;

/// Regex for `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}`.
static RESOURCE_ID_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_resource_id_regex() -> &'static Regex {
    RESOURCE_ID_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)^/subscriptions/([^/]+)/resourceGroups/([^/]+)/providers/([^/]+)/([^/]+)/([^/]+)",
        )
        .expect("Invalid Regex")
    })
}

/// The parts of an ARM resource id this tool cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId<'a> {
    pub subscription_id: &'a str,
    pub resource_group: &'a str,
    pub provider: &'a str,
    pub resource_type: &'a str,
    pub name: &'a str,
}

impl<'a> ResourceId<'a> {
    /// Parse a resource id, returning `None` for anything that is not one.
    pub fn parse(id: &'a str) -> Option<ResourceId<'a>> {
        let caps = get_resource_id_regex().captures(id)?;
        let part = |i: usize| caps.get(i).map(|m| m.as_str());
        Some(ResourceId {
            subscription_id: part(1)?,
            resource_group: part(2)?,
            provider: part(3)?,
            resource_type: part(4)?,
            name: part(5)?,
        })
    }
}

/// Last path segment of a resource id, for display.
pub fn short_name(id: &str) -> &str {
    ResourceId::parse(id)
        .map(|r| r.name)
        .unwrap_or_else(|| id.rsplit('/').next().unwrap_or(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VNET_ID: &str = "/subscriptions/0000-1111/resourceGroups/rg-net/providers/Microsoft.Network/virtualNetworks/opencti-app-eastus";

    #[test]
    fn test_parse_vnet_id() {
        let id = ResourceId::parse(VNET_ID).expect("should parse");
        assert_eq!(id.subscription_id, "0000-1111");
        assert_eq!(id.resource_group, "rg-net");
        assert_eq!(id.provider, "Microsoft.Network");
        assert_eq!(id.resource_type, "virtualNetworks");
        assert_eq!(id.name, "opencti-app-eastus");
    }

    #[test]
    fn test_parse_lowercase_id() {
        let lower = VNET_ID.to_ascii_lowercase();
        let id = ResourceId::parse(&lower).expect("should parse");
        assert_eq!(id.resource_group, "rg-net");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(ResourceId::parse("not-an-id").is_none());
        assert!(ResourceId::parse("/subscriptions/x").is_none());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name(VNET_ID), "opencti-app-eastus");
        assert_eq!(short_name("a/b/c"), "c");
        assert_eq!(short_name("plain"), "plain");
    }
}
