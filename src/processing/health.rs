//! Health of directional peerings and of hub-spoke connections.

use crate::models::{Peering, PeeringState, SyncLevel};
use std::fmt;

/// Reason a directional peering is not healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthViolation {
    NotConnected(PeeringState),
    VirtualNetworkAccessDisabled,
    ForwardedTrafficDisabled,
    OutOfSync(SyncLevel),
}

impl fmt::Display for HealthViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthViolation::NotConnected(state) => write!(f, "state is {state}"),
            HealthViolation::VirtualNetworkAccessDisabled => {
                write!(f, "virtual network access disabled")
            }
            HealthViolation::ForwardedTrafficDisabled => write!(f, "forwarded traffic disabled"),
            HealthViolation::OutOfSync(level) => write!(f, "sync level is {level}"),
        }
    }
}

/// Everything wrong with `peering`, empty when healthy.
///
/// A missing sync level counts as in sync.
pub fn violations(peering: &Peering) -> Vec<HealthViolation> {
    let mut found = Vec::new();
    if peering.connection_state != PeeringState::Connected {
        found.push(HealthViolation::NotConnected(peering.connection_state));
    }
    if !peering.allow_virtual_network_access {
        found.push(HealthViolation::VirtualNetworkAccessDisabled);
    }
    if !peering.allow_forwarded_traffic {
        found.push(HealthViolation::ForwardedTrafficDisabled);
    }
    match peering.sync_level {
        None | Some(SyncLevel::FullyInSync) => {}
        Some(level) => found.push(HealthViolation::OutOfSync(level)),
    }
    found
}

pub fn is_healthy(peering: &Peering) -> bool {
    violations(peering).is_empty()
}

/// One direction of a connection as found in the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionState {
    Missing,
    Healthy,
    Unhealthy,
}

impl DirectionState {
    pub fn of(peering: Option<&Peering>) -> Self {
        match peering {
            None => DirectionState::Missing,
            Some(p) if is_healthy(p) => DirectionState::Healthy,
            Some(_) => DirectionState::Unhealthy,
        }
    }
}

/// Where a hub-spoke connection starts from before any mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Neither direction exists.
    Absent,
    /// Both directions exist and are healthy.
    HealthyConnected,
    /// Anything else, repaired by rebuilding both directions.
    Unhealthy,
}

impl ConnectionState {
    pub fn classify(forward: DirectionState, reverse: DirectionState) -> Self {
        use DirectionState::*;
        match (forward, reverse) {
            (Missing, Missing) => ConnectionState::Absent,
            (Healthy, Healthy) => ConnectionState::HealthyConnected,
            _ => ConnectionState::Unhealthy,
        }
    }
}

/// Human readable health summary of one direction, for logs and failure messages.
pub fn describe(label: &str, peering: Option<&Peering>) -> String {
    match peering {
        None => format!("{label}: missing"),
        Some(p) => {
            let problems = violations(p);
            if problems.is_empty() {
                format!("{label}: healthy")
            } else {
                let problems: Vec<String> = problems.iter().map(|v| v.to_string()).collect();
                format!("{label} {}: {}", p.name, problems.join(", "))
            }
        }
    }
}
