use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Malformed option 121 data at byte {offset}: {reason}")]
    MalformedOption { offset: usize, reason: String },

    #[error("Override line {line}: {reason}")]
    ConfigParseWarning { line: usize, reason: String },

    #[error("Gateway {gateway} for {destination} is not reachable from interface {interface}")]
    GatewayUnreachable {
        destination: Ipv4Net,
        gateway: Ipv4Addr,
        interface: String,
    },

    #[error("Failed to {op} route {destination}: {reason}")]
    RouteOperationFailed {
        op: &'static str,
        destination: Ipv4Net,
        reason: String,
    },

    #[error("Failed to query {what}: {reason}")]
    StateQueryFailed { what: String, reason: String },
}

impl RouteError {
    pub(crate) fn state_query(what: impl Into<String>, err: &anyhow::Error) -> Self {
        RouteError::StateQueryFailed {
            what: what.into(),
            reason: format!("{:#}", err),
        }
    }

    /// The kernel refused a route change (EPERM), usually a missing root
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            RouteError::RouteOperationFailed { reason, .. }
                if reason.contains("Operation not permitted")
        )
    }
}
