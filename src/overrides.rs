use anyhow::Result;
use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::io;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::{OverridePolicy, RouteEntry, RouteError};

/// Default location of the operator override file
pub const DEFAULT_OVERRIDE_PATH: &str = "/usr/local/etc/dhcp_121_override";

/// Result of parsing an override file: the policy plus every skipped line.
#[derive(Debug, Clone, Default)]
pub struct ParsedOverride {
    pub policy: OverridePolicy,
    pub warnings: Vec<RouteError>,
}

/// Read and parse the override file. A missing file yields the default policy.
pub fn load_override(path: &Path) -> Result<ParsedOverride> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no override file, using default policy");
            return Ok(ParsedOverride::default());
        }
        Err(e) => {
            return Err(RouteError::StateQueryFailed {
                what: format!("override file {}", path.display()),
                reason: e.to_string(),
            }
            .into());
        }
    };

    info!(path = %path.display(), "found override file");
    let parsed = parse_override(&text);
    for warning in &parsed.warnings {
        warn!(path = %path.display(), "{}", warning);
    }

    Ok(parsed)
}

/// Parse override text. Bad lines are skipped and reported, never fatal.
pub fn parse_override(text: &str) -> ParsedOverride {
    let mut parsed = ParsedOverride::default();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            parsed.warnings.push(warning(line_no, "expected 'key = value'"));
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = unquote(value.trim());

        match key.as_str() {
            "nic" => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    parsed
                        .warnings
                        .push(warning(line_no, format!("invalid interface name '{}'", value)));
                    continue;
                }
                parsed.policy.nic = Some(value.to_string());
            }
            "gatewaycheck" => {
                parsed.policy.gateway_check = value != "0";
            }
            "safe_nics" => {
                parsed.policy.safe_nics = nic_set(value);
            }
            "forcenics" | "force_nics" => {
                parsed.policy.force_nics = nic_set(value);
            }
            "staticroutes" | "forceroutes" => {
                parse_routes(value, line_no, &mut parsed);
            }
            other => {
                debug!(line = line_no, key = other, "ignoring unknown override key");
            }
        }
    }

    parsed
}

fn warning(line: usize, reason: impl Into<String>) -> RouteError {
    RouteError::ConfigParseWarning {
        line,
        reason: reason.into(),
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    value
}

fn nic_set(value: &str) -> BTreeSet<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// `CIDR gateway` pairs separated by `;`, the final separator optional.
fn parse_routes(value: &str, line_no: usize, parsed: &mut ParsedOverride) {
    for entry in value.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let fields: Vec<&str> = entry.split_whitespace().collect();
        let [cidr, gateway] = fields.as_slice() else {
            parsed.warnings.push(warning(
                line_no,
                format!("expected 'CIDR gateway' in route '{}'", entry),
            ));
            continue;
        };

        let destination = match Ipv4Net::from_str(cidr) {
            Ok(net) => net,
            Err(_) => {
                parsed
                    .warnings
                    .push(warning(line_no, format!("invalid CIDR '{}'", cidr)));
                continue;
            }
        };
        let gateway = match Ipv4Addr::from_str(gateway) {
            Ok(ip) => ip,
            Err(_) => {
                parsed
                    .warnings
                    .push(warning(line_no, format!("invalid gateway '{}'", gateway)));
                continue;
            }
        };

        parsed
            .policy
            .forced_routes
            .push(RouteEntry::new(destination, gateway));
    }
}
