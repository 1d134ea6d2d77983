use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::io;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use super::LeaseSource;
use crate::option121::parse_hex_bytes;
use crate::LeaseRecord;

pub const DEFAULT_LEASE_DIR: &str = "/var/lib/dhcp";

/// Lease source backed by ISC dhclient lease files.
///
/// Every `*.lease` / `*.leases` file in the directory is scanned, which covers
/// both `dhclient.<iface>.leases` and NetworkManager's per-connection files.
#[derive(Debug, Clone)]
pub struct DhclientLeases {
    dir: PathBuf,
}

impl DhclientLeases {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lease_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "lease directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read lease directory: {}", self.dir.display())
                })
            }
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("Failed to read lease directory: {}", self.dir.display()))?
                .path();
            let is_lease = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "lease" || ext == "leases");
            if is_lease && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl LeaseSource for DhclientLeases {
    fn lease(&self, interface: &str) -> Result<Option<LeaseRecord>> {
        let mut candidates = Vec::new();
        for path in self.lease_files()? {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read lease file: {}", path.display()))?;
            candidates.extend(
                parse_dhclient_leases(&text)
                    .into_iter()
                    .filter(|lease| lease.interface == interface),
            );
        }

        // Latest expiry wins; among equals the last one written wins
        Ok(candidates.into_iter().max_by_key(|lease| {
            lease
                .expires
                .map_or(i64::MAX, |expires| expires.timestamp())
        }))
    }
}

/// Parse every `lease { ... }` block in a dhclient lease file.
///
/// Blocks without an `interface` statement are dropped. Option 121 is read
/// from `rfc3442-classless-static-routes` (decimal bytes) or `unknown-121`
/// (hex bytes), whichever the client's configuration declared.
pub fn parse_dhclient_leases(text: &str) -> Vec<LeaseRecord> {
    let mut leases = Vec::new();
    let mut current: Option<LeaseRecord> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with("lease") && line.ends_with('{') {
            current = Some(LeaseRecord {
                interface: String::new(),
                option_121: None,
                router: None,
                expires: None,
            });
            continue;
        }

        let Some(lease) = current.as_mut() else {
            continue;
        };

        if line == "}" {
            if let Some(lease) = current.take() {
                if lease.interface.is_empty() {
                    debug!("skipping lease block without interface");
                } else {
                    leases.push(lease);
                }
            }
            continue;
        }

        let statement = line.trim_end_matches(';').trim();
        let mut parts = statement.splitn(2, char::is_whitespace);
        let keyword = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match keyword {
            "interface" => {
                lease.interface = rest.trim_matches('"').to_string();
            }
            "expire" => {
                lease.expires = parse_expiry(rest);
            }
            "option" => {
                let mut parts = rest.splitn(2, char::is_whitespace);
                let name = parts.next().unwrap_or_default();
                let value = parts.next().unwrap_or_default().trim();
                match name {
                    "routers" => {
                        lease.router = value
                            .split(',')
                            .next()
                            .and_then(|ip| Ipv4Addr::from_str(ip.trim()).ok());
                    }
                    "rfc3442-classless-static-routes" => {
                        lease.option_121 = parse_decimal_bytes(value);
                    }
                    "unknown-121" => {
                        lease.option_121 = parse_hex_bytes(value.trim_matches('"')).ok();
                    }
                    _ => {}
                }
                if matches!(name, "rfc3442-classless-static-routes" | "unknown-121")
                    && lease.option_121.is_none()
                {
                    warn!(option = name, value, "unreadable option 121 value in lease file");
                }
            }
            _ => {}
        }
    }

    leases
}

fn parse_decimal_bytes(value: &str) -> Option<Vec<u8>> {
    value
        .split(',')
        .map(|byte| byte.trim().parse::<u8>().ok())
        .collect()
}

/// `4 2026/10/22 16:12:06` (UTC), `epoch 1792771926` or `never`.
/// `None` means the lease never expires.
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = value.split_whitespace().collect();
    match fields.as_slice() {
        ["never"] => None,
        ["epoch", secs, ..] => secs
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        [_weekday, date, time, ..] => {
            let stamp = format!("{} {}", date, time);
            match NaiveDateTime::parse_from_str(&stamp, "%Y/%m/%d %H:%M:%S") {
                Ok(naive) => Some(Utc.from_utc_datetime(&naive)),
                Err(_) => {
                    warn!(value, "unreadable lease expiry, treating as expired");
                    Some(DateTime::<Utc>::MIN_UTC)
                }
            }
        }
        _ => {
            warn!(value, "unreadable lease expiry, treating as expired");
            Some(DateTime::<Utc>::MIN_UTC)
        }
    }
}
