use anyhow::{bail, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

use super::{CommandOutput, CommandRunner, NetworkState, OpOutcome, RoutingTable};
use crate::{is_managed_destination, LiveRoute, RouteEntry};

/// Route protocol number used to tag the routes we install
pub const DEFAULT_ROUTE_PROTO: u8 = 121;

/// Linux routing table and interface state through the `ip` program.
#[derive(Debug, Clone)]
pub struct Iproute2 {
    ip_bin: PathBuf,
    proto: u8,
    runner: CommandRunner,
}

impl Iproute2 {
    pub fn new(ip_bin: impl Into<PathBuf>, proto: u8, runner: CommandRunner) -> Self {
        Self {
            ip_bin: ip_bin.into(),
            proto,
            runner,
        }
    }

    pub fn proto(&self) -> u8 {
        self.proto
    }

    fn ip(&self, args: &[&str]) -> Result<CommandOutput> {
        self.runner.run(&self.ip_bin, args)
    }
}

impl NetworkState for Iproute2 {
    fn default_interface(&self) -> Result<Option<String>> {
        let output = self.ip(&["-4", "route", "show", "default"])?;
        if !output.success {
            bail!("ip route show default failed: {}", output.stderr.trim());
        }
        Ok(parse_default_interface(&output.stdout))
    }

    fn interface_addresses(&self, interface: &str) -> Result<Vec<Ipv4Net>> {
        let output = self.ip(&["-4", "-o", "addr", "show", "dev", interface])?;
        if !output.success {
            if output.stderr.contains("does not exist") {
                debug!(interface, "interface does not exist");
                return Ok(Vec::new());
            }
            bail!(
                "ip addr show dev {} failed: {}",
                interface,
                output.stderr.trim()
            );
        }
        Ok(parse_addresses(&output.stdout))
    }
}

impl RoutingTable for Iproute2 {
    fn list(&self) -> Result<Vec<LiveRoute>> {
        let proto = self.proto.to_string();
        let output = self.ip(&["-4", "route", "show", "proto", &proto])?;
        if !output.success {
            bail!("ip route show proto {} failed: {}", proto, output.stderr.trim());
        }
        Ok(parse_routes(&output.stdout))
    }

    fn foreign_route(&self, destination: Ipv4Net) -> Result<Option<String>> {
        let dest = destination.to_string();
        let output = self.ip(&["-4", "route", "show", "exact", &dest])?;
        if !output.success {
            bail!("ip route show exact {} failed: {}", dest, output.stderr.trim());
        }
        Ok(parse_foreign_route(&output.stdout, self.proto))
    }

    fn add(&self, route: &RouteEntry, interface: &str) -> Result<OpOutcome> {
        let destination = route.destination.to_string();
        let gateway = route.gateway.to_string();
        let proto = self.proto.to_string();
        let output = self.ip(&[
            "-4",
            "route",
            "add",
            &destination,
            "via",
            &gateway,
            "dev",
            interface,
            "proto",
            &proto,
        ])?;

        if output.success {
            return Ok(OpOutcome::Applied);
        }
        if output.stderr.contains("File exists") {
            return Ok(OpOutcome::NoOp);
        }
        bail!("{}", output.stderr.trim())
    }

    fn remove(&self, destination: Ipv4Net) -> Result<OpOutcome> {
        let destination = destination.to_string();
        let proto = self.proto.to_string();
        let output = self.ip(&["-4", "route", "del", &destination, "proto", &proto])?;

        if output.success {
            return Ok(OpOutcome::Applied);
        }
        if output.stderr.contains("No such process") {
            return Ok(OpOutcome::NoOp);
        }
        bail!("{}", output.stderr.trim())
    }
}

/// `default via 192.168.1.1 dev eth0 proto dhcp metric 100` -> `eth0`
fn parse_default_interface(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("default"))
        .find_map(|line| field_after(line, "dev"))
        .map(str::to_string)
}

/// `2: eth0    inet 192.168.1.10/24 brd 192.168.1.255 scope global eth0 ...`
fn parse_addresses(output: &str) -> Vec<Ipv4Net> {
    output
        .lines()
        .filter_map(|line| field_after(line, "inet"))
        .filter_map(|cidr| {
            // Point-to-point addresses carry no prefix
            if cidr.contains('/') {
                Ipv4Net::from_str(cidr).ok()
            } else {
                Ipv4Addr::from_str(cidr)
                    .ok()
                    .and_then(|ip| Ipv4Net::new(ip, 32).ok())
            }
        })
        .collect()
}

/// `10.0.1.0/24 via 192.168.1.254 dev eth0` lines. Routes without a gateway,
/// default routes and link-local destinations are skipped.
fn parse_routes(output: &str) -> Vec<LiveRoute> {
    let mut routes = Vec::new();

    for line in output.lines() {
        let Some(dest) = line.split_whitespace().next() else {
            continue;
        };
        let Some(destination) = parse_destination(dest) else {
            continue;
        };
        if !is_managed_destination(destination) {
            debug!(route = line, "ignoring unmanaged destination");
            continue;
        }

        let gateway = field_after(line, "via").and_then(|gw| Ipv4Addr::from_str(gw).ok());
        let interface = field_after(line, "dev");
        let (Some(gateway), Some(interface)) = (gateway, interface) else {
            debug!(route = line, "skipping route without gateway");
            continue;
        };

        routes.push(LiveRoute {
            destination,
            gateway,
            interface: interface.to_string(),
        });
    }

    routes
}

fn parse_destination(dest: &str) -> Option<Ipv4Net> {
    if dest == "default" {
        return Ipv4Net::new(Ipv4Addr::UNSPECIFIED, 0).ok();
    }
    if dest.contains('/') {
        return Ipv4Net::from_str(dest).ok();
    }
    Ipv4Addr::from_str(dest)
        .ok()
        .and_then(|ip| Ipv4Net::new(ip, 32).ok())
}

/// First line of `ip route show exact` output not tagged with `proto`.
/// Untagged lines carry no `proto` field (boot) or another protocol.
fn parse_foreign_route(output: &str, proto: u8) -> Option<String> {
    let proto = proto.to_string();
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| field_after(line, "proto") != Some(proto.as_str()))
        .map(str::to_string)
}

fn field_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace();
    tokens.by_ref().find(|token| *token == key)?;
    tokens.next()
}
