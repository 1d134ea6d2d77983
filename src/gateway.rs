use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

/// Check whether a gateway is directly reachable from the interface.
///
/// The gateway must fall inside one of the interface's assigned networks
/// (address AND netmask equality). With `check` disabled every gateway passes.
pub fn gateway_reachable(gateway: Ipv4Addr, addresses: &[Ipv4Net], check: bool) -> bool {
    if !check {
        return true;
    }
    addresses.iter().any(|net| net.contains(&gateway))
}

/// Return the most specific interface network containing the gateway
pub fn network_for_gateway(gateway: Ipv4Addr, addresses: &[Ipv4Net]) -> Option<Ipv4Net> {
    addresses
        .iter()
        .filter(|net| net.contains(&gateway))
        .max_by_key(|net| net.prefix_len())
        .map(|net| net.trunc())
}
