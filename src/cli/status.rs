use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeSet;

use super::{source_label, HostArgs};
use crate::{desired_routes, gather_state, network_for_gateway, OverridePolicy};

pub(crate) fn run_status(args: HostArgs) -> Result<()> {
    let policy = args.policy()?;
    let host = args.host();

    let state = gather_state(policy, &host.leases, &host.ip, &host.ip, Utc::now())?;
    let plan = state.plan();

    println!("Override file: {}", args.override_file.display());
    println!("Lease directory: {}", host.leases.dir().display());
    print_policy(&state.policy);
    println!();

    match &state.resolved {
        Some(resolved) => println!(
            "Interface: {} ({})",
            resolved.name,
            source_label(resolved.source)
        ),
        None => println!("Interface: none"),
    }
    if !state.addresses.is_empty() {
        let addrs: Vec<String> = state.addresses.iter().map(|a| a.to_string()).collect();
        println!("Addresses: {}", addrs.join(", "));
    }
    match &state.lease {
        Some(lease) => {
            let expires = lease
                .expires
                .map_or("never".to_string(), |e| e.to_rfc3339());
            println!("Lease: active, expires {}", expires);
            if let Some(router) = lease.router {
                println!("Router: {}", router);
            }
        }
        None if state.resolved.is_some() => println!("Lease: none active"),
        None => {}
    }
    if let Some(err) = &state.decode_error {
        println!("Option 121: {}", err);
    }
    println!();

    let desired = desired_routes(&state.decoded, &state.policy.forced_routes);
    println!("Desired routes: {}", desired.len());
    for route in &desired {
        let note = match network_for_gateway(route.gateway, &state.addresses) {
            Some(net) => format!("gateway on {}", net),
            None if state.policy.gateway_check => "gateway unreachable".to_string(),
            None => "gateway check disabled".to_string(),
        };
        println!("  {} ({})", route, note);
    }

    println!("Installed routes (proto {}): {}", host.ip.proto(), state.live.len());
    for route in &state.live {
        println!("  {}", route);
    }

    if !plan.shadowed.is_empty() {
        println!("Shadowed routes: {}", plan.shadowed.len());
        for route in &plan.shadowed {
            println!("  {}", route);
        }
    }

    if !state.cleanup_nics.is_empty() {
        println!("Cleared interfaces: {}", join(&state.cleanup_nics));
    }
    println!("Pending changes: {}", plan.ops.len());
    Ok(())
}

fn print_policy(policy: &OverridePolicy) {
    println!(
        "  nic: {}",
        policy.nic.as_deref().unwrap_or("(default route)")
    );
    println!(
        "  gatewaycheck: {}",
        if policy.gateway_check { "on" } else { "off" }
    );
    if !policy.safe_nics.is_empty() {
        println!("  safe_nics: {}", join(&policy.safe_nics));
    }
    if !policy.force_nics.is_empty() {
        println!("  forcenics: {}", join(&policy.force_nics));
    }
    println!("  forced routes: {}", policy.forced_routes.len());
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
