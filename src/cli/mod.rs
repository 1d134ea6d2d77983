use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::system::{
    CommandRunner, DhclientLeases, Iproute2, DEFAULT_LEASE_DIR, DEFAULT_ROUTE_PROTO,
};
use crate::{
    load_override, OverridePolicy, ReconcileOutcome, ShadowedRoute, DEFAULT_OVERRIDE_PATH,
};

mod decode;
mod plan;
mod reconcile;
mod status;

/// Where host state is read from, shared by every command that touches the host
#[derive(Args, Clone, Debug)]
pub(crate) struct HostArgs {
    /// Operator override file (absent file means default policy)
    #[arg(long, env = "DHCP121_OVERRIDE", default_value = DEFAULT_OVERRIDE_PATH)]
    pub(crate) override_file: PathBuf,

    /// Directory holding dhclient lease files
    #[arg(long, env = "DHCP121_LEASE_DIR", default_value = DEFAULT_LEASE_DIR)]
    pub(crate) lease_dir: PathBuf,

    /// Path of the iproute2 `ip` program
    #[arg(long, env = "DHCP121_IP_BIN", default_value = "ip")]
    pub(crate) ip_bin: PathBuf,

    /// Route protocol number tagging the routes this tool installs
    #[arg(long, default_value_t = DEFAULT_ROUTE_PROTO, value_parser = clap::value_parser!(u8).range(1..))]
    pub(crate) proto: u8,

    /// Seconds before an external command is treated as hung
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub(crate) timeout_secs: u64,
}

pub(crate) struct Host {
    pub(crate) leases: DhclientLeases,
    pub(crate) ip: Iproute2,
}

impl HostArgs {
    pub(crate) fn host(&self) -> Host {
        let runner = CommandRunner::new(Duration::from_secs(self.timeout_secs));
        Host {
            leases: DhclientLeases::new(&self.lease_dir),
            ip: Iproute2::new(&self.ip_bin, self.proto, runner),
        }
    }

    pub(crate) fn policy(&self) -> Result<OverridePolicy> {
        Ok(load_override(&self.override_file)?.policy)
    }
}

#[derive(Parser)]
#[command(
    name = "dhcp121",
    version,
    about = "Install DHCP option 121 (RFC 3442) static routes into the kernel routing table",
    long_about = "Meant to run on every interface change. Each run converges the routes tagged \
                  by this tool toward the current lease and override file.",
    after_help = "Examples:\n  dhcp121 reconcile\n  dhcp121 plan --override-file ./dhcp_121_override\n  dhcp121 decode --hex 18:0a:00:01:c0:a8:01:fe\n\nRun 'dhcp121 <command> --help' to see all flags."
)]
struct Cli {
    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the routing table with the current lease and override file
    Reconcile {
        #[command(flatten)]
        host: HostArgs,
    },

    /// Show the route changes a reconcile would make (no routes touched)
    Plan {
        #[command(flatten)]
        host: HostArgs,

        /// Suppress diff output (exit code still indicates pending changes)
        #[arg(long)]
        quiet: bool,
    },

    /// Show the policy, resolved interface, lease routes and installed routes
    Status {
        #[command(flatten)]
        host: HostArgs,
    },

    /// Decode an option 121 payload
    Decode {
        /// Payload as hex text, e.g. 18:0a:00:01:c0:a8:01:fe
        #[arg(long, conflicts_with = "dump", required_unless_present = "dump")]
        hex: Option<String>,

        /// File holding `ipconfig getpacket` output
        #[arg(long)]
        dump: Option<PathBuf>,
    },
}

pub fn run_with_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Reconcile { host } => reconcile::run_reconcile(host),
        Commands::Plan { host, quiet } => plan::run_plan(host, quiet),
        Commands::Status { host } => status::run_status(host),
        Commands::Decode { hex, dump } => decode::run_decode(hex, dump),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Already installed when run more than once in-process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub(crate) fn describe_interface(outcome: &ReconcileOutcome) -> String {
    match &outcome.state.resolved {
        Some(resolved) => format!("{} ({})", resolved.name, source_label(resolved.source)),
        None => "none".to_string(),
    }
}

pub(crate) fn source_label(source: crate::InterfaceSource) -> &'static str {
    match source {
        crate::InterfaceSource::Pinned => "pinned by override",
        crate::InterfaceSource::DefaultRoute => "default route",
    }
}

pub(crate) fn print_reconcile_stats(outcome: &ReconcileOutcome) {
    let stats = &outcome.stats;
    println!("Interface: {}", describe_interface(outcome));
    println!("Routes added: {}", stats.added);
    println!("Routes replaced: {}", stats.replaced);
    println!("Routes removed: {}", stats.removed);
    println!("Routes unchanged: {}", stats.unchanged);
    if stats.rejected > 0 {
        println!("Routes rejected (gateway unreachable): {}", stats.rejected);
    }
    if stats.shadowed > 0 {
        println!("Routes shadowed by untagged routes: {}", stats.shadowed);
    }
    if stats.failed() > 0 {
        println!("Route operations failed: {}", stats.failed());
    }
}

pub(crate) fn print_shadowed(shadowed: &[ShadowedRoute]) {
    if shadowed.is_empty() {
        return;
    }
    println!("Blocked by routes from another source:");
    for route in shadowed {
        println!("  {}", route);
    }
}
