use anyhow::{anyhow, Result};
use chrono::Utc;
use std::io::{self, Write};

use super::{print_shadowed, HostArgs};
use crate::{gather_state, LiveRoute};

pub(crate) fn run_plan(args: HostArgs, quiet: bool) -> Result<()> {
    let policy = args.policy()?;
    let host = args.host();

    let state = gather_state(policy, &host.leases, &host.ip, &host.ip, Utc::now())?;
    let plan = state.plan();

    if plan.is_empty() {
        if !quiet {
            println!("No changes.");
            print_shadowed(&plan.shadowed);
        }
        return Ok(());
    }

    if !quiet {
        let mut installed = state.live.clone();
        installed.sort_by(|a, b| a.destination.cmp(&b.destination));
        let before = render_table(&installed);
        let after = render_table(&plan.projected(&state.live));

        let diff = similar::TextDiff::from_lines(&before, &after);
        let mut out = io::stdout().lock();
        let unified = diff
            .unified_diff()
            .context_radius(3)
            .header("installed", "planned")
            .to_string();
        write!(out, "{}", unified)?;
        drop(out);
        print_shadowed(&plan.shadowed);
    }

    Err(anyhow!("plan: {} route change(s) pending", plan.ops.len()))
}

fn render_table(routes: &[LiveRoute]) -> String {
    let mut out = String::new();
    for route in routes {
        out.push_str(&route.to_string());
        out.push('\n');
    }
    out
}
