use anyhow::{bail, Result};
use chrono::Utc;

use super::{print_reconcile_stats, print_shadowed, HostArgs};
use crate::reconcile;

pub(crate) fn run_reconcile(args: HostArgs) -> Result<()> {
    let policy = args.policy()?;
    let host = args.host();

    let outcome = reconcile(policy, &host.leases, &host.ip, &host.ip, Utc::now())?;

    print_reconcile_stats(&outcome);
    print_shadowed(&outcome.plan.shadowed);

    if outcome.stats.permission_denied() {
        bail!(
            "every route operation was refused ({} failed): root permissions required",
            outcome.stats.failed()
        );
    }
    Ok(())
}
