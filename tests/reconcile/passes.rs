use super::fakes::*;
use chrono::Duration;
use dhcp121::{OverridePolicy, RemoveReason, RouteError, RouteOp};
use pretty_assertions::assert_eq;

#[test]
fn test_installs_advertised_routes() {
    let host = FakeHost::eth0(Some(TWO_ROUTES));

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.added, 2);
    assert_eq!(outcome.stats.failed(), 0);
    assert_eq!(
        host.table.snapshot(),
        vec![
            "10.0.1.0/24 via 192.168.1.254 dev eth0",
            "172.16.0.0/16 via 192.168.1.253 dev eth0",
        ]
    );
}

#[test]
fn test_second_pass_changes_nothing() {
    let host = FakeHost::eth0(Some(TWO_ROUTES));
    let policy = OverridePolicy {
        forced_routes: vec![route("10.50.0.0/16", "192.168.1.1")],
        ..Default::default()
    };

    host.run(&policy).unwrap();
    let after_first = host.table.snapshot();
    let mutations = host.table.mutation_count();

    let second = host.run(&policy).unwrap();
    assert_eq!(second.stats.changes(), 0);
    assert_eq!(second.stats.unchanged, 3);
    assert!(second.plan.is_empty());
    assert_eq!(host.table.snapshot(), after_first);
    assert_eq!(host.table.mutation_count(), mutations);
}

#[test]
fn test_changed_gateway_is_replaced() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.table = FakeTable::with_routes(vec![
        live("10.0.1.0/24", "192.168.1.200", "eth0"),
        live("172.16.0.0/16", "192.168.1.253", "eth0"),
    ]);

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.replaced, 1);
    assert_eq!(outcome.stats.unchanged, 1);
    assert_eq!(outcome.stats.added, 0);
    assert_eq!(
        host.table.snapshot(),
        vec![
            "10.0.1.0/24 via 192.168.1.254 dev eth0",
            "172.16.0.0/16 via 192.168.1.253 dev eth0",
        ]
    );
}

#[test]
fn test_withdrawn_route_is_removed() {
    let mut host = FakeHost::eth0(Some(&[24, 10, 0, 1, 192, 168, 1, 254]));
    host.table = FakeTable::with_routes(vec![live("10.9.0.0/16", "192.168.1.1", "eth0")]);

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.removed, 1);
    assert!(outcome.plan.ops.contains(&RouteOp::Remove {
        old: live("10.9.0.0/16", "192.168.1.1", "eth0"),
        reason: RemoveReason::NotAdvertised,
    }));
    assert_eq!(
        host.table.snapshot(),
        vec!["10.0.1.0/24 via 192.168.1.254 dev eth0"]
    );
}

#[test]
fn test_removals_run_before_additions() {
    let mut host = FakeHost::eth0(Some(&[24, 10, 0, 1, 192, 168, 1, 254]));
    host.table = FakeTable::with_routes(vec![live("10.9.0.0/16", "192.168.1.1", "eth0")]);

    host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(
        *host.table.mutations.borrow(),
        vec![
            "del 10.9.0.0/16".to_string(),
            "add 10.0.1.0/24 via 192.168.1.254 dev eth0".to_string(),
        ]
    );
}

#[test]
fn test_forced_route_wins_over_advertised() {
    let host = FakeHost::eth0(Some(TWO_ROUTES));
    let policy = OverridePolicy {
        forced_routes: vec![route("10.0.1.0/24", "192.168.1.5")],
        ..Default::default()
    };

    host.run(&policy).unwrap();

    assert_eq!(
        host.table.snapshot(),
        vec![
            "10.0.1.0/24 via 192.168.1.5 dev eth0",
            "172.16.0.0/16 via 192.168.1.253 dev eth0",
        ]
    );
}

#[test]
fn test_pinned_interface_beats_default_route() {
    let mut host = FakeHost::eth0(None);
    host.leases.leases.insert(
        "eth1".to_string(),
        lease("eth1", Some(&[8, 10, 10, 0, 0, 254])),
    );
    host.network
        .addresses
        .insert("eth1".to_string(), vec![net("10.0.0.5/24")]);
    let policy = OverridePolicy {
        nic: Some("eth1".to_string()),
        ..Default::default()
    };

    let outcome = host.run(&policy).unwrap();

    let resolved = outcome.state.resolved.expect("resolved interface");
    assert_eq!(resolved.name, "eth1");
    assert_eq!(host.table.snapshot(), vec!["10.0.0.0/8 via 10.0.0.254 dev eth1"]);
}

#[test]
fn test_unreachable_gateway_is_rejected() {
    // 10.0.1.0/24 via 10.99.0.1, outside 192.168.1.0/24
    let host = FakeHost::eth0(Some(&[24, 10, 0, 1, 10, 99, 0, 1]));

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.rejected, 1);
    assert_eq!(outcome.stats.added, 0);
    assert!(matches!(
        outcome.plan.rejected.as_slice(),
        [RouteError::GatewayUnreachable { interface, .. }] if interface == "eth0"
    ));
    assert!(host.table.snapshot().is_empty());
}

#[test]
fn test_gateway_check_disabled_installs_anyway() {
    let host = FakeHost::eth0(Some(&[24, 10, 0, 1, 10, 99, 0, 1]));
    let policy = OverridePolicy {
        gateway_check: false,
        ..Default::default()
    };

    let outcome = host.run(&policy).unwrap();

    assert_eq!(outcome.stats.rejected, 0);
    assert_eq!(host.table.snapshot(), vec!["10.0.1.0/24 via 10.99.0.1 dev eth0"]);
}

#[test]
fn test_malformed_option_still_applies_forced_routes() {
    // Width 24 announces three destination bytes but the data stops after two
    let host = FakeHost::eth0(Some(&[24, 10, 0]));
    let policy = OverridePolicy {
        forced_routes: vec![route("10.50.0.0/16", "192.168.1.1")],
        ..Default::default()
    };

    let outcome = host.run(&policy).unwrap();

    assert!(matches!(
        outcome.state.decode_error,
        Some(RouteError::MalformedOption { .. })
    ));
    assert!(outcome.state.decoded.is_empty());
    assert_eq!(host.table.snapshot(), vec!["10.50.0.0/16 via 192.168.1.1 dev eth0"]);
}

#[test]
fn test_failed_operation_does_not_stop_the_pass() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.table.fail_add.insert(net("10.0.1.0/24"));

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.failed(), 1);
    assert!(!outcome.stats.permission_denied());
    assert_eq!(outcome.stats.added, 1);
    assert_eq!(
        host.table.snapshot(),
        vec!["172.16.0.0/16 via 192.168.1.253 dev eth0"]
    );
}

#[test]
fn test_default_route_entry_is_left_alone() {
    let host = FakeHost::eth0(Some(&[0, 192, 168, 1, 1, 24, 10, 0, 1, 192, 168, 1, 254]));

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.added, 1);
    assert_eq!(
        host.table.snapshot(),
        vec!["10.0.1.0/24 via 192.168.1.254 dev eth0"]
    );
}

#[test]
fn test_expired_lease_withdraws_routes() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.run(&OverridePolicy::default()).unwrap();
    assert_eq!(host.table.snapshot().len(), 2);

    if let Some(lease) = host.leases.leases.get_mut("eth0") {
        lease.expires = Some(now() - Duration::hours(1));
    }
    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert!(outcome.state.lease.is_none());
    assert_eq!(outcome.stats.removed, 2);
    assert!(host.table.snapshot().is_empty());
}

#[test]
fn test_no_interface_resolved_leaves_table_alone() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.network.default = None;
    host.table = FakeTable::with_routes(vec![live("10.0.1.0/24", "192.168.1.254", "eth0")]);

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert!(outcome.state.resolved.is_none());
    assert!(outcome.plan.is_empty());
    assert_eq!(host.table.mutation_count(), 0);
}

#[test]
fn test_state_query_failure_aborts_before_any_mutation() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.network.fail = true;

    let err = host.run(&OverridePolicy::default()).unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RouteError>(),
        Some(RouteError::StateQueryFailed { what, .. }) if what == "default route"
    ));
    assert_eq!(host.table.mutation_count(), 0);
}

#[test]
fn test_unreadable_table_aborts_the_pass() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.table.fail_list = true;

    let err = host.run(&OverridePolicy::default()).unwrap_err();

    assert!(err.to_string().contains("routing table"));
    assert_eq!(host.table.mutation_count(), 0);
}

#[test]
fn test_untagged_route_shadows_advertised_route() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.table.foreign.insert(
        net("10.0.1.0/24"),
        "10.0.1.0/24 via 192.168.1.1 dev eth0 proto dhcp metric 100".to_string(),
    );

    let first = host.run(&OverridePolicy::default()).unwrap();
    assert_eq!(first.stats.added, 1);
    assert_eq!(first.stats.shadowed, 1);
    assert_eq!(first.stats.unchanged, 0);
    assert_eq!(first.plan.shadowed[0].route, route("10.0.1.0/24", "192.168.1.254"));

    // Not retried as a pending add on the next pass
    let mutations = host.table.mutation_count();
    let second = host.run(&OverridePolicy::default()).unwrap();
    assert!(second.plan.is_empty());
    assert_eq!(second.stats.shadowed, 1);
    assert_eq!(host.table.mutation_count(), mutations);
}

#[test]
fn test_refused_mutations_are_reported_as_permission_denied() {
    let mut host = FakeHost::eth0(Some(TWO_ROUTES));
    host.table = FakeTable {
        routes: std::cell::RefCell::new(vec![live("10.9.0.0/16", "192.168.1.1", "eth0")]),
        read_only: true,
        ..Default::default()
    };

    let outcome = host.run(&OverridePolicy::default()).unwrap();

    assert_eq!(outcome.stats.failed(), 3);
    assert_eq!(outcome.stats.changes(), 0);
    assert!(outcome.stats.permission_denied());
    assert!(outcome
        .stats
        .failures
        .iter()
        .all(|e| matches!(e, RouteError::RouteOperationFailed { .. })));
}
