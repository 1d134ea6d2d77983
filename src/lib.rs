pub mod cli;
mod errors;
pub mod gateway;
pub mod option121;
mod overrides;
pub mod reconcile;
mod resolve;
pub mod system;
mod types;

pub use errors::RouteError;
pub use gateway::{gateway_reachable, network_for_gateway};
pub use option121::{decode_option_121, parse_hex_bytes, parse_packet_dump_option};
pub use overrides::{load_override, parse_override, ParsedOverride, DEFAULT_OVERRIDE_PATH};
pub use reconcile::{
    apply_plan, cleanup_interfaces, desired_routes, gather_state, plan_reconcile, reconcile,
    HostState, PlanInput, ReconcileOutcome, ReconcilePlan, RemoveReason, RouteOp, ShadowedRoute,
};
pub use resolve::resolve_interface;
pub use types::{
    is_managed_destination, InterfaceSource, LeaseRecord, LiveRoute, OverridePolicy,
    ReconcileStats, ResolvedInterface, RouteEntry,
};
