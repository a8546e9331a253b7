// ABOUTME: Swarm reconciliation using the type state pattern.
// ABOUTME: Exports the controller, pass stages, and the collaborators' shared context.

mod build;
mod cleanup;
mod context;
mod controller;
mod error;
mod fleet;
mod pass;
mod placement;
mod primitives;
mod routing;
mod state;
mod sweep;
mod transitions;
mod uptest;

pub use cleanup::{CleanupFailure, CleanupResult, cleanup_stale};
pub use context::{ReconcileSettings, SwarmContext};
pub use controller::{Accepted, Controller, SwarmStatus};
pub use error::{Stage, SwarmError, SwarmErrorKind, TaskFailure, collect_stage};
pub use fleet::FleetSnapshot;
pub use pass::{Pass, PassReport, run_pass};
pub use placement::{HostSlots, assign_slots, next_free_port, pick_removals, prioritized_hosts};
pub use primitives::{delete, delete_routed, deploy};
pub use routing::{RoutingChange, diff, reconcile_routing};
pub use state::{Cleaned, FleetView, Placed, Planned, Routed, Uptested};
pub use sweep::uptest_all;
pub use uptest::{UptestSummary, check_instances, run_uptests};
