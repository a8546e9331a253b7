// ABOUTME: Pass state marker types for the type state pattern.
// ABOUTME: Each state carries the fleet view that the next stage needs.

use crate::model::Instance;

use super::FleetSnapshot;

/// The fleet as seen at some point in a pass, split for one swarm.
#[derive(Debug, Clone, Default)]
pub struct FleetView {
    pub snapshot: FleetSnapshot,
    /// Instances running the swarm's release.
    pub current: Vec<Instance>,
    /// Instances of the swarm running anything else.
    pub stale: Vec<Instance>,
}

/// Fleet captured, nothing changed yet.
/// Available actions: `place()`
#[derive(Debug)]
pub struct Planned(pub(crate) FleetView);

/// Placement finished and the view was re-observed. The count may still
/// be short if a host changed underneath; `place()` warns when it is.
/// Available actions: `uptest()`
#[derive(Debug)]
pub struct Placed(pub(crate) FleetView);

/// Every current instance passed its checks.
/// Available actions: `route()`
#[derive(Debug)]
pub struct Uptested(pub(crate) FleetView);

/// Pool reconciled, or left alone after a balancer failure.
/// Available actions: `cleanup()`
#[derive(Debug)]
pub struct Routed {
    pub(crate) view: FleetView,
    pub(crate) routed: bool,
}

/// Stale instances handled.
/// Available actions: `finish()`
#[derive(Debug)]
pub struct Cleaned(pub(crate) FleetView);
