// ABOUTME: A reconciliation pass for one swarm, parameterized by its current stage.
// ABOUTME: The report summarizes what the pass changed and what it only warned about.

use serde::Serialize;

use crate::diagnostics::{Diagnostics, Warning};
use crate::model::{Release, Swarm};
use crate::types::{ReleaseId, SwarmId, TraceId};

use super::cleanup::CleanupResult;
use super::routing::RoutingChange;
use super::state::Planned;
use super::{SwarmContext, SwarmError};

/// A pass in progress. Stage methods consume it and return the next
/// stage, so routing cannot run before uptests have passed.
pub struct Pass<S> {
    pub(crate) ctx: SwarmContext,
    pub(crate) swarm: Swarm,
    pub(crate) release: Release,
    pub(crate) trace: TraceId,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) report: PassReport,
    pub(crate) state: S,
}

impl<S> Pass<S> {
    pub fn swarm(&self) -> &Swarm {
        &self.swarm
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn trace(&self) -> &TraceId {
        &self.trace
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}

/// What a successful pass did.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub swarm: SwarmId,
    pub release: ReleaseId,
    pub trace_id: TraceId,
    /// Instances placed by scale-up.
    pub deployed: Vec<String>,
    /// Instances removed by scale-down.
    pub removed: Vec<String>,
    /// Instances running the release when uptests ran.
    pub instances: usize,
    pub checks: usize,
    pub routing: Option<RoutingChange>,
    pub routed: bool,
    pub cleanup: CleanupResult,
    pub warnings: Vec<Warning>,
}

impl PassReport {
    pub(crate) fn new(swarm: &Swarm, release: &Release, trace: &TraceId) -> Self {
        Self {
            swarm: swarm.id.clone(),
            release: release.id.clone(),
            trace_id: trace.clone(),
            deployed: Vec::new(),
            removed: Vec::new(),
            instances: 0,
            checks: 0,
            routing: None,
            routed: false,
            cleanup: CleanupResult::default(),
            warnings: Vec::new(),
        }
    }

    /// True when the pass found the swarm already in its target state.
    pub fn is_noop(&self) -> bool {
        self.deployed.is_empty()
            && self.removed.is_empty()
            && self.cleanup.deleted.is_empty()
            && self.routing.as_ref().is_none_or(RoutingChange::is_noop)
    }
}

/// Drive one pass through every stage.
pub async fn run_pass(
    ctx: SwarmContext,
    swarm: Swarm,
    release: Release,
    trace: TraceId,
) -> Result<PassReport, SwarmError> {
    let report = Pass::<Planned>::begin(ctx, swarm, release, trace)
        .await?
        .place()
        .await?
        .uptest()
        .await?
        .route()
        .await
        .cleanup()
        .await
        .finish();
    Ok(report)
}
