// ABOUTME: Entry points for reconciliation: trigger a swarm, sweep uptests, report status.
// ABOUTME: Triggering returns at once; the pass runs in the background and reports through events.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::events::{Event, tag};
use crate::model::{Build, Instance, Release, Swarm, TestRun};
use crate::store::{BuildClaim, WaitList};
use crate::types::{SwarmId, TraceId};

use super::build::Waiter;
use super::pass::{PassReport, run_pass};
use super::sweep;
use super::{FleetSnapshot, SwarmContext, SwarmError, SwarmErrorKind};

/// Drives passes for every swarm sharing one context.
pub struct Controller {
    pub(crate) ctx: SwarmContext,
    pub(crate) waiters: WaitList<Waiter>,
}

/// Handed back by [`Controller::trigger_swarm`] before any work happens.
#[derive(Debug)]
pub struct Accepted {
    pub trace_id: TraceId,
    handle: JoinHandle<Result<PassReport, SwarmError>>,
}

impl Accepted {
    /// Wait for the pass. Callers that only need "accepted" can drop this.
    pub async fn outcome(self) -> Result<PassReport, SwarmError> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(SwarmError::TaskPanicked {
                label: format!("pass {}", self.trace_id.as_str()),
                message: err.to_string(),
            }),
        }
    }
}

/// What the fleet runs for one swarm right now.
#[derive(Debug, Clone)]
pub struct SwarmStatus {
    pub swarm: Swarm,
    pub release: Option<Release>,
    pub instances: Vec<Instance>,
}

impl SwarmStatus {
    /// Instances running the swarm's current release.
    pub fn current(&self) -> usize {
        match &self.release {
            Some(release) => self.instances.iter().filter(|i| i.runs(&release.hash)).count(),
            None => 0,
        }
    }
}

fn stage_tag(kind: SwarmErrorKind) -> &'static str {
    match kind {
        SwarmErrorKind::Build => tag::BUILD,
        SwarmErrorKind::Placement => tag::DEPLOY,
        SwarmErrorKind::Uptest => tag::UPTEST,
        SwarmErrorKind::Routing => tag::ROUTE,
        SwarmErrorKind::Config
        | SwarmErrorKind::Timeout
        | SwarmErrorKind::Store
        | SwarmErrorKind::Internal => tag::SWARM,
    }
}

impl Controller {
    pub fn new(ctx: SwarmContext) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            waiters: WaitList::new(),
        })
    }

    pub fn context(&self) -> &SwarmContext {
        &self.ctx
    }

    /// Start a pass in the background. A trace id is generated when the
    /// caller does not supply one.
    pub fn trigger_swarm(self: &Arc<Self>, id: SwarmId, trace: Option<TraceId>) -> Accepted {
        let trace_id = trace.unwrap_or_else(|| TraceId::generate(&id));
        tracing::info!(swarm = id.as_str(), trace = trace_id.as_str(), "swarm triggered");

        let controller = Arc::clone(self);
        let trace = trace_id.clone();
        let handle = tokio::spawn(async move { controller.reconcile(&id, &trace).await });

        Accepted { trace_id, handle }
    }

    /// Run one pass to completion, publishing a failure event if it aborts.
    pub async fn reconcile(self: &Arc<Self>, id: &SwarmId, trace: &TraceId) -> Result<PassReport, SwarmError> {
        self.ctx.debug(id.as_str(), "pass started", trace);
        let result = self.start(id, trace).await;

        if let Err(e) = &result {
            tracing::error!(swarm = id.as_str(), trace = trace.as_str(), kind = ?e.kind(), "pass aborted: {}", e);
            self.ctx.publish(
                Event::new(id.as_str(), e.to_string())
                    .tags(&[tag::SWARM, stage_tag(e.kind()), tag::FAILED])
                    .trace(trace),
            );
        }
        result
    }

    async fn start(self: &Arc<Self>, id: &SwarmId, trace: &TraceId) -> Result<PassReport, SwarmError> {
        let swarm = self.ctx.store.get_swarm(id).await?;
        let key = swarm.build_key();

        match self.ctx.store.claim_build(&key).await? {
            BuildClaim::Usable(build) => self.release_and_run(id, build, trace.clone()).await,
            BuildClaim::InProgress { attempt } => self.wait_for_build(id, &key, attempt, trace).await,
            BuildClaim::Claimed(build) => {
                let attempt = build.attempt;
                tokio::spawn(Arc::clone(self).run_build(build));
                self.wait_for_build(id, &key, attempt, trace).await
            }
        }
    }

    /// Resolve the swarm's release against `build` and run a pass for it.
    pub(crate) async fn release_and_run(
        &self,
        id: &SwarmId,
        build: Build,
        trace: TraceId,
    ) -> Result<PassReport, SwarmError> {
        let mut swarm = self.ctx.store.get_swarm(id).await?;
        let config = swarm.release_config().map_err(|e| SwarmError::ReleaseConfig {
            swarm: id.clone(),
            reason: e.to_string(),
        })?;
        let release = self.ctx.store.ensure_release(Release::assemble(&build, config)?).await?;

        if swarm.release.as_ref() != Some(&release.id) {
            swarm.release = Some(release.id.clone());
            self.ctx.store.save_swarm(swarm.clone()).await?;
        }
        self.ctx.debug(id.as_str(), format!("release {}", release.id), &trace);

        run_pass(self.ctx.clone(), swarm, release, trace).await
    }

    /// Check every instance in the fleet and store the run.
    pub async fn uptest_all(&self) -> Result<TestRun, SwarmError> {
        sweep::uptest_all(&self.ctx).await
    }

    pub async fn status(&self, id: &SwarmId) -> Result<SwarmStatus, SwarmError> {
        let swarm = self.ctx.store.get_swarm(id).await?;
        let release = match &swarm.release {
            Some(release) => Some(self.ctx.store.get_release(release).await?),
            None => None,
        };
        let snapshot = FleetSnapshot::capture(&self.ctx).await?;
        let instances = snapshot.owned(&swarm).cloned().collect();

        Ok(SwarmStatus {
            swarm,
            release,
            instances,
        })
    }
}
