// ABOUTME: Stage transition methods for a reconciliation pass.
// ABOUTME: Each method consumes the pass and returns the next stage on success.

use std::collections::BTreeSet;

use crate::diagnostics::{Diagnostics, Warning};
use crate::events::{Event, tag};
use crate::model::{Release, Swarm};
use crate::types::{Node, TraceId};

use super::cleanup::cleanup_stale;
use super::error::{Stage, collect_stage};
use super::pass::{Pass, PassReport};
use super::placement::{HostSlots, assign_slots, pick_removals, prioritized_hosts};
use super::primitives::{delete_routed, deploy, scaled};
use super::routing::reconcile_routing;
use super::state::{Cleaned, FleetView, Placed, Planned, Routed, Uptested};
use super::uptest::run_uptests;
use super::{FleetSnapshot, SwarmContext, SwarmError};

async fn observe(ctx: &SwarmContext, swarm: &Swarm, release: &Release) -> Result<FleetView, SwarmError> {
    let snapshot = FleetSnapshot::capture(ctx).await?;
    let (current, stale) = snapshot.partition(swarm, &release.hash);
    Ok(FleetView {
        snapshot,
        current,
        stale,
    })
}

impl<S> Pass<S> {
    fn advance<T>(self, next: impl FnOnce(S) -> T) -> Pass<T> {
        Pass {
            ctx: self.ctx,
            swarm: self.swarm,
            release: self.release,
            trace: self.trace,
            diagnostics: self.diagnostics,
            report: self.report,
            state: next(self.state),
        }
    }

    fn event(&self, message: impl Into<String>, tags: &[&str]) {
        self.ctx.publish(
            Event::new(self.swarm.id.as_str(), message)
                .tags(tags)
                .trace(&self.trace),
        );
    }
}

// =============================================================================
// Planned -> Placed
// =============================================================================

impl Pass<Planned> {
    /// Observe the fleet. Port locks older than the configured age are
    /// purged first so a crashed pass cannot block ports forever.
    pub async fn begin(
        ctx: SwarmContext,
        swarm: Swarm,
        release: Release,
        trace: TraceId,
    ) -> Result<Self, SwarmError> {
        let purged = ctx.port_locks.purge_stale(ctx.settings.port_lock_max_age);
        if purged > 0 {
            tracing::warn!(purged, "cleared stale port locks");
        }

        let view = observe(&ctx, &swarm, &release).await?;
        ctx.debug(
            swarm.id.as_str(),
            format!(
                "{} current, {} stale, target {}",
                view.current.len(),
                view.stale.len(),
                swarm.size
            ),
            &trace,
        );

        let report = PassReport::new(&swarm, &release, &trace);
        Ok(Pass {
            ctx,
            swarm,
            release,
            trace,
            diagnostics: Diagnostics::default(),
            report,
            state: Planned(view),
        })
    }

    /// Scale to the target count, then re-observe if anything changed.
    #[must_use = "pass state must be used"]
    pub async fn place(mut self) -> Result<Pass<Placed>, SwarmError> {
        let have = self.state.0.current.len();
        let want = self.swarm.size;

        if want > have {
            self.event(format!("scaling up by {}", want - have), &[tag::SWARM, tag::SCALE_UP]);
            self.report.deployed = self.scale_up(want - have).await?;
        } else if have > want {
            self.event(format!("scaling down by {}", have - want), &[tag::SWARM, tag::SCALE_DOWN]);
            self.report.removed = self.scale_down(have - want).await?;
        }

        let view = if want == have {
            None
        } else {
            Some(observe(&self.ctx, &self.swarm, &self.release).await?)
        };
        if let Some(view) = &view
            && view.current.len() != want
        {
            tracing::warn!(
                swarm = self.swarm.id.as_str(),
                found = view.current.len(),
                want,
                "fleet does not report the target count after placement"
            );
        }

        self.ctx.debug(self.swarm.id.as_str(), "placement done", &self.trace);
        Ok(self.advance(|Planned(old)| Placed(view.unwrap_or(old))))
    }

    /// Lock every new slot up front, then deploy one task per host. Ports
    /// on one host are deployed in order.
    async fn scale_up(&self, count: usize) -> Result<Vec<String>, SwarmError> {
        let snapshot = &self.state.0.snapshot;
        let hosts = prioritized_hosts(&snapshot.hosts, &snapshot.instances, &self.swarm);
        if hosts.is_empty() {
            return Err(SwarmError::NoHosts(self.swarm.id.clone()));
        }

        let slots = assign_slots(&hosts, &snapshot.instances, count, &self.ctx.port_locks)?;

        let handles: Vec<_> = slots
            .into_iter()
            .map(|slot| {
                let ctx = self.ctx.clone();
                let swarm = self.swarm.clone();
                let release = self.release.clone();
                let trace = self.trace.clone();
                let label = format!("deploy {}", slot.host.name);
                let timeout = scaled(self.ctx.settings.timeouts.deploy, slot.guards.len());

                self.ctx.scheduler.submit(label, timeout, async move {
                    let HostSlots { host, guards } = slot;
                    let mut placed = Vec::with_capacity(guards.len());
                    // Guards not yet reached are released if a deploy fails.
                    for guard in guards {
                        let instance = deploy(&ctx, &swarm, &release, &host, guard, &trace).await?;
                        placed.push(instance.name);
                    }
                    Ok(placed)
                })
            })
            .collect();

        let placed = collect_stage(Stage::Placement, self.ctx.scheduler.join_all(handles).await)?;
        Ok(placed.into_iter().flatten().collect())
    }

    /// Remove instances from the most loaded hosts first.
    async fn scale_down(&self, count: usize) -> Result<Vec<String>, SwarmError> {
        let view = &self.state.0;
        let mut hosts = prioritized_hosts(&view.snapshot.hosts, &view.snapshot.instances, &self.swarm);
        hosts.reverse();
        let victims = pick_removals(&hosts, &view.current, count);

        let handles: Vec<_> = victims
            .iter()
            .map(|instance| {
                let ctx = self.ctx.clone();
                let pool = self.swarm.pool.clone();
                let host = hosts
                    .iter()
                    .find(|h| h.name == instance.host)
                    .cloned()
                    .unwrap_or_else(|| crate::config::HostConfig::new(instance.host.clone()));
                let instance = instance.clone();
                let trace = self.trace.clone();

                self.ctx.scheduler.submit(
                    format!("delete {}", instance.name),
                    self.ctx.settings.timeouts.delete,
                    async move { delete_routed(&ctx, pool.as_ref(), &host, &instance, &trace).await },
                )
            })
            .collect();

        collect_stage(Stage::Placement, self.ctx.scheduler.join_all(handles).await)?;
        Ok(victims.into_iter().map(|i| i.name).collect())
    }
}

// =============================================================================
// Placed -> Uptested
// =============================================================================

impl Pass<Placed> {
    /// Check every instance running the release. Instances being replaced
    /// are never checked.
    #[must_use = "pass state must be used"]
    pub async fn uptest(mut self) -> Result<Pass<Uptested>, SwarmError> {
        let view = &self.state.0;
        let summary = run_uptests(&self.ctx, &view.snapshot.hosts, &view.current).await?;

        self.report.instances = view.current.len();
        self.report.checks = summary.checks();

        if summary.checks() == 0 {
            self.event("No uptests!", &[tag::UPTEST, tag::WARNING]);
            self.diagnostics.warn(Warning::no_uptests(format!(
                "{} defines no uptests",
                self.swarm.id
            )));
        } else {
            self.event(
                format!("Uptests passed ({} checks)", summary.checks()),
                &[tag::UPTEST],
            );
        }

        Ok(self.advance(|Placed(view)| Uptested(view)))
    }
}

// =============================================================================
// Uptested -> Routed
// =============================================================================

impl Pass<Uptested> {
    /// Point the pool at the checked instances. A balancer failure is a
    /// warning, but it leaves stale instances in place.
    #[must_use = "pass state must be used"]
    pub async fn route(mut self) -> Pass<Routed> {
        let Some(pool) = self.swarm.pool.clone() else {
            return self.advance(|Uptested(view)| Routed { view, routed: true });
        };

        let wanted: BTreeSet<Node> = self.state.0.current.iter().map(|i| i.node()).collect();
        let routed = match reconcile_routing(self.ctx.balancer.as_ref(), &pool, &wanted).await {
            Ok(change) => {
                let listed: Vec<String> = change.wanted.iter().map(Node::to_string).collect();
                self.event(
                    format!("pool {} routes to [{}]", pool.name, listed.join(", ")),
                    &[tag::ROUTE],
                );
                self.report.routing = Some(change);
                true
            }
            Err(e) => {
                self.event(
                    format!("routing pool {} failed: {}", pool.name, e),
                    &[tag::ROUTE, tag::FAILED],
                );
                self.diagnostics.warn(Warning::routing_failed(format!("pool {}: {}", pool.name, e)));
                false
            }
        };

        self.report.routed = routed;
        self.advance(|Uptested(view)| Routed { view, routed })
    }
}

// =============================================================================
// Routed -> Cleaned
// =============================================================================

impl Pass<Routed> {
    /// Remove stale instances. Never fails the pass.
    #[must_use = "pass state must be used"]
    pub async fn cleanup(mut self) -> Pass<Cleaned> {
        let Routed { view, routed } = &self.state;

        if view.stale.is_empty() {
            return self.advance(|Routed { view, .. }| Cleaned(view));
        }
        if !*routed {
            let message = format!("left {} stale instances, pool not updated", view.stale.len());
            self.diagnostics.warn(Warning::cleanup_skipped(message));
            return self.advance(|Routed { view, .. }| Cleaned(view));
        }
        if view.current.len() < self.swarm.size {
            let message = format!(
                "left {} stale instances, only {} of {} running",
                view.stale.len(),
                view.current.len(),
                self.swarm.size
            );
            self.diagnostics.warn(Warning::cleanup_skipped(message));
            return self.advance(|Routed { view, .. }| Cleaned(view));
        }

        let result = cleanup_stale(
            &self.ctx,
            self.swarm.pool.as_ref(),
            &view.snapshot,
            view.stale.clone(),
            &self.trace,
        )
        .await;

        for failure in &result.failed {
            let message = format!("{} on {}: {}", failure.instance, failure.host, failure.error);
            self.event(format!("cleanup failed: {message}"), &[tag::CLEANUP, tag::FAILED]);
            self.diagnostics.warn(Warning::cleanup_failed(message));
        }
        if !result.deleted.is_empty() {
            self.event(
                format!("removed {} stale instances", result.deleted.len()),
                &[tag::CLEANUP],
            );
        }

        self.report.cleanup = result;
        self.advance(|Routed { view, .. }| Cleaned(view))
    }
}

// =============================================================================
// Cleaned -> done
// =============================================================================

impl Pass<Cleaned> {
    pub fn finish(self) -> PassReport {
        self.event(format!("Swarm {} finished", self.swarm.id), &[tag::SWARM, tag::DONE]);
        let mut report = self.report;
        report.warnings = self.diagnostics.into_warnings();
        report
    }
}
