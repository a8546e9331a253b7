// ABOUTME: Build coordination: one build per (app, version), many waiting swarms.
// ABOUTME: Whoever claims the build runs it and hands the result to every queued waiter.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::builder::BuildRequest;
use crate::events::{Event, tag};
use crate::model::{Build, BuildKey, BuildStatus};
use crate::store::Enqueued;
use crate::types::{SwarmId, TraceId};

use super::controller::Controller;
use super::pass::PassReport;
use super::SwarmError;

pub(crate) type Reply = oneshot::Sender<Result<PassReport, SwarmError>>;

/// A swarm parked until a build attempt finishes.
pub(crate) struct Waiter {
    pub(crate) swarm: SwarmId,
    pub(crate) trace: TraceId,
    pub(crate) enqueued_at: Instant,
    pub(crate) reply: Reply,
}

impl Controller {
    /// Queue behind `attempt` of `key` and wait for the pass that follows it.
    pub(crate) async fn wait_for_build(
        self: &Arc<Self>,
        swarm: &SwarmId,
        key: &BuildKey,
        attempt: u32,
        trace: &TraceId,
    ) -> Result<PassReport, SwarmError> {
        let (reply, outcome) = oneshot::channel();
        let waiter = Waiter {
            swarm: swarm.clone(),
            trace: trace.clone(),
            enqueued_at: Instant::now(),
            reply,
        };

        match self.waiters.push(key, attempt, waiter) {
            Enqueued::Queued => {
                self.ctx.publish(
                    Event::new(swarm.as_str(), format!("waiting for build {key}"))
                        .tags(&[tag::SWARM, tag::WAIT])
                        .trace(trace),
                );
                outcome.await.map_err(|_| SwarmError::Abandoned(swarm.clone()))?
            }
            Enqueued::AlreadyFinished { status, .. } => {
                let build = self.ctx.store.get_build(key).await?;
                match build {
                    Some(build) if status == BuildStatus::Success && build.is_usable() => {
                        self.release_and_run(swarm, build, trace.clone()).await
                    }
                    other => Err(SwarmError::BuildFailed {
                        key: key.clone(),
                        reason: other
                            .and_then(|b| b.failure)
                            .unwrap_or_else(|| status.to_string()),
                    }),
                }
            }
        }
    }

    /// Run a claimed build attempt, record it, and release its waiters.
    pub(crate) async fn run_build(self: Arc<Self>, build: Build) {
        let key = build.key.clone();
        let attempt = build.attempt;
        self.ctx.publish(
            Event::new(key.to_string(), format!("building {key} (attempt {attempt})")).tag(tag::BUILD),
        );

        let outcome = match self.ctx.app(&key.app) {
            Some(app) => {
                let request = BuildRequest {
                    key: key.clone(),
                    repo_url: app.repo_url.clone(),
                    repo_type: app.repo_type.clone(),
                };
                self.ctx.builder.build(&request).await.map_err(|e| e.to_string())
            }
            None => Err(SwarmError::UnknownApp(key.app.clone()).to_string()),
        };

        let finished = self.ctx.store.finish_build(&key, attempt, outcome).await;
        let status = match &finished {
            Ok(build) => build.status,
            Err(e) => {
                tracing::warn!(build = %key, attempt, "could not record build: {}", e);
                BuildStatus::Failed
            }
        };

        match &finished {
            Ok(build) if build.is_usable() => {
                self.ctx.publish(Event::new(key.to_string(), format!("built {key}")).tags(&[tag::BUILD, tag::DONE]));
            }
            Ok(build) => {
                let reason = build.failure.as_deref().unwrap_or("unknown failure");
                self.ctx.publish(
                    Event::new(key.to_string(), format!("build {key} failed: {reason}"))
                        .tags(&[tag::BUILD, tag::FAILED]),
                );
            }
            Err(_) => {}
        }

        let max_wait = self.ctx.settings.build_wait_age;
        for waiter in self.waiters.finish(&key, attempt, status) {
            let waited = waiter.enqueued_at.elapsed();
            if waited > max_wait {
                tracing::warn!(swarm = waiter.swarm.as_str(), build = %key, ?waited, "dropping expired waiter");
                let _ = waiter.reply.send(Err(SwarmError::WaitExpired {
                    swarm: waiter.swarm,
                    key: key.clone(),
                    waited,
                }));
                continue;
            }

            match &finished {
                Ok(build) if build.is_usable() => {
                    let controller = Arc::clone(&self);
                    let build = build.clone();
                    tokio::spawn(async move {
                        let Waiter { swarm, trace, reply, .. } = waiter;
                        let result = controller.release_and_run(&swarm, build, trace).await;
                        let _ = reply.send(result);
                    });
                }
                Ok(build) => {
                    let _ = waiter.reply.send(Err(SwarmError::BuildFailed {
                        key: key.clone(),
                        reason: build.failure.clone().unwrap_or_else(|| build.status.to_string()),
                    }));
                }
                Err(e) => {
                    let _ = waiter.reply.send(Err(SwarmError::BuildFailed {
                        key: key.clone(),
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}
