// ABOUTME: Removal of instances that no longer run the swarm's release.
// ABOUTME: Best effort: failures are collected and reported, never raised.

use serde::Serialize;

use crate::config::HostConfig;
use crate::model::{Instance, PoolAssignment};
use crate::types::TraceId;

use super::primitives::delete_routed;
use super::{FleetSnapshot, SwarmContext};

/// Outcome of a cleanup sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupResult {
    pub deleted: Vec<String>,
    pub failed: Vec<CleanupFailure>,
}

impl CleanupResult {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub instance: String,
    pub host: String,
    pub error: String,
}

/// Delete `stale` instances in parallel, one task per instance, each taken
/// out of the pool first when the swarm has one.
pub async fn cleanup_stale(
    ctx: &SwarmContext,
    pool: Option<&PoolAssignment>,
    snapshot: &FleetSnapshot,
    stale: Vec<Instance>,
    trace: &TraceId,
) -> CleanupResult {
    let timeout = ctx.settings.timeouts.delete;
    let handles: Vec<_> = stale
        .iter()
        .map(|instance| {
            let task_ctx = ctx.clone();
            let pool = pool.cloned();
            let host = snapshot
                .host(&instance.host)
                .cloned()
                .unwrap_or_else(|| HostConfig::new(instance.host.clone()));
            let instance = instance.clone();
            let trace = trace.clone();

            ctx.scheduler.submit(format!("delete {}", instance.name), timeout, async move {
                delete_routed(&task_ctx, pool.as_ref(), &host, &instance, &trace).await
            })
        })
        .collect();

    let mut result = CleanupResult::default();
    for (instance, outcome) in stale.into_iter().zip(ctx.scheduler.join_all(handles).await) {
        match outcome {
            Ok(()) => result.deleted.push(instance.name),
            Err(e) => {
                tracing::warn!(instance = instance.name.as_str(), "cleanup failed: {}", e);
                result.failed.push(CleanupFailure {
                    instance: instance.name,
                    host: instance.host,
                    error: e.to_string(),
                });
            }
        }
    }
    result
}
