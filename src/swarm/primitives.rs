// ABOUTME: Smallest units of work: place one instance, remove one instance.
// ABOUTME: Deploy consumes the caller's port lock so it is freed on every exit path.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::config::HostConfig;
use crate::events::{Event, tag};
use crate::model::{Instance, InstanceDescriptor, PoolAssignment, Release, Swarm};
use crate::store::PortLockGuard;
use crate::types::TraceId;

use super::{SwarmContext, SwarmError};

/// Bound for a host-level task that runs `n` remote operations in sequence.
pub(crate) fn scaled(timeout: Duration, n: usize) -> Duration {
    timeout.saturating_mul(u32::try_from(n.max(1)).unwrap_or(u32::MAX))
}

/// Place one instance of `release` on the locked port. The lock is
/// released when this returns, on success, error, or cancellation alike.
pub async fn deploy(
    ctx: &SwarmContext,
    swarm: &Swarm,
    release: &Release,
    host: &HostConfig,
    lock: PortLockGuard,
    trace: &TraceId,
) -> Result<Instance, SwarmError> {
    let app = ctx
        .app(&swarm.app)
        .ok_or_else(|| SwarmError::UnknownApp(swarm.app.clone()))?;
    let descriptor = InstanceDescriptor::new(release, swarm, &app.repo_url, &host.name, lock.port());
    let name = descriptor.name();

    ctx.publish(
        Event::new(swarm.id.as_str(), format!("deploying {} to {}", name, host.name))
            .tag(tag::DEPLOY)
            .trace(trace),
    );

    ctx.remote
        .place_instance(host, &descriptor)
        .await
        .map_err(|e| SwarmError::remote(host.name.clone(), e))?;

    // The host now reports the port as taken.
    drop(lock);
    Ok(descriptor.instance())
}

/// Stop and remove one instance. Removing an absent instance succeeds.
pub async fn delete(
    ctx: &SwarmContext,
    host: &HostConfig,
    instance: &Instance,
    trace: &TraceId,
) -> Result<(), SwarmError> {
    match ctx.remote.remove_instance(host, &instance.name).await {
        Ok(()) => {
            ctx.publish(
                Event::new(instance.name.as_str(), format!("deleted {} on {}", instance.name, host.name))
                    .tag(tag::DELETE)
                    .trace(trace),
            );
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(host = host.name.as_str(), instance = instance.name.as_str(), "already gone");
            Ok(())
        }
        Err(e) => Err(SwarmError::remote(host.name.clone(), e)),
    }
}

/// Take the instance out of the pool if it is in it, then delete it.
pub async fn delete_routed(
    ctx: &SwarmContext,
    pool: Option<&PoolAssignment>,
    host: &HostConfig,
    instance: &Instance,
    trace: &TraceId,
) -> Result<(), SwarmError> {
    if let Some(pool) = pool {
        let node = instance.node();
        let routed = ctx.balancer.get_nodes(&pool.balancer, &pool.name).await?;
        if routed.contains(&node) {
            tracing::info!(pool = pool.name.as_str(), %node, "removing node before delete");
            ctx.balancer
                .remove_nodes(&pool.balancer, &pool.name, &BTreeSet::from([node]))
                .await?;
        }
    }
    delete(ctx, host, instance, trace).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_timeout_multiplies_by_operation_count() {
        let base = Duration::from_secs(10);
        assert_eq!(scaled(base, 0), base);
        assert_eq!(scaled(base, 3), Duration::from_secs(30));
    }
}
