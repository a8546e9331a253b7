// ABOUTME: Point-in-time view of what every active host is running.
// ABOUTME: Re-queried on every pass; hosts, not the store, are the source of truth for instances.

use crate::config::HostConfig;
use crate::model::{Instance, Swarm};
use crate::types::ReleaseHash;

use super::error::{Stage, collect_stage};
use super::{SwarmContext, SwarmError};

#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub hosts: Vec<HostConfig>,
    pub instances: Vec<Instance>,
}

impl FleetSnapshot {
    /// List instances on every active host concurrently.
    pub async fn capture(ctx: &SwarmContext) -> Result<Self, SwarmError> {
        let hosts = ctx.store.active_hosts().await?;

        let handles: Vec<_> = hosts
            .iter()
            .map(|host| {
                let remote = ctx.remote.clone();
                let host = host.clone();
                ctx.scheduler
                    .submit(format!("list {}", host.name), ctx.settings.timeouts.list, async move {
                        remote
                            .list_instances(&host)
                            .await
                            .map_err(|e| SwarmError::remote(host.name.clone(), e))
                    })
            })
            .collect();

        let listed = collect_stage(Stage::Snapshot, ctx.scheduler.join_all(handles).await)?;
        Ok(Self {
            hosts,
            instances: listed.into_iter().flatten().collect(),
        })
    }

    pub fn host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Every instance belonging to `swarm`, whatever release it runs.
    pub fn owned<'a>(&'a self, swarm: &'a Swarm) -> impl Iterator<Item = &'a Instance> {
        self.instances.iter().filter(move |i| swarm.owns(i))
    }

    /// Split the swarm's instances into those running `hash` and the rest.
    pub fn partition(&self, swarm: &Swarm, hash: &ReleaseHash) -> (Vec<Instance>, Vec<Instance>) {
        self.owned(swarm).cloned().partition(|i| i.runs(hash))
    }

    /// The swarm's instances on one host.
    pub fn owned_on<'a>(&'a self, swarm: &'a Swarm, host: &'a str) -> impl Iterator<Item = &'a Instance> {
        self.owned(swarm).filter(move |i| i.host == host)
    }
}
