// ABOUTME: Persistence seam for swarms, hosts, builds, releases and test runs.
// ABOUTME: Also hosts the shared tables that need atomic access: port locks and build wait-lists.

mod memory;
mod port_locks;
mod wait_list;

pub use memory::MemoryStore;
pub use port_locks::{LockHolder, PortLockGuard, PortLocks};
pub use wait_list::{Enqueued, WaitList};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::HostConfig;
use crate::model::{Artifact, Build, BuildKey, Release, Swarm, TestRun};
use crate::types::{ReleaseId, SwarmId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("swarm not found: {0}")]
    SwarmNotFound(SwarmId),

    #[error("release not found: {0}")]
    ReleaseNotFound(ReleaseId),

    #[error("build not found: {0}")]
    BuildNotFound(BuildKey),

    #[error("build {key} attempt {attempt} is no longer the current attempt")]
    StaleAttempt { key: BuildKey, attempt: u32 },
}

/// Result of asking for the build a swarm needs.
#[derive(Debug, Clone)]
pub enum BuildClaim {
    /// A successful build already exists.
    Usable(Build),
    /// Someone else is building it; wait for that attempt.
    InProgress { attempt: u32 },
    /// The caller now owns a fresh attempt and must run the build.
    Claimed(Build),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_swarm(&self, id: &SwarmId) -> Result<Swarm, StoreError>;

    async fn save_swarm(&self, swarm: Swarm) -> Result<(), StoreError>;

    async fn list_swarms(&self) -> Result<Vec<Swarm>, StoreError>;

    async fn active_hosts(&self) -> Result<Vec<HostConfig>, StoreError>;

    /// Atomically decide who builds `key`. At most one attempt is in
    /// progress per key at any time.
    async fn claim_build(&self, key: &BuildKey) -> Result<BuildClaim, StoreError>;

    /// Record the outcome of an attempt handed out by `claim_build`.
    async fn finish_build(
        &self,
        key: &BuildKey,
        attempt: u32,
        outcome: Result<Artifact, String>,
    ) -> Result<Build, StoreError>;

    async fn get_build(&self, key: &BuildKey) -> Result<Option<Build>, StoreError>;

    /// Find the release with the same hash, or store this one.
    async fn ensure_release(&self, release: Release) -> Result<Release, StoreError>;

    async fn get_release(&self, id: &ReleaseId) -> Result<Release, StoreError>;

    async fn save_test_run(&self, run: TestRun) -> Result<(), StoreError>;

    async fn test_runs(&self) -> Result<Vec<TestRun>, StoreError>;
}
