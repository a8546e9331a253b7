// ABOUTME: In-process Store backed by a single mutex.
// ABOUTME: Seeded from the fleet config; every method is one critical section.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use crate::config::{FleetConfig, HostConfig};
use crate::model::{Artifact, Build, BuildKey, Release, Swarm, TestRun};
use crate::types::{ReleaseId, SwarmId};

use super::{BuildClaim, Store, StoreError};

#[derive(Default)]
struct Tables {
    swarms: BTreeMap<SwarmId, Swarm>,
    hosts: Vec<HostConfig>,
    builds: HashMap<BuildKey, Build>,
    releases: HashMap<ReleaseId, Release>,
    test_runs: Vec<TestRun>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new(hosts: Vec<HostConfig>, swarms: Vec<Swarm>) -> Self {
        let tables = Tables {
            swarms: swarms.into_iter().map(|s| (s.id.clone(), s)).collect(),
            hosts,
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub fn from_config(config: &FleetConfig) -> Self {
        Self::new(
            config.hosts.iter().cloned().collect(),
            config.swarms.clone(),
        )
    }

    /// Insert or replace a build record directly.
    pub fn insert_build(&self, build: Build) {
        self.tables.lock().builds.insert(build.key.clone(), build);
    }

    pub fn build_count(&self) -> usize {
        self.tables.lock().builds.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_swarm(&self, id: &SwarmId) -> Result<Swarm, StoreError> {
        self.tables
            .lock()
            .swarms
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SwarmNotFound(id.clone()))
    }

    async fn save_swarm(&self, swarm: Swarm) -> Result<(), StoreError> {
        self.tables.lock().swarms.insert(swarm.id.clone(), swarm);
        Ok(())
    }

    async fn list_swarms(&self) -> Result<Vec<Swarm>, StoreError> {
        Ok(self.tables.lock().swarms.values().cloned().collect())
    }

    async fn active_hosts(&self) -> Result<Vec<HostConfig>, StoreError> {
        Ok(self
            .tables
            .lock()
            .hosts
            .iter()
            .filter(|h| h.active)
            .cloned()
            .collect())
    }

    async fn claim_build(&self, key: &BuildKey) -> Result<BuildClaim, StoreError> {
        let mut tables = self.tables.lock();
        let build = tables
            .builds
            .entry(key.clone())
            .or_insert_with(|| Build::new(key.clone()));

        if build.is_usable() {
            return Ok(BuildClaim::Usable(build.clone()));
        }
        if build.in_progress() {
            return Ok(BuildClaim::InProgress {
                attempt: build.attempt,
            });
        }

        build.start();
        Ok(BuildClaim::Claimed(build.clone()))
    }

    async fn finish_build(
        &self,
        key: &BuildKey,
        attempt: u32,
        outcome: Result<Artifact, String>,
    ) -> Result<Build, StoreError> {
        let mut tables = self.tables.lock();
        let build = tables
            .builds
            .get_mut(key)
            .ok_or_else(|| StoreError::BuildNotFound(key.clone()))?;

        if build.attempt != attempt || !build.in_progress() {
            return Err(StoreError::StaleAttempt {
                key: key.clone(),
                attempt,
            });
        }

        match outcome {
            Ok(artifact) => build.succeed(artifact),
            Err(reason) => build.fail(reason),
        }
        Ok(build.clone())
    }

    async fn get_build(&self, key: &BuildKey) -> Result<Option<Build>, StoreError> {
        Ok(self.tables.lock().builds.get(key).cloned())
    }

    async fn ensure_release(&self, release: Release) -> Result<Release, StoreError> {
        let mut tables = self.tables.lock();
        if let Some(existing) = tables
            .releases
            .values()
            .find(|r| r.hash == release.hash && r.build_id == release.build_id)
        {
            return Ok(existing.clone());
        }
        tables.releases.insert(release.id.clone(), release.clone());
        Ok(release)
    }

    async fn get_release(&self, id: &ReleaseId) -> Result<Release, StoreError> {
        self.tables
            .lock()
            .releases
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ReleaseNotFound(id.clone()))
    }

    async fn save_test_run(&self, run: TestRun) -> Result<(), StoreError> {
        self.tables.lock().test_runs.push(run);
        Ok(())
    }

    async fn test_runs(&self) -> Result<Vec<TestRun>, StoreError> {
        Ok(self.tables.lock().test_runs.clone())
    }
}
