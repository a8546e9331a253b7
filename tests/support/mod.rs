// ABOUTME: Test support utilities.
// ABOUTME: In-memory fakes for the remote agent, balancer, build system and event sink.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use drover::balancer::{Balancer, BalancerError};
use drover::builder::{BuildError, BuildRequest, BuildSystem};
use drover::config::{FleetConfig, HostConfig};
use drover::events::{Event, EventSink};
use drover::model::{Artifact, Build, Instance, InstanceDescriptor, Release, Swarm, UptestOutcome};
use drover::remote::{RemoteError, RemoteExec};
use drover::store::MemoryStore;
use drover::swarm::{Controller, ReconcileSettings, SwarmContext};
use drover::types::{ReleaseHash, SwarmId};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("drover=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const FLEET: &str = r#"
hosts:
  - name: web1
    ports: "5000-5009"
  - name: web2
    ports: "5000-5009"
apps:
  billing:
    repo_url: https://git.example.com/billing.git
balancers:
  lb: http://lb.example.com
swarms:
  - id: billing-web
    app: billing
    version: v1
    proc: web
    size: 3
    pool:
      balancer: lb
      name: billing
  - id: billing-worker
    app: billing
    version: v1
    proc: worker
    size: 1
"#;

// =============================================================================
// Remote
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Place { host: String, name: String, port: u16 },
    Remove { host: String, name: String },
    List { host: String },
    Check { host: String, name: String },
}

#[derive(Default)]
struct RemoteState {
    instances: BTreeMap<String, Vec<Instance>>,
    calls: Vec<RemoteCall>,
    failing_deploys: HashSet<String>,
    failing_removes: bool,
    failing_checks: bool,
    no_checks: bool,
    deploy_delay: Option<Duration>,
}

/// Hosts that keep their instances in memory and log every call.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, instance: Instance) {
        self.state.lock().instances.entry(instance.host.clone()).or_default().push(instance);
    }

    pub fn fail_deploys_on(&self, host: &str) {
        self.state.lock().failing_deploys.insert(host.to_string());
    }

    pub fn heal(&self) {
        self.state.lock().failing_deploys.clear();
    }

    pub fn fail_removes(&self) {
        self.state.lock().failing_removes = true;
    }

    pub fn fail_checks(&self) {
        self.state.lock().failing_checks = true;
    }

    pub fn without_checks(&self) {
        self.state.lock().no_checks = true;
    }

    pub fn slow_deploys(&self, delay: Duration) {
        self.state.lock().deploy_delay = Some(delay);
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.state.lock().instances.values().flatten().cloned().collect()
    }

    pub fn instances_on(&self, host: &str) -> Vec<Instance> {
        self.state.lock().instances.get(host).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    pub fn places(&self) -> Vec<(String, u16)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Place { host, port, .. } => Some((host, port)),
                _ => None,
            })
            .collect()
    }

    pub fn removes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Remove { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn checks(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, RemoteCall::Check { .. })).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

#[async_trait]
impl RemoteExec for FakeRemote {
    async fn place_instance(
        &self,
        host: &HostConfig,
        descriptor: &InstanceDescriptor,
    ) -> Result<(), RemoteError> {
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(RemoteCall::Place {
                host: host.name.clone(),
                name: descriptor.name(),
                port: descriptor.port,
            });
            if state.failing_deploys.contains(&host.name) {
                return Err(RemoteError::CommandFailed {
                    host: host.name.clone(),
                    command: "deploy".to_string(),
                    exit_code: 1,
                    stderr: "disk full".to_string(),
                });
            }
            state.deploy_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .lock()
            .instances
            .entry(host.name.clone())
            .or_default()
            .push(descriptor.instance());
        Ok(())
    }

    async fn remove_instance(&self, host: &HostConfig, name: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Remove {
            host: host.name.clone(),
            name: name.to_string(),
        });
        if state.failing_removes {
            return Err(RemoteError::CommandFailed {
                host: host.name.clone(),
                command: "delete".to_string(),
                exit_code: 1,
                stderr: "device busy".to_string(),
            });
        }
        let list = state.instances.entry(host.name.clone()).or_default();
        let before = list.len();
        list.retain(|i| i.name != name);
        if list.len() == before {
            return Err(RemoteError::NotFound {
                host: host.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn list_instances(&self, host: &HostConfig) -> Result<Vec<Instance>, RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::List {
            host: host.name.clone(),
        });
        Ok(state.instances.get(&host.name).cloned().unwrap_or_default())
    }

    async fn run_health_checks(
        &self,
        host: &HostConfig,
        name: &str,
    ) -> Result<Vec<UptestOutcome>, RemoteError> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Check {
            host: host.name.clone(),
            name: name.to_string(),
        });
        if state.no_checks {
            return Ok(Vec::new());
        }
        Ok(vec![UptestOutcome {
            name: "http_ok".to_string(),
            passed: !state.failing_checks,
            output: if state.failing_checks {
                "503 Service Unavailable".to_string()
            } else {
                String::new()
            },
        }])
    }
}

// =============================================================================
// Balancer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCall {
    Get(String),
    Add(String, BTreeSet<String>),
    Remove(String, BTreeSet<String>),
}

#[derive(Default)]
pub struct FakeBalancer {
    pools: Mutex<BTreeMap<String, BTreeSet<drover::types::Node>>>,
    calls: Mutex<Vec<PoolCall>>,
    down: Mutex<bool>,
}

impl FakeBalancer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_pool(&self, pool: &str, nodes: &[&str]) {
        let nodes = nodes.iter().map(|n| n.parse().unwrap()).collect();
        self.pools.lock().insert(pool.to_string(), nodes);
    }

    pub fn pool(&self, pool: &str) -> BTreeSet<String> {
        self.pools
            .lock()
            .get(pool)
            .map(|nodes| nodes.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<PoolCall> {
        self.calls.lock().clone()
    }

    /// Calls other than reads.
    pub fn edits(&self) -> Vec<PoolCall> {
        self.calls().into_iter().filter(|c| !matches!(c, PoolCall::Get(_))).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn go_down(&self) {
        *self.down.lock() = true;
    }

    fn check_up(&self, balancer: &str) -> Result<(), BalancerError> {
        if *self.down.lock() {
            return Err(BalancerError::Connection {
                balancer: balancer.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

fn names(nodes: &BTreeSet<drover::types::Node>) -> BTreeSet<String> {
    nodes.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl Balancer for FakeBalancer {
    async fn get_nodes(
        &self,
        balancer: &str,
        pool: &str,
    ) -> Result<BTreeSet<drover::types::Node>, BalancerError> {
        self.calls.lock().push(PoolCall::Get(pool.to_string()));
        self.check_up(balancer)?;
        Ok(self.pools.lock().get(pool).cloned().unwrap_or_default())
    }

    async fn add_nodes(
        &self,
        balancer: &str,
        pool: &str,
        nodes: &BTreeSet<drover::types::Node>,
    ) -> Result<(), BalancerError> {
        self.calls.lock().push(PoolCall::Add(pool.to_string(), names(nodes)));
        self.check_up(balancer)?;
        self.pools.lock().entry(pool.to_string()).or_default().extend(nodes.iter().cloned());
        Ok(())
    }

    async fn remove_nodes(
        &self,
        balancer: &str,
        pool: &str,
        nodes: &BTreeSet<drover::types::Node>,
    ) -> Result<(), BalancerError> {
        self.calls.lock().push(PoolCall::Remove(pool.to_string(), names(nodes)));
        self.check_up(balancer)?;
        if let Some(current) = self.pools.lock().get_mut(pool) {
            current.retain(|n| !nodes.contains(n));
        }
        Ok(())
    }
}

// =============================================================================
// Build system
// =============================================================================

#[derive(Default)]
pub struct FakeBuild {
    runs: Mutex<usize>,
    fail: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl FakeBuild {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn runs(&self) -> usize {
        *self.runs.lock()
    }

    pub fn fail(&self) {
        *self.fail.lock() = true;
    }

    pub fn recover(&self) {
        *self.fail.lock() = false;
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl BuildSystem for FakeBuild {
    async fn build(&self, request: &BuildRequest) -> Result<Artifact, BuildError> {
        *self.runs.lock() += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock() {
            return Err(BuildError::Failed {
                exit_code: Some(2),
                stderr: "compile error".to_string(),
            });
        }
        Ok(Artifact {
            url: format!("https://builds.example.com/{}.tar.gz", request.key),
            hash: format!("sha-{}", request.key),
        })
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn tagged(&self, tag: &str) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.has_tag(tag)).collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, event: Event) {
        self.events.lock().push(event);
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub config: FleetConfig,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<FakeRemote>,
    pub balancer: Arc<FakeBalancer>,
    pub builder: Arc<FakeBuild>,
    pub events: Arc<MemorySink>,
    pub controller: Arc<Controller>,
}

impl Harness {
    pub fn new() -> Self {
        Self::from_yaml(FLEET)
    }

    pub fn from_yaml(yaml: &str) -> Self {
        init_tracing();
        let config = FleetConfig::from_yaml(yaml).unwrap();
        let store = Arc::new(MemoryStore::from_config(&config));
        let remote = FakeRemote::new();
        let balancer = FakeBalancer::new();
        let builder = FakeBuild::new();
        let events = MemorySink::new();

        let mut settings = ReconcileSettings::from_config(&config);
        settings.debug_events = true;
        let ctx = SwarmContext::new(
            store.clone(),
            remote.clone(),
            balancer.clone(),
            builder.clone(),
            events.clone(),
            settings,
        );

        Self {
            config,
            store,
            remote,
            balancer,
            builder,
            events,
            controller: Controller::new(ctx),
        }
    }

    pub fn ctx(&self) -> &SwarmContext {
        self.controller.context()
    }

    pub fn swarm(&self, id: &str) -> Swarm {
        self.config.swarm(id).unwrap().clone()
    }

    /// Store a finished build for the swarm and return the release its
    /// next pass will resolve to.
    pub fn prebuilt(&self, id: &str) -> Release {
        let swarm = self.swarm(id);
        let mut build = Build::new(swarm.build_key());
        build.start();
        build.succeed(Artifact {
            url: format!("https://builds.example.com/{}.tar.gz", swarm.build_key()),
            hash: format!("sha-{}", swarm.build_key()),
        });
        self.store.insert_build(build.clone());
        Release::assemble(&build, swarm.release_config().unwrap()).unwrap()
    }

    /// An instance of `swarm` on `host:port` running `hash`.
    pub fn instance(&self, id: &str, host: &str, port: u16, hash: &ReleaseHash) -> Instance {
        let swarm = self.swarm(id);
        Instance {
            name: drover::model::instance_name(&swarm.build_key(), hash, &swarm.proc_name, port),
            host: host.to_string(),
            port,
            app: swarm.app.clone(),
            version: swarm.version.clone(),
            config_name: swarm.config_name.clone(),
            proc_name: swarm.proc_name.clone(),
            release_hash: hash.clone(),
        }
    }

    pub async fn trigger(&self, id: &str) -> Result<drover::swarm::PassReport, drover::swarm::SwarmError> {
        self.controller.trigger_swarm(SwarmId::new(id), None).outcome().await
    }
}
