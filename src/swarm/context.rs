// ABOUTME: Everything a reconciliation pass needs, injected once and shared by all tasks.
// ABOUTME: Collaborators sit behind traits; shared mutable state lives in PortLocks and the store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::balancer::Balancer;
use crate::builder::BuildSystem;
use crate::config::{AppConfig, FleetConfig, Timeouts};
use crate::events::{Event, EventSink, tag};
use crate::remote::RemoteExec;
use crate::scheduler::Scheduler;
use crate::store::{PortLocks, Store};
use crate::types::{AppName, TraceId};

/// Knobs for reconciliation, taken from the fleet config.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub timeouts: Timeouts,
    pub port_lock_max_age: Duration,
    pub build_wait_age: Duration,
    pub max_parallel_tasks: usize,
    pub apps: BTreeMap<AppName, AppConfig>,
    /// Publish stage transitions as `debug` events.
    pub debug_events: bool,
}

impl ReconcileSettings {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            timeouts: config.timeouts,
            port_lock_max_age: config.port_lock_max_age,
            build_wait_age: config.build_wait_age,
            max_parallel_tasks: config.max_parallel_tasks,
            apps: config.apps.clone(),
            debug_events: false,
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            port_lock_max_age: Duration::from_secs(3600),
            build_wait_age: Duration::from_secs(3600),
            max_parallel_tasks: 16,
            apps: BTreeMap::new(),
            debug_events: false,
        }
    }
}

#[derive(Clone)]
pub struct SwarmContext {
    pub store: Arc<dyn Store>,
    pub remote: Arc<dyn RemoteExec>,
    pub balancer: Arc<dyn Balancer>,
    pub builder: Arc<dyn BuildSystem>,
    pub events: Arc<dyn EventSink>,
    pub port_locks: PortLocks,
    pub scheduler: Scheduler,
    pub settings: ReconcileSettings,
}

impl SwarmContext {
    pub fn new(
        store: Arc<dyn Store>,
        remote: Arc<dyn RemoteExec>,
        balancer: Arc<dyn Balancer>,
        builder: Arc<dyn BuildSystem>,
        events: Arc<dyn EventSink>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            remote,
            balancer,
            builder,
            events,
            port_locks: PortLocks::new(),
            scheduler: Scheduler::new(settings.max_parallel_tasks),
            settings,
        }
    }

    pub fn publish(&self, event: Event) {
        self.events.publish(event);
    }

    /// Publish a stage transition when debug events are on.
    pub fn debug(&self, title: &str, message: impl Into<String>, trace: &TraceId) {
        if self.settings.debug_events {
            self.publish(Event::new(title, message).tag(tag::DEBUG).trace(trace));
        }
    }

    pub fn app(&self, app: &AppName) -> Option<&AppConfig> {
        self.settings.apps.get(app)
    }
}
