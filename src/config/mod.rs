// ABOUTME: Fleet configuration types and parsing for drover.yml.
// ABOUTME: Handles YAML parsing, file discovery, and cross-reference validation.

mod deserialize;
mod env_value;
mod host;
mod init;
mod settings;

pub use env_value::{EnvValue, resolve_env_map};
pub use host::{HostConfig, PortRange};
pub use init::init_config;
pub use settings::{BuildSettings, RemoteSettings, Timeouts};

use crate::error::{Error, Result};
use crate::model::Swarm;
use crate::types::AppName;
use deserialize::deserialize_hosts;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "drover.yml";
pub const CONFIG_FILENAME_ALT: &str = "drover.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".drover/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct FleetConfig {
    #[serde(deserialize_with = "deserialize_hosts")]
    pub hosts: NonEmpty<HostConfig>,

    #[serde(default)]
    pub apps: BTreeMap<AppName, AppConfig>,

    /// Load balancer name to base URL.
    #[serde(default)]
    pub balancers: BTreeMap<String, String>,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default = "default_port_lock_max_age", with = "humantime_serde")]
    pub port_lock_max_age: Duration,

    #[serde(default = "default_build_wait_age", with = "humantime_serde")]
    pub build_wait_age: Duration,

    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    #[serde(default)]
    pub swarms: Vec<Swarm>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub repo_url: String,
    #[serde(default = "default_repo_type")]
    pub repo_type: String,
}

fn default_repo_type() -> String {
    "git".to_string()
}

fn default_port_lock_max_age() -> Duration {
    Duration::from_secs(3600)
}

fn default_build_wait_age() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_parallel_tasks() -> usize {
    16
}

impl FleetConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FleetConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Check references between sections that serde cannot express.
    fn validate(&self) -> Result<()> {
        let mut host_names = BTreeSet::new();
        for host in &self.hosts {
            if !host_names.insert(host.name.as_str()) {
                return Err(Error::InvalidConfig(format!("duplicate host: {}", host.name)));
            }
        }

        if self.max_parallel_tasks == 0 {
            return Err(Error::InvalidConfig(
                "max_parallel_tasks must be at least 1".to_string(),
            ));
        }

        let mut swarm_ids = BTreeSet::new();
        for swarm in &self.swarms {
            if !swarm_ids.insert(swarm.id.clone()) {
                return Err(Error::InvalidConfig(format!("duplicate swarm: {}", swarm.id)));
            }
            if !self.apps.contains_key(&swarm.app) {
                return Err(Error::InvalidConfig(format!(
                    "swarm {} references unknown app {}",
                    swarm.id, swarm.app
                )));
            }
            if let Some(pool) = &swarm.pool
                && !self.balancers.contains_key(&pool.balancer)
            {
                return Err(Error::InvalidConfig(format!(
                    "swarm {} routes through unknown balancer {}",
                    swarm.id, pool.balancer
                )));
            }
        }

        Ok(())
    }

    pub fn swarm(&self, id: &str) -> Result<&Swarm> {
        self.swarms
            .iter()
            .find(|s| s.id.as_str() == id)
            .ok_or_else(|| Error::UnknownSwarm(id.to_string()))
    }

    pub fn template() -> Self {
        FleetConfig {
            hosts: NonEmpty::new(HostConfig::new("web1.example.com")),
            apps: BTreeMap::new(),
            balancers: BTreeMap::new(),
            remote: RemoteSettings::default(),
            build: BuildSettings::default(),
            timeouts: Timeouts::default(),
            port_lock_max_age: default_port_lock_max_age(),
            build_wait_age: default_build_wait_age(),
            max_parallel_tasks: default_max_parallel_tasks(),
            swarms: Vec::new(),
        }
    }
}
