// ABOUTME: Swarm definition: desired app, version, config, instance count and pool.
// ABOUTME: Swarms are read from config; the release pointer is filled in at run time.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::{EnvValue, resolve_env_map};
use crate::error::Result;
use crate::types::{AppName, ProcName, ReleaseId, SwarmId};

use super::{BuildKey, Instance, ReleaseConfig};

/// Which balancer pool routes traffic to a swarm.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolAssignment {
    pub balancer: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Swarm {
    pub id: SwarmId,
    pub app: AppName,
    pub version: String,
    #[serde(rename = "proc")]
    pub proc_name: ProcName,
    #[serde(default = "default_config_name")]
    pub config_name: String,
    pub size: usize,
    #[serde(default)]
    pub pool: Option<PoolAssignment>,

    /// Free-form settings handed to the app as part of its release config.
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,

    /// `user` or `user:group` the instance runs as.
    #[serde(default)]
    pub run_as: Option<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub mem_limit: Option<String>,
    #[serde(default)]
    pub memsw_limit: Option<String>,

    #[serde(skip_deserializing)]
    pub release: Option<ReleaseId>,
}

fn default_config_name() -> String {
    "default".to_string()
}

impl Swarm {
    pub fn build_key(&self) -> BuildKey {
        BuildKey::new(self.app.clone(), self.version.clone())
    }

    /// Whether an instance reported by a host belongs to this swarm,
    /// regardless of which release it runs.
    pub fn owns(&self, instance: &Instance) -> bool {
        instance.app == self.app
            && instance.config_name == self.config_name
            && instance.proc_name == self.proc_name
    }

    /// Snapshot the swarm's config for a release, resolving env interpolation.
    pub fn release_config(&self) -> Result<ReleaseConfig> {
        Ok(ReleaseConfig {
            config_name: self.config_name.clone(),
            settings: self.settings.clone(),
            env: resolve_env_map(&self.env)?,
            run_as: self.run_as.clone(),
            volumes: self.volumes.clone(),
            mem_limit: self.mem_limit.clone(),
            memsw_limit: self.memsw_limit.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReleaseHash;

    fn swarm() -> Swarm {
        serde_yaml::from_str(
            r#"
id: billing-web
app: billing
version: v3
proc: web
size: 2
"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let swarm = swarm();
        assert_eq!(swarm.config_name, "default");
        assert!(swarm.pool.is_none());
        assert!(swarm.release.is_none());
        assert_eq!(swarm.build_key().to_string(), "billing-v3");
    }

    #[test]
    fn owns_ignores_release_hash() {
        let swarm = swarm();
        let mut instance = Instance {
            name: "billing-v2-deadbeef-web-5001".to_string(),
            host: "web1".to_string(),
            port: 5001,
            app: swarm.app.clone(),
            version: "v2".to_string(),
            config_name: "default".to_string(),
            proc_name: swarm.proc_name.clone(),
            release_hash: ReleaseHash::from_reported("deadbeef"),
        };
        assert!(swarm.owns(&instance));

        instance.proc_name = ProcName::new("worker").unwrap();
        assert!(!swarm.owns(&instance));
    }

    #[test]
    fn release_config_resolves_env() {
        let mut swarm = swarm();
        swarm
            .env
            .insert("MODE".to_string(), EnvValue::Literal("live".to_string()));
        let config = swarm.release_config().unwrap();
        assert_eq!(config.env.get("MODE").map(String::as_str), Some("live"));
    }
}
