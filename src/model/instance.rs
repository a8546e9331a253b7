// ABOUTME: Running instances as reported by hosts, and the descriptor used to place one.
// ABOUTME: Hosts are the source of truth for instances; nothing here is cached centrally.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AppName, Node, ProcName, ReleaseHash};

use super::{BuildKey, Release, Swarm};

const DEFAULT_USER: &str = "nobody";
const DEFAULT_GROUP: &str = "nogroup";

/// `<app>-<version>-<hash8>-<proc>-<port>`
pub fn instance_name(key: &BuildKey, hash: &ReleaseHash, proc_name: &ProcName, port: u16) -> String {
    format!(
        "{}-{}-{}-{}-{}",
        key.app,
        key.version,
        hash.short(),
        proc_name,
        port
    )
}

/// One running unit of a release on one host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub app: AppName,
    pub version: String,
    pub config_name: String,
    #[serde(rename = "proc")]
    pub proc_name: ProcName,
    pub release_hash: ReleaseHash,
}

impl Instance {
    pub fn node(&self) -> Node {
        Node::new(self.host.clone(), self.port)
    }

    pub fn runs(&self, hash: &ReleaseHash) -> bool {
        &self.release_hash == hash
    }
}

/// Everything a host agent needs to place an instance (`proc.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub release_hash: ReleaseHash,
    pub config_name: String,
    pub settings: serde_json::Value,
    pub env: BTreeMap<String, String>,
    pub version: String,
    pub build_hash: String,
    pub build_url: String,
    pub app_name: AppName,
    pub app_repo_url: String,
    pub host: String,
    pub proc_name: ProcName,
    pub port: u16,
    pub user: String,
    pub group: String,
    pub volumes: Vec<String>,
    pub mem_limit: Option<String>,
    pub memsw_limit: Option<String>,
}

impl InstanceDescriptor {
    pub fn new(release: &Release, swarm: &Swarm, repo_url: &str, host: &str, port: u16) -> Self {
        let (user, group) = match release.config.run_as.as_deref() {
            Some(owner) => match owner.split_once(':') {
                Some((user, group)) => (user.to_string(), group.to_string()),
                None => (owner.to_string(), DEFAULT_GROUP.to_string()),
            },
            None => (DEFAULT_USER.to_string(), DEFAULT_GROUP.to_string()),
        };

        Self {
            release_hash: release.hash.clone(),
            config_name: release.config.config_name.clone(),
            settings: release.config.settings.clone(),
            env: release.config.env.clone(),
            version: release.key.version.clone(),
            build_hash: release.artifact.hash.clone(),
            build_url: release.artifact.url.clone(),
            app_name: release.key.app.clone(),
            app_repo_url: repo_url.to_string(),
            host: host.to_string(),
            proc_name: swarm.proc_name.clone(),
            port,
            user,
            group,
            volumes: release.config.volumes.clone(),
            mem_limit: release.config.mem_limit.clone(),
            memsw_limit: release.config.memsw_limit.clone(),
        }
    }

    pub fn name(&self) -> String {
        instance_name(
            &BuildKey::new(self.app_name.clone(), self.version.clone()),
            &self.release_hash,
            &self.proc_name,
            self.port,
        )
    }

    /// The instance the host will report once this descriptor is placed.
    pub fn instance(&self) -> Instance {
        Instance {
            name: self.name(),
            host: self.host.clone(),
            port: self.port,
            app: self.app_name.clone(),
            version: self.version.clone(),
            config_name: self.config_name.clone(),
            proc_name: self.proc_name.clone(),
            release_hash: self.release_hash.clone(),
        }
    }
}
