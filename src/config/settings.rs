// ABOUTME: Settings for the collaborators: remote agent commands, builds, and task timeouts.
// ABOUTME: Every field has a default so a minimal config only lists hosts and swarms.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// How drover talks to the agent running on each host.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,
    #[serde(default)]
    pub trust_first_connection: bool,
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
    #[serde(default = "default_descriptor_dir")]
    pub descriptor_dir: String,
    #[serde(default = "default_deploy_command")]
    pub deploy_command: String,
    #[serde(default = "default_list_command")]
    pub list_command: String,
    #[serde(default = "default_delete_command")]
    pub delete_command: String,
    #[serde(default = "default_uptest_command")]
    pub uptest_command: String,
}

fn default_user() -> String {
    "deploy".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_descriptor_dir() -> String {
    "/tmp".to_string()
}

fn default_deploy_command() -> String {
    "sudo drover-agent deploy".to_string()
}

fn default_list_command() -> String {
    "sudo drover-agent list --json".to_string()
}

fn default_delete_command() -> String {
    "sudo drover-agent delete".to_string()
}

fn default_uptest_command() -> String {
    "sudo drover-agent uptest --json".to_string()
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            user: default_user(),
            key_path: None,
            known_hosts_path: None,
            trust_first_connection: false,
            command_timeout: default_command_timeout(),
            descriptor_dir: default_descriptor_dir(),
            deploy_command: default_deploy_command(),
            list_command: default_list_command(),
            delete_command: default_delete_command(),
            uptest_command: default_uptest_command(),
        }
    }
}

/// Local build command producing a deployable artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSettings {
    #[serde(default = "default_build_command")]
    pub command: Vec<String>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_build_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_build_command() -> Vec<String> {
    vec!["drover-build".to_string()]
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            command: default_build_command(),
            work_dir: None,
            timeout: default_build_timeout(),
        }
    }
}

/// Upper bounds for host-level tasks. A task exceeding its bound counts as failed.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timeouts {
    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub deploy: Duration,
    #[serde(default = "default_uptest_timeout", with = "humantime_serde")]
    pub uptest: Duration,
    #[serde(default = "default_delete_timeout", with = "humantime_serde")]
    pub delete: Duration,
    #[serde(default = "default_list_timeout", with = "humantime_serde")]
    pub list: Duration,
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_uptest_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_delete_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_list_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            deploy: default_deploy_timeout(),
            uptest: default_uptest_timeout(),
            delete: default_delete_timeout(),
            list: default_list_timeout(),
        }
    }
}
