// ABOUTME: Runs a local build command and reads the artifact it produced from stdout.
// ABOUTME: The request is passed through DROVER_* environment variables.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::BuildSettings;
use crate::model::Artifact;

use super::{BuildError, BuildRequest, BuildSystem};

pub struct CommandBuildSystem {
    settings: BuildSettings,
}

/// What the build command prints on success.
#[derive(Debug, Deserialize)]
struct BuildOutput {
    artifact_url: String,
    artifact_hash: String,
}

impl CommandBuildSystem {
    pub fn new(settings: BuildSettings) -> Self {
        Self { settings }
    }

    fn env(request: &BuildRequest) -> HashMap<&'static str, String> {
        HashMap::from([
            ("DROVER_APP", request.key.app.to_string()),
            ("DROVER_VERSION", request.key.version.clone()),
            ("DROVER_REPO_URL", request.repo_url.clone()),
            ("DROVER_REPO_TYPE", request.repo_type.clone()),
        ])
    }
}

#[async_trait]
impl BuildSystem for CommandBuildSystem {
    async fn build(&self, request: &BuildRequest) -> Result<Artifact, BuildError> {
        let (program, args) = self
            .settings
            .command
            .split_first()
            .ok_or(BuildError::NoCommand)?;

        tracing::info!(build = %request.key, "running build: {}", self.settings.command.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(Self::env(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.settings.work_dir {
            command.current_dir(dir);
        }

        let output = tokio::time::timeout(self.settings.timeout, command.output())
            .await
            .map_err(|_| BuildError::Timeout(self.settings.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::warn!(build = %request.key, code = ?output.status.code(), "build failed");
            return Err(BuildError::Failed {
                exit_code: output.status.code(),
                stderr,
            });
        }

        let parsed: BuildOutput = serde_yaml::from_slice(&output.stdout)
            .map_err(|e| BuildError::BadOutput(e.to_string()))?;
        tracing::info!(build = %request.key, url = parsed.artifact_url.as_str(), "build finished");

        Ok(Artifact {
            url: parsed.artifact_url,
            hash: parsed.artifact_hash,
        })
    }
}
