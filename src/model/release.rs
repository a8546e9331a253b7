// ABOUTME: Releases bind a successful build to a config snapshot.
// ABOUTME: The release hash is a pure function of build identity and config contents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{BuildId, ProcName, ReleaseHash, ReleaseId};

use super::{Artifact, Build, BuildKey, instance_name};

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("build {0} has no usable artifact")]
    NoArtifact(BuildKey),

    #[error("failed to encode release config: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Config half of a release. Field order and the sorted env map keep the
/// encoded form, and therefore the hash, stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub config_name: String,
    pub settings: serde_json::Value,
    pub env: BTreeMap<String, String>,
    pub run_as: Option<String>,
    pub volumes: Vec<String>,
    pub mem_limit: Option<String>,
    pub memsw_limit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub build_id: BuildId,
    pub key: BuildKey,
    pub artifact: Artifact,
    pub config: ReleaseConfig,
    pub hash: ReleaseHash,
    pub created_at: DateTime<Utc>,
}

impl Release {
    pub fn hash_of(
        build_id: &BuildId,
        artifact: &Artifact,
        config: &ReleaseConfig,
    ) -> Result<ReleaseHash, ReleaseError> {
        let encoded = serde_json::to_vec(config)?;
        Ok(ReleaseHash::digest([
            build_id.as_str().as_bytes(),
            artifact.hash.as_bytes(),
            encoded.as_slice(),
        ]))
    }

    pub fn assemble(build: &Build, config: ReleaseConfig) -> Result<Self, ReleaseError> {
        let artifact = match (&build.artifact, build.is_usable()) {
            (Some(artifact), true) => artifact.clone(),
            _ => return Err(ReleaseError::NoArtifact(build.key.clone())),
        };
        let hash = Self::hash_of(&build.id, &artifact, &config)?;

        Ok(Self {
            id: ReleaseId::new(format!("{}-{}", build.key, hash.short())),
            build_id: build.id.clone(),
            key: build.key.clone(),
            artifact,
            config,
            hash,
            created_at: Utc::now(),
        })
    }

    pub fn instance_name(&self, proc_name: &ProcName, port: u16) -> String {
        instance_name(&self.key, &self.hash, proc_name, port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppName;

    fn built() -> Build {
        let mut build = Build::new(BuildKey::new(AppName::new("billing").unwrap(), "v3"));
        build.start();
        build.succeed(Artifact {
            url: "https://builds/billing-v3.tar.gz".to_string(),
            hash: "f00d".to_string(),
        });
        build
    }

    fn config(mode: &str) -> ReleaseConfig {
        ReleaseConfig {
            config_name: "prod".to_string(),
            settings: serde_json::json!({"workers": 4}),
            env: BTreeMap::from([("MODE".to_string(), mode.to_string())]),
            run_as: None,
            volumes: Vec::new(),
            mem_limit: None,
            memsw_limit: None,
        }
    }

    #[test]
    fn identical_inputs_converge_to_one_hash() {
        let a = Release::assemble(&built(), config("live")).unwrap();
        let b = Release::assemble(&built(), config("live")).unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn config_change_changes_hash() {
        let a = Release::assemble(&built(), config("live")).unwrap();
        let b = Release::assemble(&built(), config("dry-run")).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn unfinished_build_cannot_back_a_release() {
        let build = Build::new(BuildKey::new(AppName::new("billing").unwrap(), "v3"));
        let err = Release::assemble(&build, config("live")).unwrap_err();
        assert!(matches!(err, ReleaseError::NoArtifact(_)));
    }

    #[test]
    fn instance_name_ends_with_port() {
        let release = Release::assemble(&built(), config("live")).unwrap();
        let name = release.instance_name(&ProcName::new("web").unwrap(), 5003);
        assert!(name.starts_with("billing-v3-"));
        assert!(name.ends_with("-web-5003"));
    }
}
