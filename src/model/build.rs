// ABOUTME: Build records: one artifact per (app, version) with a status lifecycle.
// ABOUTME: Each claim of a build bumps its attempt so stale completions can be told apart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{AppName, BuildId};

/// Identity of a build: the app and the version (tag) being built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildKey {
    pub app: AppName,
    pub version: String,
}

impl BuildKey {
    pub fn new(app: AppName, version: impl Into<String>) -> Self {
        Self {
            app,
            version: version.into(),
        }
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.app, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Expired,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Pending => "pending",
            BuildStatus::InProgress => "in-progress",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Where a finished build's artifact lives and what it hashes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: BuildId,
    pub key: BuildKey,
    pub status: BuildStatus,
    pub attempt: u32,
    pub artifact: Option<Artifact>,
    pub failure: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Build {
    pub fn new(key: BuildKey) -> Self {
        Self {
            id: BuildId::new(key.to_string()),
            key,
            status: BuildStatus::Pending,
            attempt: 0,
            artifact: None,
            failure: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// A build can back a release only once it succeeded and kept its artifact.
    pub fn is_usable(&self) -> bool {
        self.status == BuildStatus::Success && self.artifact.is_some()
    }

    pub fn in_progress(&self) -> bool {
        self.status == BuildStatus::InProgress
    }

    /// Begin a new attempt.
    pub fn start(&mut self) {
        self.status = BuildStatus::InProgress;
        self.attempt += 1;
        self.artifact = None;
        self.failure = None;
        self.started_at = Some(Utc::now());
        self.ended_at = None;
    }

    pub fn succeed(&mut self, artifact: Artifact) {
        self.status = BuildStatus::Success;
        self.artifact = Some(artifact);
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = BuildStatus::Failed;
        self.failure = Some(reason.into());
        self.ended_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> BuildKey {
        BuildKey::new(AppName::new("billing").unwrap(), "v2")
    }

    #[test]
    fn new_build_is_pending_and_unusable() {
        let build = Build::new(key());
        assert_eq!(build.status, BuildStatus::Pending);
        assert_eq!(build.id.as_str(), "billing-v2");
        assert!(!build.is_usable());
    }

    #[test]
    fn start_bumps_attempt_and_clears_previous_outcome() {
        let mut build = Build::new(key());
        build.start();
        build.fail("compiler exploded");
        build.start();
        assert_eq!(build.attempt, 2);
        assert!(build.in_progress());
        assert!(build.failure.is_none());
    }

    #[test]
    fn success_with_artifact_is_usable() {
        let mut build = Build::new(key());
        build.start();
        build.succeed(Artifact {
            url: "https://builds/billing-v2.tar.gz".to_string(),
            hash: "abc".to_string(),
        });
        assert!(build.is_usable());
        assert_eq!(build.status.to_string(), "success");
    }
}
