// ABOUTME: Error types for reconciliation passes.
// ABOUTME: Barrier joins gather every sibling failure into one StageFailed error.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::balancer::BalancerError;
use crate::builder::BuildError;
use crate::model::{BuildKey, ReleaseError};
use crate::remote::RemoteError;
use crate::store::StoreError;
use crate::types::{AppName, SwarmId};

/// Pipeline stage, used to tag failures and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Build,
    Release,
    Snapshot,
    Placement,
    Uptest,
    Routing,
    Cleanup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Release => "release",
            Stage::Snapshot => "snapshot",
            Stage::Placement => "placement",
            Stage::Uptest => "uptest",
            Stage::Routing => "routing",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed sibling task of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub host: Option<String>,
    pub message: String,
}

impl TaskFailure {
    pub fn from_error(err: &SwarmError) -> Self {
        Self {
            host: err.host().map(str::to_string),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) if !self.message.contains(host.as_str()) => {
                write!(f, "[{host}] {}", self.message)
            }
            _ => f.write_str(&self.message),
        }
    }
}

fn list_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(TaskFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("build {key} failed: {reason}")]
    BuildFailed { key: BuildKey, reason: String },

    #[error("build system error: {0}")]
    Build(#[from] BuildError),

    #[error("{swarm} gave up waiting for build {key} after {waited:?}")]
    WaitExpired {
        swarm: SwarmId,
        key: BuildKey,
        waited: Duration,
    },

    #[error("cannot assemble release for {swarm}: {reason}")]
    ReleaseConfig { swarm: SwarmId, reason: String },

    #[error(transparent)]
    Release(#[from] ReleaseError),

    #[error("no repository configured for app {0}")]
    UnknownApp(AppName),

    #[error("no active hosts to place {0} on")]
    NoHosts(SwarmId),

    #[error("no free port on {host}")]
    NoFreePort { host: String },

    #[error("{host}: {source}")]
    Remote { host: String, source: RemoteError },

    #[error("balancer error: {0}")]
    Balancer(#[from] BalancerError),

    #[error("failed uptests: {}", list_failures(.failures))]
    UptestFailed { failures: Vec<TaskFailure> },

    #[error("{stage} failed: {}", list_failures(.failures))]
    StageFailed {
        stage: Stage,
        failures: Vec<TaskFailure>,
    },

    #[error("{label} timed out after {after:?}")]
    Timeout { label: String, after: Duration },

    #[error("{label} panicked: {message}")]
    TaskPanicked { label: String, message: String },

    #[error("task scheduler is shut down")]
    SchedulerClosed,

    #[error("pass for {0} was dropped before it reported")]
    Abandoned(SwarmId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmErrorKind {
    Build,
    Config,
    Placement,
    Uptest,
    Routing,
    Timeout,
    Store,
    Internal,
}

impl SwarmError {
    pub fn kind(&self) -> SwarmErrorKind {
        match self {
            SwarmError::BuildFailed { .. }
            | SwarmError::Build(_)
            | SwarmError::WaitExpired { .. } => SwarmErrorKind::Build,
            SwarmError::ReleaseConfig { .. }
            | SwarmError::Release(_)
            | SwarmError::UnknownApp(_)
            | SwarmError::NoHosts(_) => SwarmErrorKind::Config,
            SwarmError::NoFreePort { .. } | SwarmError::Remote { .. } => {
                SwarmErrorKind::Placement
            }
            SwarmError::Balancer(_) => SwarmErrorKind::Routing,
            SwarmError::UptestFailed { .. } => SwarmErrorKind::Uptest,
            SwarmError::StageFailed { stage, .. } => match stage {
                Stage::Build => SwarmErrorKind::Build,
                Stage::Release => SwarmErrorKind::Config,
                Stage::Uptest => SwarmErrorKind::Uptest,
                Stage::Routing => SwarmErrorKind::Routing,
                Stage::Snapshot | Stage::Placement | Stage::Cleanup => SwarmErrorKind::Placement,
            },
            SwarmError::Timeout { .. } => SwarmErrorKind::Timeout,
            SwarmError::Store(_) => SwarmErrorKind::Store,
            SwarmError::TaskPanicked { .. }
            | SwarmError::SchedulerClosed
            | SwarmError::Abandoned(_) => SwarmErrorKind::Internal,
        }
    }

    /// Host the error happened on, when it is tied to one.
    pub fn host(&self) -> Option<&str> {
        match self {
            SwarmError::Remote { host, .. } | SwarmError::NoFreePort { host } => {
                Some(host.as_str())
            }
            _ => None,
        }
    }

    /// Sibling failures carried by a barrier error.
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            SwarmError::StageFailed { failures, .. } | SwarmError::UptestFailed { failures } => {
                failures
            }
            _ => &[],
        }
    }

    pub fn remote(host: impl Into<String>, source: RemoteError) -> Self {
        SwarmError::Remote {
            host: host.into(),
            source,
        }
    }
}

/// Barrier join: all results or every failure.
pub fn collect_stage<T>(
    stage: Stage,
    results: Vec<Result<T, SwarmError>>,
) -> Result<Vec<T>, SwarmError> {
    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err) => failures.push(TaskFailure::from_error(&err)),
        }
    }

    if failures.is_empty() {
        Ok(values)
    } else {
        Err(SwarmError::StageFailed { stage, failures })
    }
}
