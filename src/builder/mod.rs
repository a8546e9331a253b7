// ABOUTME: Build system seam: turn an (app, version) into a deployable artifact.
// ABOUTME: The build coordinator runs builds on their own task and reports completion.

mod command;

pub use command::CommandBuildSystem;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::model::{Artifact, BuildKey};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build command is empty")]
    NoCommand,

    #[error("failed to start build command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("build exited with {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("build timed out after {0:?}")]
    Timeout(Duration),

    #[error("build printed an unreadable result: {0}")]
    BadOutput(String),
}

/// What to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub key: BuildKey,
    pub repo_url: String,
    pub repo_type: String,
}

#[async_trait]
pub trait BuildSystem: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> Result<Artifact, BuildError>;
}
