// ABOUTME: Application-wide error types for drover.
// ABOUTME: Configuration and CLI-level failures; pipeline errors live in swarm::SwarmError.

use std::path::PathBuf;
use thiserror::Error;

use crate::swarm::SwarmError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown swarm: {0}")]
    UnknownSwarm(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Swarm(#[from] SwarmError),

    #[error("{0} instances failed uptests")]
    UptestsFailed(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
