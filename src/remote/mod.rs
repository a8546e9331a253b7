// ABOUTME: Remote execution seam: place, remove, list and uptest instances on a host.
// ABOUTME: SshRemote drives the host agent over SSH; tests substitute in-memory fakes.

mod agent;
mod error;
pub mod ssh;

pub use agent::SshRemote;
pub use error::{RemoteError, RemoteErrorKind};

use async_trait::async_trait;

use crate::config::HostConfig;
use crate::model::{Instance, InstanceDescriptor, UptestOutcome};

/// Operations on one host. Implementations must be safe to call
/// concurrently for different hosts.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    async fn place_instance(
        &self,
        host: &HostConfig,
        descriptor: &InstanceDescriptor,
    ) -> Result<(), RemoteError>;

    /// Fails with a `NotFound` kind when the instance is already gone.
    async fn remove_instance(&self, host: &HostConfig, name: &str) -> Result<(), RemoteError>;

    async fn list_instances(&self, host: &HostConfig) -> Result<Vec<Instance>, RemoteError>;

    async fn run_health_checks(
        &self,
        host: &HostConfig,
        name: &str,
    ) -> Result<Vec<UptestOutcome>, RemoteError>;
}
