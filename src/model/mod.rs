// ABOUTME: Records the reconciler reads and writes: swarms, builds, releases, instances, test runs.
// ABOUTME: Plain data with small invariants; persistence lives in store, behavior in swarm.

mod build;
mod instance;
mod release;
mod swarm;
mod test_run;

pub use build::{Artifact, Build, BuildKey, BuildStatus};
pub use instance::{Instance, InstanceDescriptor, instance_name};
pub use release::{Release, ReleaseConfig, ReleaseError};
pub use swarm::{PoolAssignment, Swarm};
pub use test_run::{TestResult, TestRun, UptestOutcome};
