// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Phantom-typed ids, validated app/proc names, nodes, hashes, and trace ids.

mod app_name;
mod id;
mod node;
mod proc_name;
mod release_hash;
mod trace_id;

pub use app_name::{AppName, AppNameError};
pub use id::{BuildId, ReleaseId, SwarmId, TestRunId};
pub use node::{Node, ParseNodeError};
pub use proc_name::{ProcName, ProcNameError};
pub use release_hash::ReleaseHash;
pub use trace_id::TraceId;
