// ABOUTME: Trace token threaded through one swarm trigger and every event it produces.
// ABOUTME: Generated from the swarm id and the trigger time when the caller gives none.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::SwarmId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive a fresh trace id for a trigger of `swarm` happening now.
    pub fn generate(swarm: &SwarmId) -> Self {
        let now = chrono::Utc::now();
        let mut hasher = Sha256::new();
        hasher.update(swarm.as_str().as_bytes());
        hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
