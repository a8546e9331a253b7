// ABOUTME: Load-balancer node identifier in host:port form.
// ABOUTME: Parses from and serializes to the same "host:port" string the balancer uses.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseNodeError {
    #[error("node must be in host:port form: {0}")]
    MissingPort(String),

    #[error("invalid port in node {node}: {port}")]
    InvalidPort { node: String, port: String },

    #[error("node host cannot be empty")]
    EmptyHost,
}

/// One routable backend: a host and the port an instance listens on there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    host: String,
    port: u16,
}

impl Node {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Node {
    type Err = ParseNodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseNodeError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(ParseNodeError::EmptyHost);
        }
        let port = port.parse::<u16>().map_err(|_| ParseNodeError::InvalidPort {
            node: s.to_string(),
            port: port.to_string(),
        })?;
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
