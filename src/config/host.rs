// ABOUTME: Fleet host configuration: SSH address and the port range instances may use.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use serde::{Deserialize, Deserializer};
use std::fmt;

/// A fleet member instances can be placed on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Fleet identity; also the host part of load-balancer nodes.
    pub name: String,
    /// Address used for SSH; defaults to `name`.
    #[serde(default)]
    pub ssh_host: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub ports: PortRange,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_active() -> bool {
    true
}

impl HostConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ssh_host: None,
            ssh_port: default_ssh_port(),
            user: None,
            ports: PortRange::default(),
            active: true,
        }
    }

    pub fn ports(mut self, ports: PortRange) -> Self {
        self.ports = ports;
        self
    }

    /// Parse the short `[user@]host[:port]` form.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("host address cannot be empty".to_string());
        }

        let (user, rest) = match s.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, s),
        };

        let (host, ssh_port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", port))?;
                (host, port)
            }
            None => (rest, default_ssh_port()),
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(HostConfig {
            name: host.to_string(),
            ssh_host: None,
            ssh_port,
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
            ports: PortRange::default(),
            active: true,
        })
    }

    /// Host to open SSH connections to.
    pub fn ssh_address(&self) -> &str {
        self.ssh_host.as_deref().unwrap_or(&self.name)
    }
}

/// Inclusive range of ports instances on a host may bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, String> {
        if start > end {
            return Err(format!("port range start {} is after end {}", start, end));
        }
        Ok(Self { start, end })
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: 5000,
            end: 5999,
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| serde::de::Error::custom(format!("expected start-end, got {}", s)))?;
        let start = start.trim().parse().map_err(serde::de::Error::custom)?;
        let end = end.trim().parse().map_err(serde::de::Error::custom)?;
        PortRange::new(start, end).map_err(serde::de::Error::custom)
    }
}
