// ABOUTME: Process-type name validation (web, worker, ...).
// ABOUTME: Hyphens are excluded so instance names stay splittable on '-'.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcNameError {
    #[error("proc name cannot be empty")]
    Empty,

    #[error("proc name exceeds maximum length of 32 characters")]
    TooLong,

    #[error("invalid character in proc name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcName(String);

impl ProcName {
    pub fn new(value: &str) -> Result<Self, ProcNameError> {
        if value.is_empty() {
            return Err(ProcNameError::Empty);
        }
        if value.len() > 32 {
            return Err(ProcNameError::TooLong);
        }
        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '_')
        {
            return Err(ProcNameError::InvalidChar(c));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ProcName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProcName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ProcName::new(&s).map_err(serde::de::Error::custom)
    }
}
