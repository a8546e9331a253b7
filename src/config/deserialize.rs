// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Accepts hosts as short address strings or detailed maps.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::HostConfig;

pub fn deserialize_hosts<'de, D>(deserializer: D) -> Result<NonEmpty<HostConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<HostEntry> = Vec::deserialize(deserializer)?;
    let hosts = values
        .into_iter()
        .map(HostEntry::into_host_config)
        .collect::<Result<Vec<_>, _>>()
        .map_err(serde::de::Error::custom)?;

    NonEmpty::from_vec(hosts).ok_or_else(|| serde::de::Error::custom("at least one host is required"))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HostEntry {
    Simple(String),
    Detailed(HostConfig),
}

impl HostEntry {
    fn into_host_config(self) -> Result<HostConfig, String> {
        match self {
            HostEntry::Simple(s) => HostConfig::parse(&s),
            HostEntry::Detailed(c) => Ok(c),
        }
    }
}
