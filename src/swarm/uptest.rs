// ABOUTME: Post-deployment health checks, fanned out one task per host.
// ABOUTME: Any failing check fails the stage; no checks at all is a pass with a warning.

use std::collections::BTreeMap;

use crate::config::HostConfig;
use crate::model::{Instance, TestResult};

use super::error::{Stage, TaskFailure, collect_stage};
use super::primitives::scaled;
use super::{SwarmContext, SwarmError};

/// Results of one uptest stage.
#[derive(Debug, Clone, Default)]
pub struct UptestSummary {
    pub results: Vec<TestResult>,
}

impl UptestSummary {
    /// Total number of checks that ran across all instances.
    pub fn checks(&self) -> usize {
        self.results.iter().map(|r| r.testcount).sum()
    }

    pub fn failures(&self) -> Vec<TaskFailure> {
        self.results
            .iter()
            .flat_map(|result| {
                result.failed_outcomes().map(move |outcome| TaskFailure {
                    host: Some(result.host.clone()),
                    message: format!("{}: {}: {}", result.instance, outcome.name, outcome.output.trim()),
                })
            })
            .collect()
    }
}

/// Run checks for `instances`: one task per host, instances on a host in
/// sequence. An unreachable instance yields a failed result, not an error.
pub async fn check_instances(
    ctx: &SwarmContext,
    hosts: &[HostConfig],
    instances: &[Instance],
) -> Result<Vec<TestResult>, SwarmError> {
    let mut by_host: BTreeMap<&str, Vec<Instance>> = BTreeMap::new();
    for instance in instances {
        by_host.entry(instance.host.as_str()).or_default().push(instance.clone());
    }

    let handles: Vec<_> = by_host
        .into_iter()
        .map(|(name, group)| {
            let host = hosts
                .iter()
                .find(|h| h.name == name)
                .cloned()
                .unwrap_or_else(|| HostConfig::new(name));
            let remote = ctx.remote.clone();
            let timeout = scaled(ctx.settings.timeouts.uptest, group.len());

            ctx.scheduler.submit(format!("uptest {}", host.name), timeout, async move {
                let mut results = Vec::with_capacity(group.len());
                for instance in group {
                    let result = match remote.run_health_checks(&host, &instance.name).await {
                        Ok(outcomes) => TestResult::from_outcomes(&host.name, &instance.name, outcomes),
                        Err(e) => TestResult::unreachable(&host.name, &instance.name, e.to_string()),
                    };
                    results.push(result);
                }
                Ok(results)
            })
        })
        .collect();

    let per_host = collect_stage(Stage::Uptest, ctx.scheduler.join_all(handles).await)?;
    Ok(per_host.into_iter().flatten().collect())
}

/// Check every instance and fail the stage if any check failed.
pub async fn run_uptests(
    ctx: &SwarmContext,
    hosts: &[HostConfig],
    instances: &[Instance],
) -> Result<UptestSummary, SwarmError> {
    let summary = UptestSummary {
        results: check_instances(ctx, hosts, instances).await?,
    };

    let failures = summary.failures();
    if !failures.is_empty() {
        return Err(SwarmError::UptestFailed { failures });
    }
    Ok(summary)
}
