// ABOUTME: Audit records for uptest sweeps.
// ABOUTME: A test run holds one result per instance; zero checks count as a pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TestRunId;

/// One health check outcome as printed by the host agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UptestOutcome {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Passed")]
    pub passed: bool,
    #[serde(rename = "Output", default)]
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub host: String,
    pub instance: String,
    pub passed: bool,
    pub testcount: usize,
    pub results: Vec<UptestOutcome>,
    pub time: DateTime<Utc>,
}

impl TestResult {
    pub fn from_outcomes(
        host: impl Into<String>,
        instance: impl Into<String>,
        results: Vec<UptestOutcome>,
    ) -> Self {
        Self {
            host: host.into(),
            instance: instance.into(),
            passed: results.iter().all(|r| r.passed),
            testcount: results.len(),
            results,
            time: Utc::now(),
        }
    }

    /// A result for an instance whose checks could not be run at all.
    pub fn unreachable(
        host: impl Into<String>,
        instance: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::from_outcomes(
            host,
            instance,
            vec![UptestOutcome {
                name: "remote".to_string(),
                passed: false,
                output: message.into(),
            }],
        )
    }

    pub fn failed_outcomes(&self) -> impl Iterator<Item = &UptestOutcome> {
        self.results.iter().filter(|r| !r.passed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: TestRunId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub results: Vec<TestResult>,
}

impl TestRun {
    pub fn start() -> Self {
        let started_at = Utc::now();
        Self {
            id: TestRunId::new(format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ"))),
            started_at,
            ended_at: None,
            results: Vec::new(),
        }
    }

    pub fn finish(&mut self, results: Vec<TestResult>) {
        self.results = results;
        self.ended_at = Some(Utc::now());
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Human-readable listing of every failed check, one block per check.
    pub fn format_failures(&self) -> String {
        let mut out = String::new();
        for result in self.failures() {
            for outcome in result.failed_outcomes() {
                out.push_str(&format!(
                    "{} on {}: {}\n{}\n",
                    result.instance, result.host, outcome.name, outcome.output
                ));
            }
        }
        out
    }
}
