// ABOUTME: Diagnostics accumulator for non-fatal warnings during a reconciliation pass.
// ABOUTME: Collects problems that must not fail the pass but belong in its report.

use serde::Serialize;

/// Collects non-fatal warnings during a pass.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn routing_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RoutingFailed,
            message: message.into(),
        }
    }

    pub fn cleanup_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CleanupFailed,
            message: message.into(),
        }
    }

    pub fn cleanup_skipped(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CleanupSkipped,
            message: message.into(),
        }
    }

    pub fn no_uptests(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NoUptests,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// Balancer calls failed; the pool may not match the swarm.
    RoutingFailed,
    /// A stale instance could not be removed.
    CleanupFailed,
    /// Stale instances were left in place.
    CleanupSkipped,
    /// The instances define no health checks.
    NoUptests,
}
