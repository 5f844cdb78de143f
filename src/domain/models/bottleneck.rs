//! Bottleneck reports produced by each detection pass.

use serde::{Deserialize, Serialize};

/// Severity tier of a bottleneck. Ordering puts the most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl BottleneckSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Whether the background scan should raise this as a warning.
    pub fn is_alerting(&self) -> bool {
        matches!(self, Self::Critical | Self::High)
    }
}

impl std::fmt::Display for BottleneckSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected condition where an agent type cannot keep pace with its work.
///
/// Derived on every detection pass and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    pub agent_type: String,
    pub severity: BottleneckSeverity,
    pub reason: String,
    pub queue_depth: usize,
    pub avg_wait_secs: Option<f64>,
    pub p95_response_secs: Option<f64>,
    pub suggested_actions: Vec<String>,
}

/// Sort reports most severe first, then by agent type for stable output.
pub fn sort_reports(reports: &mut [BottleneckReport]) {
    reports.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.agent_type.cmp(&b.agent_type))
    });
}
