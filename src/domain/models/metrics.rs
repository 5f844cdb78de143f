//! Per-agent-type performance metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::result::{ResultStatus, TaskResult};

/// Default number of samples kept per window.
pub const DEFAULT_SAMPLE_WINDOW: usize = 1000;

/// Bounded window of the most recent samples, in seconds.
///
/// Once full, the oldest sample is evicted for each new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity.min(64)),
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    /// Nearest-rank percentile over the sorted samples.
    pub fn percentile(&self, pct: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let pct = pct.clamp(0.0, 100.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

/// Running statistics for one agent type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent_type: String,
    pub total_tasks: u64,
    pub succeeded: u64,
    /// Failures and timeouts.
    pub failed: u64,
    pub response_times: SampleWindow,
    pub avg_response_secs: Option<f64>,
    pub p95_response_secs: Option<f64>,
    pub p99_response_secs: Option<f64>,
    /// Queue depth observed at the most recent completion.
    pub queue_depth: usize,
    pub queue_waits: SampleWindow,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    pub fn new(agent_type: impl Into<String>, window: usize) -> Self {
        Self {
            agent_type: agent_type.into(),
            total_tasks: 0,
            succeeded: 0,
            failed: 0,
            response_times: SampleWindow::new(window),
            avg_response_secs: None,
            p95_response_secs: None,
            p99_response_secs: None,
            queue_depth: 0,
            queue_waits: SampleWindow::new(window),
            last_completed_at: None,
        }
    }

    /// Fold a completion into the counters and response-time statistics.
    pub fn record_completion(&mut self, result: &TaskResult) {
        self.total_tasks += 1;
        match result.status {
            ResultStatus::Success => self.succeeded += 1,
            ResultStatus::Failure | ResultStatus::Timeout => self.failed += 1,
        }
        self.response_times.push(result.duration_secs.max(0.0));
        self.avg_response_secs = self.response_times.mean();
        self.p95_response_secs = self.response_times.percentile(95.0);
        self.p99_response_secs = self.response_times.percentile(99.0);
        self.last_completed_at = Some(
            self.last_completed_at
                .map_or(result.completed_at, |prev| prev.max(result.completed_at)),
        );
    }

    pub fn record_queue_wait(&mut self, wait_secs: f64) {
        self.queue_waits.push(wait_secs.max(0.0));
    }

    pub fn avg_queue_wait_secs(&self) -> Option<f64> {
        self.queue_waits.mean()
    }

    /// Fraction of completed tasks that succeeded.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_tasks == 0 {
            None
        } else {
            Some(self.succeeded as f64 / self.total_tasks as f64)
        }
    }
}
