//! Per-agent-type performance telemetry and bottleneck detection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::message_bus::MessageBus;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    agent_type_of, sort_reports, topic_for, AgentMetrics, BottleneckReport, BottleneckSeverity,
    DurationEstimates, MonitorConfig, QueueThreshold, Task, TaskResult,
};
use crate::domain::ports::TaskObserver;

/// Dashboard row for one agent type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_type: String,
    pub total_tasks: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub success_rate: Option<f64>,
    pub avg_response_secs: Option<f64>,
    pub p95_response_secs: Option<f64>,
    pub p99_response_secs: Option<f64>,
    /// Live depth of the agent's topic.
    pub queue_depth: usize,
    pub avg_queue_wait_secs: Option<f64>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Read-only aggregate for periodic polling by a UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub generated_at: DateTime<Utc>,
    pub agents: Vec<AgentSummary>,
    pub queue_depths: BTreeMap<String, usize>,
    pub bottlenecks: Vec<BottleneckReport>,
}

/// Owns every [`AgentMetrics`]; fed by bus lifecycle events.
pub struct PerformanceMonitor {
    bus: Arc<MessageBus>,
    config: MonitorConfig,
    metrics: RwLock<HashMap<String, AgentMetrics>>,
}

impl PerformanceMonitor {
    pub fn new(bus: Arc<MessageBus>, config: MonitorConfig) -> Self {
        Self {
            bus,
            config,
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Warm the metrics from previously completed results.
    pub async fn seed_from_history(&self, history: &[(String, TaskResult)]) {
        if history.is_empty() {
            return;
        }
        let mut metrics = self.metrics.write().await;
        for (agent_type, result) in history {
            self.entry(&mut metrics, agent_type).record_completion(result);
        }
        debug!(results = history.len(), agents = metrics.len(), "Metrics seeded from history");
    }

    /// Record the queue wait of a task a consumer has just extracted.
    #[instrument(skip(self), err)]
    pub async fn record_task_start(&self, agent_type: &str, task_id: Uuid) -> DomainResult<()> {
        let enqueued_at = self
            .bus
            .enqueued_at(task_id)
            .await
            .ok_or(DomainError::TaskNotFound(task_id))?;
        self.record_queue_wait(agent_type, enqueued_at, Utc::now()).await;
        Ok(())
    }

    /// Fold a completion into the agent's statistics and refresh its queue depth.
    pub async fn record_task_complete(&self, agent_type: &str, result: &TaskResult) {
        let depth = self.bus.get_queue_depth(&topic_for(agent_type)).await;
        self.apply_completion(agent_type, result, depth).await;
    }

    async fn record_queue_wait(&self, agent_type: &str, enqueued_at: DateTime<Utc>, now: DateTime<Utc>) {
        let wait_secs = seconds_between(enqueued_at, now);
        let mut metrics = self.metrics.write().await;
        self.entry(&mut metrics, agent_type).record_queue_wait(wait_secs);
    }

    async fn apply_completion(&self, agent_type: &str, result: &TaskResult, depth: usize) {
        let mut metrics = self.metrics.write().await;
        let entry = self.entry(&mut metrics, agent_type);
        entry.record_completion(result);
        entry.queue_depth = depth;
    }

    fn entry<'a>(
        &self,
        metrics: &'a mut HashMap<String, AgentMetrics>,
        agent_type: &str,
    ) -> &'a mut AgentMetrics {
        metrics
            .entry(agent_type.to_string())
            .or_insert_with(|| AgentMetrics::new(agent_type, self.config.sample_window))
    }

    pub async fn get_metrics(&self, agent_type: &str) -> Option<AgentMetrics> {
        self.metrics.read().await.get(agent_type).cloned()
    }

    /// Every agent's metrics, ordered by agent type.
    pub async fn all_metrics(&self) -> Vec<AgentMetrics> {
        let mut all: Vec<AgentMetrics> = self.metrics.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.agent_type.cmp(&b.agent_type));
        all
    }

    /// Per-agent mean response time, for the workflow optimizer.
    pub async fn duration_estimates(&self) -> DurationEstimates {
        let metrics = self.metrics.read().await;
        metrics
            .values()
            .filter_map(|m| m.avg_response_secs.map(|avg| (m.agent_type.clone(), avg)))
            .fold(
                DurationEstimates::new(self.config.default_estimate_secs),
                |estimates, (agent, avg)| estimates.with_estimate(agent, avg),
            )
    }

    pub async fn detect_bottlenecks(&self) -> Vec<BottleneckReport> {
        self.detect_bottlenecks_at(Utc::now()).await
    }

    /// Classify every agent type against the configured thresholds as of `now`.
    ///
    /// The wait used for queue tiers averages the recorded queue-wait samples
    /// together with the current age of every task still waiting, so a backlog
    /// nobody consumes is visible. Agent types with no wait data and no slow
    /// responses produce no report.
    pub async fn detect_bottlenecks_at(&self, now: DateTime<Utc>) -> Vec<BottleneckReport> {
        let queued = self.bus.queued_enqueue_times().await;
        let metrics = self.metrics.read().await;

        let mut queued_by_agent: HashMap<&str, &Vec<DateTime<Utc>>> = HashMap::new();
        for (topic, times) in &queued {
            if let Some(agent) = agent_type_of(topic) {
                queued_by_agent.insert(agent, times);
            }
        }

        let agent_types: BTreeSet<&str> = metrics
            .keys()
            .map(String::as_str)
            .chain(queued_by_agent.keys().copied())
            .collect();

        let thresholds = &self.config.thresholds;
        let mut reports = Vec::new();

        for agent_type in agent_types {
            let agent_metrics = metrics.get(agent_type);
            let queued_times = queued_by_agent.get(agent_type).copied();
            let depth = queued_times.map_or(0, Vec::len);

            let mut wait_samples: Vec<f64> = agent_metrics
                .map(|m| m.queue_waits.iter().collect())
                .unwrap_or_default();
            if let Some(times) = queued_times {
                wait_samples.extend(times.iter().map(|t| seconds_between(*t, now)));
            }
            let avg_wait = mean(&wait_samples);
            let p95 = agent_metrics.and_then(|m| m.p95_response_secs);

            if let Some(avg_wait) = avg_wait {
                let tier = [
                    (BottleneckSeverity::Critical, thresholds.critical),
                    (BottleneckSeverity::High, Some(thresholds.high)),
                    (BottleneckSeverity::Medium, Some(thresholds.medium)),
                ]
                .into_iter()
                .find_map(|(severity, threshold)| {
                    threshold
                        .filter(|t: &QueueThreshold| t.matches(depth, avg_wait))
                        .map(|t| (severity, t))
                });

                if let Some((severity, threshold)) = tier {
                    reports.push(BottleneckReport {
                        agent_type: agent_type.to_string(),
                        severity,
                        reason: format!(
                            "Queue depth {depth} exceeds {} and average wait {avg_wait:.0}s exceeds {:.0}s",
                            threshold.min_queue_depth, threshold.min_avg_wait_secs
                        ),
                        queue_depth: depth,
                        avg_wait_secs: Some(avg_wait),
                        p95_response_secs: p95,
                        suggested_actions: queue_mitigations(agent_type, severity, depth),
                    });
                }
            }

            if let Some(p95) = p95.filter(|p| *p > thresholds.low_p95_response_secs) {
                reports.push(BottleneckReport {
                    agent_type: agent_type.to_string(),
                    severity: BottleneckSeverity::Low,
                    reason: format!(
                        "p95 response time {p95:.0}s exceeds {:.0}s",
                        thresholds.low_p95_response_secs
                    ),
                    queue_depth: depth,
                    avg_wait_secs: avg_wait,
                    p95_response_secs: Some(p95),
                    suggested_actions: vec![
                        format!("Split long-running {agent_type} tasks into independent subtasks that can run in parallel"),
                        format!("Review the payload size and scope of {agent_type} tasks"),
                    ],
                });
            }
        }

        sort_reports(&mut reports);
        reports
    }

    /// Timestamped snapshot of every agent's metrics, queue depths and bottlenecks.
    ///
    /// Agent types known only from their topic (tasks queued, none started or
    /// completed yet) get a row with zeroed counters.
    pub async fn get_dashboard_data(&self) -> DashboardSnapshot {
        let generated_at = Utc::now();
        let bottlenecks = self.detect_bottlenecks_at(generated_at).await;
        let queue_depths = self.bus.queue_depths().await;

        let mut by_agent: BTreeMap<String, AgentMetrics> = self
            .all_metrics()
            .await
            .into_iter()
            .map(|m| (m.agent_type.clone(), m))
            .collect();
        for agent_type in queue_depths.keys().filter_map(|topic| agent_type_of(topic)) {
            by_agent
                .entry(agent_type.to_string())
                .or_insert_with(|| AgentMetrics::new(agent_type, self.config.sample_window));
        }

        let agents = by_agent
            .into_values()
            .map(|m| AgentSummary {
                queue_depth: queue_depths
                    .get(&topic_for(&m.agent_type))
                    .copied()
                    .unwrap_or(0),
                success_rate: m.success_rate(),
                avg_queue_wait_secs: m.avg_queue_wait_secs(),
                agent_type: m.agent_type,
                total_tasks: m.total_tasks,
                succeeded: m.succeeded,
                failed: m.failed,
                avg_response_secs: m.avg_response_secs,
                p95_response_secs: m.p95_response_secs,
                p99_response_secs: m.p99_response_secs,
                last_completed_at: m.last_completed_at,
            })
            .collect();

        DashboardSnapshot {
            generated_at,
            agents,
            queue_depths,
            bottlenecks,
        }
    }
}

#[async_trait]
impl TaskObserver for PerformanceMonitor {
    async fn task_started(&self, task: &Task, enqueued_at: DateTime<Utc>) {
        self.record_queue_wait(&task.agent_type, enqueued_at, Utc::now())
            .await;
    }

    async fn task_completed(&self, task: &Task, result: &TaskResult, queue_depth: usize) {
        self.apply_completion(&task.agent_type, result, queue_depth)
            .await;
    }
}

fn queue_mitigations(agent_type: &str, severity: BottleneckSeverity, depth: usize) -> Vec<String> {
    let mut actions = vec![
        format!("Parallelize independent {agent_type} tasks across additional workers"),
        format!("Reprioritize the {depth} queued {agent_type} tasks so urgent work dequeues first"),
    ];
    if severity.is_alerting() {
        actions.push(format!(
            "Escalate: {agent_type} cannot keep pace with incoming work"
        ));
    }
    actions
}

#[allow(clippy::cast_precision_loss)]
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds() as f64 / 1000.0).max(0.0)
}

#[allow(clippy::cast_precision_loss)]
fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteQueueStore};
    use crate::domain::models::BusConfig;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::time::Duration;

    async fn setup() -> (Arc<MessageBus>, Arc<PerformanceMonitor>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteQueueStore::new(pool));
        let bus = Arc::new(MessageBus::open(store, BusConfig::default()).await.unwrap());
        let monitor = Arc::new(PerformanceMonitor::new(
            Arc::clone(&bus),
            MonitorConfig::default(),
        ));
        let observer: Arc<dyn TaskObserver> = monitor.clone();
        bus.attach_observer(Arc::downgrade(&observer)).await;
        (bus, monitor)
    }

    #[tokio::test]
    async fn test_metrics_created_on_first_event() {
        let (bus, monitor) = setup().await;
        assert!(monitor.get_metrics("build").await.is_none());

        let task = Task::new("build", json!({}));
        bus.publish("agent.build", task.clone()).await.unwrap();
        bus.consume("agent.build", Duration::ZERO).await.unwrap();
        bus.complete_task(task.id, TaskResult::success(task.id, json!(null), Duration::from_secs(12)))
            .await
            .unwrap();

        let metrics = monitor.get_metrics("build").await.unwrap();
        assert_eq!(metrics.total_tasks, 1);
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.queue_waits.len(), 1);
        assert_eq!(metrics.avg_response_secs, Some(12.0));
    }

    #[tokio::test]
    async fn test_record_task_start_for_unknown_task() {
        let (_, monitor) = setup().await;
        let err = monitor
            .record_task_start("build", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_record_task_complete_refreshes_depth() {
        let (bus, monitor) = setup().await;
        for _ in 0..3 {
            bus.publish("agent.lint", Task::new("lint", json!({}))).await.unwrap();
        }
        let result = TaskResult::failure(Uuid::new_v4(), "external", Duration::from_secs(1));
        monitor.record_task_complete("lint", &result).await;

        let metrics = monitor.get_metrics("lint").await.unwrap();
        assert_eq!(metrics.queue_depth, 3);
        assert_eq!(metrics.failed, 1);
    }

    #[tokio::test]
    async fn test_no_history_means_no_alarm() {
        let (_, monitor) = setup().await;
        assert!(monitor.detect_bottlenecks().await.is_empty());
        let estimates = monitor.duration_estimates().await;
        assert!((estimates.estimate_secs("build") - 60.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_backlog_raises_high_bottleneck() {
        let (bus, monitor) = setup().await;
        for _ in 0..6 {
            bus.publish("agent.build", Task::new("build", json!({}))).await.unwrap();
        }

        let reports = monitor
            .detect_bottlenecks_at(Utc::now() + ChronoDuration::minutes(6))
            .await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].agent_type, "build");
        assert_eq!(reports[0].severity, BottleneckSeverity::High);
        assert_eq!(reports[0].queue_depth, 6);
        assert!(reports[0].suggested_actions.len() >= 3);
    }

    #[tokio::test]
    async fn test_medium_tier() {
        let (bus, monitor) = setup().await;
        for _ in 0..4 {
            bus.publish("agent.test", Task::new("test", json!({}))).await.unwrap();
        }
        let reports = monitor
            .detect_bottlenecks_at(Utc::now() + ChronoDuration::minutes(4))
            .await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, BottleneckSeverity::Medium);
    }

    #[tokio::test]
    async fn test_slow_p95_raises_low() {
        let (_, monitor) = setup().await;
        let history: Vec<(String, TaskResult)> = (0..20)
            .map(|_| {
                (
                    "docs".to_string(),
                    TaskResult::success(Uuid::new_v4(), json!(null), Duration::from_secs(900)),
                )
            })
            .collect();
        monitor.seed_from_history(&history).await;

        let reports = monitor.detect_bottlenecks().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, BottleneckSeverity::Low);

        let estimates = monitor.duration_estimates().await;
        assert!((estimates.estimate_secs("docs") - 900.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_critical_tier_when_configured() {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteQueueStore::new(pool));
        let bus = Arc::new(MessageBus::open(store, BusConfig::default()).await.unwrap());
        let mut config = MonitorConfig::default();
        config.thresholds.critical = Some(QueueThreshold::new(8, 600.0));
        let monitor = PerformanceMonitor::new(Arc::clone(&bus), config);

        for _ in 0..10 {
            bus.publish("agent.build", Task::new("build", json!({}))).await.unwrap();
        }
        let reports = monitor
            .detect_bottlenecks_at(Utc::now() + ChronoDuration::minutes(15))
            .await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].severity, BottleneckSeverity::Critical);
    }

    #[tokio::test]
    async fn test_dashboard_snapshot() {
        let (bus, monitor) = setup().await;
        let task = Task::new("build", json!({}));
        bus.publish("agent.build", task.clone()).await.unwrap();
        bus.publish("agent.build", Task::new("build", json!({}))).await.unwrap();
        bus.consume("agent.build", Duration::ZERO).await.unwrap();
        bus.complete_task(task.id, TaskResult::success(task.id, json!(null), Duration::from_secs(5)))
            .await
            .unwrap();

        let snapshot = monitor.get_dashboard_data().await;
        assert_eq!(snapshot.agents.len(), 1);
        assert_eq!(snapshot.agents[0].queue_depth, 1);
        assert_eq!(snapshot.agents[0].success_rate, Some(1.0));
        assert_eq!(snapshot.queue_depths.get("agent.build"), Some(&1));
        assert!(snapshot.bottlenecks.is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_lists_agents_with_only_queued_tasks() {
        let (bus, monitor) = setup().await;
        let done = Task::new("build", json!({}));
        bus.publish("agent.build", done.clone()).await.unwrap();
        bus.consume("agent.build", Duration::ZERO).await.unwrap();
        bus.complete_task(done.id, TaskResult::success(done.id, json!(null), Duration::from_secs(5)))
            .await
            .unwrap();
        for _ in 0..2 {
            bus.publish("agent.docs", Task::new("docs", json!({}))).await.unwrap();
        }

        let snapshot = monitor.get_dashboard_data().await;
        let agent_types: Vec<&str> = snapshot.agents.iter().map(|a| a.agent_type.as_str()).collect();
        assert_eq!(agent_types, vec!["build", "docs"]);

        let docs = &snapshot.agents[1];
        assert_eq!(docs.queue_depth, 2);
        assert_eq!(docs.total_tasks, 0);
        assert_eq!(docs.succeeded, 0);
        assert_eq!(docs.failed, 0);
        assert!(docs.avg_response_secs.is_none());
        assert!(monitor.get_metrics("docs").await.is_none());
    }
}
