//! Orchestrator: submission façade and background bottleneck scan.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::message_bus::MessageBus;
use super::performance_monitor::{DashboardSnapshot, PerformanceMonitor};
use super::workflow_optimizer::WorkflowOptimizer;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentMetrics, BottleneckReport, Config, OrchestratorConfig, Task, TaskPriority, TaskResult,
    WorkflowReceipt, WorkflowTaskDef,
};
use crate::domain::ports::{QueueStore, TaskObserver};

const ALERT_CHANNEL_CAPACITY: usize = 256;

struct BackgroundScan {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Entry point for callers: submits work, waits for results and runs the
/// periodic bottleneck scan.
pub struct Orchestrator {
    bus: Arc<MessageBus>,
    monitor: Arc<PerformanceMonitor>,
    optimizer: WorkflowOptimizer,
    config: OrchestratorConfig,
    default_task_timeout_secs: u64,
    alerts_tx: broadcast::Sender<BottleneckReport>,
    background: Mutex<Option<BackgroundScan>>,
}

impl Orchestrator {
    /// Assemble an orchestrator over already-constructed services.
    pub fn new(
        bus: Arc<MessageBus>,
        monitor: Arc<PerformanceMonitor>,
        config: OrchestratorConfig,
    ) -> Self {
        let (alerts_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let default_task_timeout_secs = bus.config().default_task_timeout_secs;
        Self {
            bus,
            monitor,
            optimizer: WorkflowOptimizer::new(),
            config,
            default_task_timeout_secs,
            alerts_tx,
            background: Mutex::new(None),
        }
    }

    /// Recover the bus from `store`, warm the monitor from completed history
    /// and wire the monitor to bus events.
    #[instrument(skip_all, err)]
    pub async fn open(store: Arc<dyn QueueStore>, config: &Config) -> DomainResult<Self> {
        let bus = Arc::new(MessageBus::open(store, config.bus.clone()).await?);
        let monitor = Arc::new(PerformanceMonitor::new(
            Arc::clone(&bus),
            config.monitor.clone(),
        ));

        monitor.seed_from_history(&bus.completed_history().await).await;
        let observer: Arc<dyn TaskObserver> = monitor.clone();
        bus.attach_observer(Arc::downgrade(&observer)).await;

        Ok(Self::new(bus, monitor, config.orchestrator.clone()))
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    /// Publish a single task to `agent.<agent_type>` and return its id.
    ///
    /// Every dependency must name a task the bus already knows.
    #[instrument(skip(self, payload, dependencies), err)]
    pub async fn submit_task(
        &self,
        agent_type: &str,
        payload: serde_json::Value,
        priority: TaskPriority,
        dependencies: Vec<Uuid>,
    ) -> DomainResult<Uuid> {
        let task = Task::new(agent_type, payload)
            .with_priority(priority)
            .with_dependencies(dependencies)
            .with_timeout_secs(self.default_task_timeout_secs);
        self.submit(task).await
    }

    /// Publish a caller-built task.
    pub async fn submit(&self, task: Task) -> DomainResult<Uuid> {
        for dep in &task.dependencies {
            if !self.bus.contains(*dep).await {
                return Err(DomainError::UnknownDependency {
                    task: task.id.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }

        let topic = task.topic();
        let id = self.bus.publish(&topic, task).await?;
        info!(task_id = %id, topic = %topic, "Task submitted");
        Ok(id)
    }

    /// Plan and publish a workflow, batch by batch.
    ///
    /// Nothing is published if any reference is unknown or the dependencies
    /// form a cycle.
    #[instrument(skip_all, fields(task_count = defs.len()), err)]
    pub async fn submit_workflow(&self, defs: Vec<WorkflowTaskDef>) -> DomainResult<WorkflowReceipt> {
        let (tasks, task_ids) = self.build_workflow_tasks(defs).await?;
        let estimates = self.monitor.duration_estimates().await;
        let plan = self.optimizer.create_execution_plan(&tasks, &estimates)?;

        for task in self.optimizer.order_for_publication(&plan, tasks) {
            let topic = task.topic();
            self.bus.publish(&topic, task).await?;
        }

        info!(
            batches = plan.total_batches(),
            tasks = plan.total_tasks(),
            parallelism_factor = plan.parallelism_factor,
            "Workflow submitted"
        );

        Ok(WorkflowReceipt {
            plan,
            task_ids,
            published: true,
        })
    }

    /// Compute the plan `submit_workflow` would produce without publishing.
    pub async fn plan_workflow(&self, defs: Vec<WorkflowTaskDef>) -> DomainResult<WorkflowReceipt> {
        let (tasks, task_ids) = self.build_workflow_tasks(defs).await?;
        let estimates = self.monitor.duration_estimates().await;
        let plan = self.optimizer.create_execution_plan(&tasks, &estimates)?;
        Ok(WorkflowReceipt {
            plan,
            task_ids,
            published: false,
        })
    }

    async fn build_workflow_tasks(
        &self,
        defs: Vec<WorkflowTaskDef>,
    ) -> DomainResult<(Vec<Task>, BTreeMap<String, Uuid>)> {
        let mut task_ids: BTreeMap<String, Uuid> = BTreeMap::new();
        let mut keyed = Vec::with_capacity(defs.len());
        for def in defs {
            if def.key.trim().is_empty() {
                return Err(DomainError::ValidationFailed(
                    "Workflow task key cannot be empty".to_string(),
                ));
            }
            let id = Uuid::new_v4();
            if task_ids.insert(def.key.clone(), id).is_some() {
                return Err(DomainError::ValidationFailed(format!(
                    "Duplicate workflow task key: {}",
                    def.key
                )));
            }
            keyed.push((id, def));
        }

        let mut tasks = Vec::with_capacity(keyed.len());
        for (id, def) in keyed {
            let mut dependencies = Vec::with_capacity(def.depends_on.len());
            for reference in &def.depends_on {
                let dep = match task_ids.get(reference) {
                    Some(dep) => *dep,
                    None => self.resolve_known_task(reference).await.ok_or_else(|| {
                        DomainError::UnknownDependency {
                            task: def.key.clone(),
                            dependency: reference.clone(),
                        }
                    })?,
                };
                dependencies.push(dep);
            }

            let mut task = Task::new(def.agent_type, def.payload)
                .with_priority(def.priority)
                .with_dependencies(dependencies)
                .with_timeout_secs(def.timeout_secs.unwrap_or(self.default_task_timeout_secs));
            task.id = id;
            tasks.push(task);
        }

        Ok((tasks, task_ids))
    }

    /// Id of an already-known task named by its string form.
    async fn resolve_known_task(&self, reference: &str) -> Option<Uuid> {
        let id = Uuid::parse_str(reference).ok()?;
        self.bus.contains(id).await.then_some(id)
    }

    /// Block until `task_id` has a result or `timeout` elapses.
    ///
    /// Polls at the configured interval. A timeout does not cancel the task.
    #[instrument(skip(self), err)]
    pub async fn wait_for_task(&self, task_id: Uuid, timeout: Duration) -> DomainResult<TaskResult> {
        let started = Instant::now();
        let deadline = started + timeout;
        let poll = self.config.wait_poll_interval();

        if let Some(result) = self.bus.get_result(task_id).await? {
            return Ok(result);
        }
        if !self.bus.contains(task_id).await {
            return Err(DomainError::TaskNotFound(task_id));
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(DomainError::WaitTimeout {
                    task_id,
                    waited_secs: started.elapsed().as_secs_f64(),
                });
            }
            tokio::time::sleep(poll.min(deadline - now)).await;

            if let Some(result) = self.bus.get_result(task_id).await? {
                return Ok(result);
            }
        }
    }

    pub async fn get_result(&self, task_id: Uuid) -> DomainResult<Option<TaskResult>> {
        self.bus.get_result(task_id).await
    }

    pub async fn get_metrics(&self) -> Vec<AgentMetrics> {
        self.monitor.all_metrics().await
    }

    pub async fn get_dashboard(&self) -> DashboardSnapshot {
        self.monitor.get_dashboard_data().await
    }

    pub async fn detect_bottlenecks(&self) -> Vec<BottleneckReport> {
        self.monitor.detect_bottlenecks().await
    }

    /// Receiver for HIGH and CRITICAL findings raised by the background scan.
    pub fn alerts(&self) -> broadcast::Receiver<BottleneckReport> {
        self.alerts_tx.subscribe()
    }

    /// One scan pass: reclaim expired leases, then classify bottlenecks.
    pub async fn scan_once(&self) -> Vec<BottleneckReport> {
        run_scan(&self.bus, &self.monitor, &self.alerts_tx).await
    }

    /// Launch the background scan loop.
    pub async fn start(&self) -> DomainResult<()> {
        let mut background = self.background.lock().await;
        if background.is_some() {
            return Err(DomainError::AlreadyRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let bus = Arc::clone(&self.bus);
        let monitor = Arc::clone(&self.monitor);
        let alerts_tx = self.alerts_tx.clone();
        let scan_interval = self.config.scan_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(scan_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            info!(interval_secs = scan_interval.as_secs(), "Bottleneck scan started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_scan(&bus, &monitor, &alerts_tx).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Bottleneck scan shutting down");
                        break;
                    }
                }
            }
        });

        *background = Some(BackgroundScan {
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Signal the background loop to stop and wait for it to exit.
    pub async fn stop(&self) -> DomainResult<()> {
        let scan = self
            .background
            .lock()
            .await
            .take()
            .ok_or(DomainError::NotRunning)?;

        let _ = scan.shutdown_tx.send(());
        if let Err(e) = scan.handle.await {
            warn!(error = %e, "Bottleneck scan task ended abnormally");
        }
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.background.lock().await.is_some()
    }
}

async fn run_scan(
    bus: &MessageBus,
    monitor: &PerformanceMonitor,
    alerts_tx: &broadcast::Sender<BottleneckReport>,
) -> Vec<BottleneckReport> {
    let reclaimed = bus.reclaim_expired_leases().await;
    if !reclaimed.is_empty() {
        info!(count = reclaimed.len(), "Reclaimed expired task leases");
    }

    let reports = monitor.detect_bottlenecks().await;
    for report in &reports {
        if report.severity.is_alerting() {
            warn!(
                agent_type = %report.agent_type,
                severity = %report.severity,
                queue_depth = report.queue_depth,
                avg_wait_secs = report.avg_wait_secs,
                reason = %report.reason,
                "Bottleneck detected"
            );
            // No receivers is not an error.
            let _ = alerts_tx.send(report.clone());
        } else {
            debug!(
                agent_type = %report.agent_type,
                severity = %report.severity,
                reason = %report.reason,
                "Bottleneck detected"
            );
        }
    }
    reports
}
