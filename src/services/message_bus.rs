//! Topic-addressed, priority-ordered task bus backed by a durable queue store.
//!
//! All bus state lives behind a single mutex. Store writes happen while the
//! mutex is held, so the durable record and the in-memory transition it
//! accompanies are never observed apart. Extraction is recorded too, so a
//! task taken by one process is not handed out again by the next one to open
//! the store. Subscriber callbacks and observer hooks run after the mutex is
//! released.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    agent_type_of, BusConfig, QueueKey, Task, TaskResult, TopicQueue,
};
use crate::domain::ports::{QueueStore, StoredResult, StoredTask, TaskObserver};

/// Handle returned by [`MessageBus::subscribe`].
pub type SubscriptionId = u64;

/// Callback invoked synchronously for every task published to a topic.
pub type TaskCallback = Arc<dyn Fn(&Task) + Send + Sync>;

/// A pending task as seen by readers of the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTask {
    pub task: Task,
    pub topic: String,
    pub enqueued_at: DateTime<Utc>,
    /// Extracted by a consumer but not yet completed.
    pub in_flight: bool,
}

struct TaskEntry {
    task: Task,
    topic: String,
    sequence: u64,
    enqueued_at: DateTime<Utc>,
}

impl TaskEntry {
    fn key(&self) -> QueueKey {
        QueueKey::new(self.task.priority, self.sequence)
    }
}

struct CompletedEntry {
    agent_type: String,
    result: TaskResult,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, TopicQueue<Uuid>>,
    /// Every published, not yet completed task (queued or in flight).
    entries: HashMap<Uuid, TaskEntry>,
    /// Consumed tasks and their lease deadline, if leases are enabled.
    in_flight: HashMap<Uuid, Option<DateTime<Utc>>>,
    completed: HashMap<Uuid, CompletedEntry>,
    notifiers: HashMap<String, Arc<Notify>>,
    next_sequence: u64,
}

impl BusState {
    fn notifier(&mut self, topic: &str) -> Arc<Notify> {
        Arc::clone(
            self.notifiers
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    fn depth(&self, topic: &str) -> usize {
        self.queues.get(topic).map_or(0, TopicQueue::len)
    }

    fn enqueue(&mut self, topic: &str, task_id: Uuid, key: QueueKey) {
        self.queues
            .entry(topic.to_string())
            .or_default()
            .enqueue(task_id, key);
    }

    fn wake(&mut self, topic: &str) {
        self.notifier(topic).notify_waiters();
    }

    fn dequeue(&mut self, topic: &str) -> Option<Uuid> {
        self.queues.get_mut(topic).and_then(|queue| queue.dequeue())
    }
}

/// Recovered bus state plus the ids whose stored lease had already expired.
struct Recovered {
    state: BusState,
    expired_leases: Vec<Uuid>,
}

/// Task bus shared by submitters, consumers and the performance monitor.
pub struct MessageBus {
    store: Arc<dyn QueueStore>,
    config: BusConfig,
    state: Mutex<BusState>,
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, TaskCallback)>>>,
    next_subscription: AtomicU64,
    observers: RwLock<Vec<Weak<dyn TaskObserver>>>,
}

impl MessageBus {
    /// Open the bus, replaying every durably recorded task.
    ///
    /// Pending tasks are restored to their topic queues in original
    /// priority/FIFO order. Any inconsistency in the store is fatal.
    #[instrument(skip_all, err)]
    pub async fn open(store: Arc<dyn QueueStore>, config: BusConfig) -> DomainResult<Self> {
        let pending = store
            .load_pending()
            .await
            .map_err(|e| DomainError::RecoveryFailed(format!("loading pending tasks: {e}")))?;
        let results = store
            .load_results()
            .await
            .map_err(|e| DomainError::RecoveryFailed(format!("loading results: {e}")))?;

        let Recovered {
            state,
            expired_leases,
        } = Self::recover_state(pending, results, Utc::now())?;

        for task_id in &expired_leases {
            store.release(*task_id).await.map_err(|e| {
                DomainError::RecoveryFailed(format!("releasing expired lease of {task_id}: {e}"))
            })?;
        }

        info!(
            pending = state.entries.len(),
            completed = state.completed.len(),
            in_flight = state.in_flight.len(),
            reclaimed = expired_leases.len(),
            topics = state.queues.len(),
            "Message bus recovered"
        );

        Ok(Self {
            store,
            config,
            state: Mutex::new(state),
            subscribers: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            observers: RwLock::new(Vec::new()),
        })
    }

    /// Rebuild bus state from store contents.
    ///
    /// Extracted tasks stay in flight until completed, unless their lease
    /// expired before `now`, in which case they are queued again.
    fn recover_state(
        pending: Vec<StoredTask>,
        results: Vec<StoredResult>,
        now: DateTime<Utc>,
    ) -> DomainResult<Recovered> {
        let mut state = BusState::default();
        let mut expired_leases = Vec::new();

        for stored in results {
            let task_id = stored.result.task_id;
            let entry = CompletedEntry {
                agent_type: stored.agent_type,
                result: stored.result,
            };
            if state.completed.insert(task_id, entry).is_some() {
                return Err(DomainError::RecoveryFailed(format!(
                    "task {task_id} has more than one result"
                )));
            }
        }

        let mut last_sequence: Option<u64> = None;
        for stored in pending {
            let StoredTask {
                task,
                topic,
                sequence,
                enqueued_at,
                consumed_at,
                lease_expires_at,
            } = stored;

            if state.completed.contains_key(&task.id) {
                return Err(DomainError::RecoveryFailed(format!(
                    "task {} is both pending and completed",
                    task.id
                )));
            }
            task.validate().map_err(DomainError::RecoveryFailed)?;
            if agent_type_of(&topic) != Some(task.agent_type.as_str()) {
                return Err(DomainError::RecoveryFailed(format!(
                    "task {} is recorded on topic '{}' but targets agent type '{}'",
                    task.id, topic, task.agent_type
                )));
            }
            if last_sequence.is_some_and(|last| sequence <= last) {
                return Err(DomainError::RecoveryFailed(format!(
                    "task {} has out-of-order sequence {}",
                    task.id, sequence
                )));
            }
            if consumed_at.is_none() && lease_expires_at.is_some() {
                return Err(DomainError::RecoveryFailed(format!(
                    "task {} has a lease but was never extracted",
                    task.id
                )));
            }
            last_sequence = Some(sequence);

            let entry = TaskEntry {
                task,
                topic,
                sequence,
                enqueued_at,
            };
            let key = entry.key();
            let task_id = entry.task.id;
            let topic = entry.topic.clone();
            state.entries.insert(task_id, entry);

            match (consumed_at, lease_expires_at) {
                (None, _) => state.enqueue(&topic, task_id, key),
                (Some(_), Some(deadline)) if deadline <= now => {
                    expired_leases.push(task_id);
                    state.enqueue(&topic, task_id, key);
                }
                (Some(_), deadline) => {
                    state.in_flight.insert(task_id, deadline);
                }
            }
        }

        state.next_sequence = last_sequence.map_or(0, |last| last + 1);
        Ok(Recovered {
            state,
            expired_leases,
        })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Insert `task` into `topic`'s queue after recording it durably.
    ///
    /// `topic` must be `agent.<task.agent_type>`.
    #[instrument(skip(self, task), fields(task_id = %task.id, priority = %task.priority), err)]
    pub async fn publish(&self, topic: &str, task: Task) -> DomainResult<Uuid> {
        task.validate().map_err(DomainError::ValidationFailed)?;
        if agent_type_of(topic) != Some(task.agent_type.as_str()) {
            return Err(DomainError::ValidationFailed(format!(
                "Task {} targets agent type '{}' but was published to topic '{}'",
                task.id, task.agent_type, topic
            )));
        }

        let task_id = task.id;
        {
            let mut state = self.state.lock().await;
            if state.entries.contains_key(&task_id) || state.completed.contains_key(&task_id) {
                return Err(DomainError::DuplicateTask(task_id));
            }

            let entry = TaskEntry {
                task: task.clone(),
                topic: topic.to_string(),
                sequence: state.next_sequence,
                enqueued_at: Utc::now(),
            };
            self.store
                .save_pending(&StoredTask::queued(
                    entry.task.clone(),
                    entry.topic.clone(),
                    entry.sequence,
                    entry.enqueued_at,
                ))
                .await?;

            state.next_sequence += 1;
            let key = entry.key();
            state.entries.insert(task_id, entry);
            state.enqueue(topic, task_id, key);
            state.wake(topic);

            debug!(topic, depth = state.depth(topic), "Task published");
        }

        self.run_subscribers(topic, &task).await;
        Ok(task_id)
    }

    /// Extract the next task of `topic`, waiting up to `timeout` for one.
    ///
    /// Returns `None` when the timeout elapses or the extraction cannot be
    /// recorded. A task handed out here is never handed out again, by this
    /// process or a later one, unless its lease expires and is reclaimed.
    pub async fn consume(&self, topic: &str, timeout: Duration) -> Option<Task> {
        let deadline = Instant::now() + timeout;

        loop {
            let mut state = self.state.lock().await;
            match self.claim_next(&mut state, topic).await {
                Ok(Some((task, enqueued_at))) => {
                    drop(state);
                    debug!(task_id = %task.id, topic, "Task consumed");
                    self.notify_started(&task, enqueued_at).await;
                    return Some(task);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(topic, error = %e, "Failed to record task extraction");
                    return None;
                }
            }

            // Registered before the lock is released so a concurrent publish cannot be missed.
            let notify = state.notifier(topic);
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Extract the most urgent task of `topic` and record the extraction.
    ///
    /// A task the store reports as already extracted was taken by another
    /// process sharing the store; it is marked in flight and skipped. On a
    /// store error the task goes back to its queue position.
    async fn claim_next(
        &self,
        state: &mut BusState,
        topic: &str,
    ) -> DomainResult<Option<(Task, DateTime<Utc>)>> {
        while let Some(task_id) = state.dequeue(topic) {
            let Some(entry) = state.entries.get(&task_id) else {
                continue;
            };
            let (task, enqueued_at, key) = (entry.task.clone(), entry.enqueued_at, entry.key());

            let now = Utc::now();
            let lease_expires_at = self.lease_deadline(now);
            match self.store.mark_consumed(task_id, now, lease_expires_at).await {
                Ok(true) => {
                    state.in_flight.insert(task_id, lease_expires_at);
                    return Ok(Some((task, enqueued_at)));
                }
                Ok(false) => {
                    debug!(task_id = %task_id, topic, "Task already extracted elsewhere");
                    state.in_flight.insert(task_id, None);
                }
                Err(e) => {
                    state.enqueue(topic, task_id, key);
                    return Err(e);
                }
            }
        }
        Ok(None)
    }

    fn lease_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.config
            .visibility_timeout()
            .and_then(|lease| chrono::Duration::from_std(lease).ok())
            .map(|lease| now + lease)
    }

    /// Move a task from pending to completed, persisting its result.
    ///
    /// Fails on an already-completed id, an unknown id, or a result that does
    /// not belong to `task_id`. The first stored result is never replaced.
    #[instrument(skip(self, result), fields(status = %result.status), err)]
    pub async fn complete_task(&self, task_id: Uuid, result: TaskResult) -> DomainResult<()> {
        let (task, depth) = {
            let mut state = self.state.lock().await;
            if state.completed.contains_key(&task_id) {
                return Err(DomainError::AlreadyCompleted(task_id));
            }
            let agent_type = match state.entries.get(&task_id) {
                Some(entry) => entry.task.agent_type.clone(),
                None => return Err(DomainError::TaskNotFound(task_id)),
            };
            if result.task_id != task_id {
                return Err(DomainError::ValidationFailed(format!(
                    "Result for task {} submitted as completion of {}",
                    result.task_id, task_id
                )));
            }
            result.validate().map_err(DomainError::ValidationFailed)?;

            self.store.record_completion(&agent_type, &result).await?;

            let entry = state
                .entries
                .remove(&task_id)
                .ok_or(DomainError::TaskNotFound(task_id))?;
            state.in_flight.remove(&task_id);
            if let Some(queue) = state.queues.get_mut(&entry.topic) {
                queue.remove_matching(|id| *id == task_id);
            }
            let depth = state.depth(&entry.topic);
            state.completed.insert(
                task_id,
                CompletedEntry {
                    agent_type,
                    result: result.clone(),
                },
            );
            (entry.task, depth)
        };

        info!(
            agent_type = %task.agent_type,
            duration_secs = result.duration_secs,
            queue_depth = depth,
            "Task completed"
        );
        self.notify_completed(&task, &result, depth).await;
        Ok(())
    }

    /// Return expired in-flight tasks to their queues at their original position.
    ///
    /// No-op unless a visibility timeout is configured. Returns the ids reclaimed.
    pub async fn reclaim_expired_leases(&self) -> Vec<Uuid> {
        let now = Utc::now();
        let mut state = self.state.lock().await;

        let expired: Vec<Uuid> = state
            .in_flight
            .iter()
            .filter(|(_, deadline)| deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| *id)
            .collect();

        let mut reclaimed = Vec::with_capacity(expired.len());
        for task_id in expired {
            let Some((topic, key)) = state
                .entries
                .get(&task_id)
                .map(|entry| (entry.topic.clone(), entry.key()))
            else {
                state.in_flight.remove(&task_id);
                continue;
            };
            if let Err(e) = self.store.release(task_id).await {
                warn!(task_id = %task_id, error = %e, "Failed to release expired lease");
                continue;
            }
            state.in_flight.remove(&task_id);
            state.enqueue(&topic, task_id, key);
            state.wake(&topic);
            warn!(task_id = %task_id, topic = %topic, "Lease expired, task returned to queue");
            reclaimed.push(task_id);
        }

        reclaimed
    }

    /// Number of tasks queued on `topic` and not yet consumed.
    pub async fn get_queue_depth(&self, topic: &str) -> usize {
        self.state.lock().await.depth(topic)
    }

    /// Queue depth of every topic that has ever held a task.
    pub async fn queue_depths(&self) -> BTreeMap<String, usize> {
        let state = self.state.lock().await;
        state
            .queues
            .iter()
            .map(|(topic, queue)| (topic.clone(), queue.len()))
            .collect()
    }

    /// Enqueue times of the tasks still waiting on each topic.
    pub async fn queued_enqueue_times(&self) -> HashMap<String, Vec<DateTime<Utc>>> {
        let state = self.state.lock().await;
        state
            .queues
            .iter()
            .map(|(topic, queue)| {
                let times = queue
                    .iter()
                    .filter_map(|id| state.entries.get(id).map(|e| e.enqueued_at))
                    .collect();
                (topic.clone(), times)
            })
            .collect()
    }

    /// Every pending task (queued or in flight), optionally for one agent type,
    /// ordered by priority then publish order.
    pub async fn get_pending_tasks(&self, agent_type: Option<&str>) -> Vec<PendingTask> {
        let state = self.state.lock().await;
        let mut entries: Vec<&TaskEntry> = state
            .entries
            .values()
            .filter(|entry| agent_type.is_none_or(|a| entry.task.agent_type == a))
            .collect();
        entries.sort_by_key(|entry| entry.key());

        entries
            .into_iter()
            .map(|entry| PendingTask {
                task: entry.task.clone(),
                topic: entry.topic.clone(),
                enqueued_at: entry.enqueued_at,
                in_flight: state.in_flight.contains_key(&entry.task.id),
            })
            .collect()
    }

    /// Original enqueue time of a pending task.
    pub async fn enqueued_at(&self, task_id: Uuid) -> Option<DateTime<Utc>> {
        let state = self.state.lock().await;
        state.entries.get(&task_id).map(|entry| entry.enqueued_at)
    }

    /// Whether the bus knows `task_id` as pending or completed.
    pub async fn contains(&self, task_id: Uuid) -> bool {
        let state = self.state.lock().await;
        state.entries.contains_key(&task_id) || state.completed.contains_key(&task_id)
    }

    /// Result of a completed task, consulting the store for results written
    /// by another process sharing it.
    pub async fn get_result(&self, task_id: Uuid) -> DomainResult<Option<TaskResult>> {
        {
            let state = self.state.lock().await;
            if let Some(done) = state.completed.get(&task_id) {
                return Ok(Some(done.result.clone()));
            }
        }
        self.store.get_result(task_id).await
    }

    /// Every completed result with its agent type, oldest first.
    pub async fn completed_history(&self) -> Vec<(String, TaskResult)> {
        let state = self.state.lock().await;
        let mut history: Vec<(String, TaskResult)> = state
            .completed
            .values()
            .map(|done| (done.agent_type.clone(), done.result.clone()))
            .collect();
        history.sort_by(|a, b| {
            a.1.completed_at
                .cmp(&b.1.completed_at)
                .then_with(|| a.1.task_id.cmp(&b.1.task_id))
        });
        history
    }

    /// Register a callback run for each task published to `topic`.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let mut removed = false;
        for callbacks in subscribers.values_mut() {
            let before = callbacks.len();
            callbacks.retain(|(sub_id, _)| *sub_id != id);
            removed |= callbacks.len() != before;
        }
        subscribers.retain(|_, callbacks| !callbacks.is_empty());
        removed
    }

    /// Attach a lifecycle observer. The bus holds it weakly.
    pub async fn attach_observer(&self, observer: Weak<dyn TaskObserver>) {
        let mut observers = self.observers.write().await;
        observers.retain(|o| o.strong_count() > 0);
        observers.push(observer);
    }

    async fn run_subscribers(&self, topic: &str, task: &Task) {
        let callbacks: Vec<TaskCallback> = self
            .subscribers
            .read()
            .await
            .get(topic)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(task);
        }
    }

    async fn live_observers(&self) -> Vec<Arc<dyn TaskObserver>> {
        self.observers
            .read()
            .await
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    async fn notify_started(&self, task: &Task, enqueued_at: DateTime<Utc>) {
        for observer in self.live_observers().await {
            observer.task_started(task, enqueued_at).await;
        }
    }

    async fn notify_completed(&self, task: &Task, result: &TaskResult, depth: usize) {
        for observer in self.live_observers().await {
            observer.task_completed(task, result, depth).await;
        }
    }
}
