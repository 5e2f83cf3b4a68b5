//! Task Dispatcher (Component I): an abstract `TaskQueue` seam
//! (`submit`/`poll`/`cancel`) plus an in-process `tokio`-backed
//! implementation. Replaces the Celery-specific wiring in
//! `examples/original_source/worker/tasks.py` with a Rust-native worker
//! pool: single-tenant workers (`prefetch = 1`), late acknowledgment (the
//! task only transitions to `SUCCESS`/`FAILURE` once the job function
//! returns), and full error strings surfaced on `FAILURE` (spec §4.I, §5,
//! §9 "Task indirection").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
}

/// The outcome of a completed job, erased to a generic boxed payload so the
/// dispatcher doesn't need to know about `RecognitionResult` specifically —
/// it only moves opaque results between a worker and a poller.
pub type JobOutput = Box<dyn std::any::Any + Send + Sync>;

pub struct TaskRecord {
    pub task_id: Uuid,
    pub state: TaskState,
    pub result: Option<Arc<JobOutput>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub canceled: bool,
}

/// A unit of work submitted to the dispatcher: a boxed async closure that
/// produces an opaque result or an error string.
pub type Job = Pin<Box<dyn Future<Output = Result<JobOutput, String>> + Send>>;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, job: Job) -> Uuid;
    async fn poll(&self, task_id: Uuid) -> Option<TaskStatus>;
    async fn cancel(&self, task_id: Uuid);
}

#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub state: TaskState,
    pub error: Option<String>,
}

/// Single-tenant, `prefetch = 1` in-process worker pool. Each worker thread
/// pulls one job at a time off a shared `mpsc` queue; acknowledgment is
/// implicit and late (the record only updates after the job resolves).
pub struct InMemoryTaskDispatcher {
    records: Arc<RwLock<HashMap<Uuid, TaskRecord>>>,
    sender: mpsc::UnboundedSender<(Uuid, Job)>,
    result_ttl: Duration,
}

impl InMemoryTaskDispatcher {
    /// Spawn `num_workers` single-tenant worker tasks and return the
    /// dispatcher handle. `result_ttl` controls when `poll` stops returning
    /// a completed record (spec's `RESULT_TTL`).
    pub fn new(num_workers: usize, result_ttl: Duration) -> Self {
        let records: Arc<RwLock<HashMap<Uuid, TaskRecord>>> = Arc::new(RwLock::new(HashMap::new()));
        let (sender, receiver) = mpsc::unbounded_channel::<(Uuid, Job)>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker_id in 0..num_workers.max(1) {
            let receiver = receiver.clone();
            let records = records.clone();
            tokio::spawn(async move {
                loop {
                    let next = { receiver.lock().await.recv().await };
                    let Some((task_id, job)) = next else { break };

                    {
                        let mut records = records.write().await;
                        if let Some(record) = records.get_mut(&task_id) {
                            if record.canceled {
                                continue;
                            }
                            record.state = TaskState::Running;
                        }
                    }

                    info!(worker_id, %task_id, "task started");
                    let outcome = job.await;

                    let mut records = records.write().await;
                    let Some(record) = records.get_mut(&task_id) else { continue };
                    if record.canceled {
                        // Job completed but cancellation was requested; the
                        // result is discarded (spec §4.I cancel semantics).
                        record.state = TaskState::Failure;
                        record.error = Some("canceled".to_string());
                        continue;
                    }
                    match outcome {
                        Ok(output) => {
                            record.state = TaskState::Success;
                            record.result = Some(Arc::new(output));
                        }
                        Err(error) => {
                            warn!(%task_id, error, "task failed");
                            record.state = TaskState::Failure;
                            record.error = Some(error);
                        }
                    }
                }
            });
        }

        Self { records, sender, result_ttl }
    }

    /// Drop records older than `result_ttl` whose state is terminal. Call
    /// periodically from a host application's GC loop; not run implicitly.
    pub async fn gc_expired(&self) {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.result_ttl).unwrap_or(chrono::Duration::zero());
        let mut records = self.records.write().await;
        records.retain(|_, record| {
            let terminal = matches!(record.state, TaskState::Success | TaskState::Failure);
            !(terminal && now - record.created_at > ttl)
        });
    }

    /// Fetch the typed result of a successful task, if it's still present
    /// and of the expected type.
    pub async fn result_of<T: 'static + Clone>(&self, task_id: Uuid) -> Option<T> {
        let records = self.records.read().await;
        let record = records.get(&task_id)?;
        let result = record.result.as_ref()?;
        result.downcast_ref::<T>().cloned()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskDispatcher {
    async fn submit(&self, job: Job) -> Uuid {
        let task_id = Uuid::new_v4();
        {
            let mut records = self.records.write().await;
            records.insert(
                task_id,
                TaskRecord {
                    task_id,
                    state: TaskState::Pending,
                    result: None,
                    error: None,
                    created_at: Utc::now(),
                    canceled: false,
                },
            );
        }
        // An unbounded channel only fails to send if every receiver has
        // dropped, which would mean all workers panicked away.
        let _ = self.sender.send((task_id, job));
        task_id
    }

    async fn poll(&self, task_id: Uuid) -> Option<TaskStatus> {
        let records = self.records.read().await;
        let record = records.get(&task_id)?;
        Some(TaskStatus { state: record.state, error: record.error.clone() })
    }

    async fn cancel(&self, task_id: Uuid) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&task_id) {
            record.canceled = true;
            if record.state == TaskState::Pending {
                record.state = TaskState::Failure;
                record.error = Some("canceled".to_string());
            }
        }
    }
}
