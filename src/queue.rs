//! The task-queue boundary.
//!
//! A broker is anything implementing [`TaskQueue`]: it accepts a
//! [`TaskPayload`] for a registered task and later hands it to a worker. The
//! crate ships [`InMemoryQueue`], which is what the [`Worker`](crate::Worker)
//! drains; production deployments implement the trait over their broker of
//! choice.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::backend::BackendParams;
use crate::codec::MessageRecord;
use crate::error::MailError;

/// Name the dispatch task is registered under.
pub const DISPATCH_TASK_NAME: &str = "mail_dispatch.send_emails";

/// Queue the dispatch task is routed to unless configured otherwise.
pub const DEFAULT_QUEUE: &str = "mail_dispatch";

/// Default rate limit, in the broker's `count/period` notation.
pub const DEFAULT_RATE_LIMIT: &str = "50/m";

/// How a broker should store task messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Kept in memory only.
    #[default]
    Transient,
    /// Written to disk before being acknowledged.
    Persistent,
}

impl DeliveryMode {
    /// The AMQP-style numeric code (1 = transient, 2 = persistent).
    pub fn code(self) -> u8 {
        match self {
            Self::Transient => 1,
            Self::Persistent => 2,
        }
    }
}

/// Options fixed when a task is registered, not per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Queue the task is routed to.
    pub queue: String,
    pub delivery_mode: DeliveryMode,
    /// e.g. `"50/m"`; `None` for unlimited.
    pub rate_limit: Option<String>,
    /// Whether the broker may discard task results.
    pub ignore_result: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            queue: DEFAULT_QUEUE.to_string(),
            delivery_mode: DeliveryMode::Transient,
            rate_limit: Some(DEFAULT_RATE_LIMIT.to_string()),
            ignore_result: true,
        }
    }
}

/// A registered task: its name plus registration-time options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature {
    pub name: String,
    pub options: TaskOptions,
}

impl TaskSignature {
    pub fn new(name: impl Into<String>, options: TaskOptions) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    /// The dispatch task with the given options.
    pub fn dispatch(options: TaskOptions) -> Self {
        Self::new(DISPATCH_TASK_NAME, options)
    }
}

/// The unit of work: message records plus the backend parameters to deliver
/// them with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub messages: Vec<MessageRecord>,
    #[serde(default)]
    pub backend_params: BackendParams,
}

impl TaskPayload {
    pub fn new(messages: Vec<MessageRecord>, backend_params: BackendParams) -> Self {
        Self {
            messages,
            backend_params,
        }
    }

    pub fn to_json(&self) -> Result<String, MailError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a payload taken off the wire. Malformed JSON is a decoding error.
    pub fn from_json(json: &str) -> Result<Self, MailError> {
        serde_json::from_str(json).map_err(|e| MailError::Decoding(format!("task payload: {}", e)))
    }
}

/// Reference to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: String,
    pub task: String,
    pub queue: String,
}

impl TaskHandle {
    pub fn new(task: &TaskSignature) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task: task.name.clone(),
            queue: task.options.queue.clone(),
        }
    }
}

/// What the queue knows about the run that is currently executing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskRequest {
    /// Id of the running task, if it came from a queue.
    pub id: Option<String>,
    /// How many times this payload has been retried already.
    pub retries: u32,
}

/// Why and how a payload is being resubmitted.
#[derive(Debug, Clone)]
pub struct RetryRequest {
    /// The failure that triggered the retry.
    pub cause: MailError,
    /// When true the retry call itself reports failure to the running task.
    /// Dispatch always sends `false`: the task keeps going.
    pub throw: bool,
    /// Retries already spent on this payload before this one.
    pub retries: u32,
}

impl RetryRequest {
    /// A non-throwing retry for `cause`.
    pub fn new(cause: MailError, request: &TaskRequest) -> Self {
        Self {
            cause,
            throw: false,
            retries: request.retries,
        }
    }
}

/// An asynchronous job-submission and retry-scheduling service.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue `payload` for `task`.
    async fn submit(&self, task: &TaskSignature, payload: TaskPayload)
        -> Result<TaskHandle, MailError>;

    /// Enqueue `payload` again as a retry of a failed run.
    ///
    /// The queue applies its own retry-count and backoff policy and may
    /// refuse, e.g. once retries are exhausted.
    async fn schedule_retry(
        &self,
        task: &TaskSignature,
        payload: TaskPayload,
        retry: RetryRequest,
    ) -> Result<TaskHandle, MailError>;
}

/// A job as stored by [`InMemoryQueue`].
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub handle: TaskHandle,
    pub signature: TaskSignature,
    /// JSON-encoded [`TaskPayload`].
    pub body: String,
    /// Retries spent so far (0 for a first submission).
    pub retries: u32,
    /// Set for retry jobs.
    pub retry: Option<RetryRequest>,
}

impl QueuedJob {
    pub fn payload(&self) -> Result<TaskPayload, MailError> {
        TaskPayload::from_json(&self.body)
    }

    /// The request a worker runs this job under.
    pub fn request(&self) -> TaskRequest {
        TaskRequest {
            id: Some(self.handle.id.clone()),
            retries: self.retries,
        }
    }
}

/// A dead-lettered job and the reason it was dropped.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job: QueuedJob,
    pub reason: MailError,
}

/// Default number of retries [`InMemoryQueue`] allows per payload.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// FIFO queue kept in memory.
///
/// Payloads are stored as JSON so everything a real broker would reject is
/// rejected here too. Rate limits and delivery modes are accepted but not
/// enforced.
#[derive(Debug)]
pub struct InMemoryQueue {
    jobs: Mutex<VecDeque<QueuedJob>>,
    dead: Mutex<Vec<DeadLetter>>,
    max_retries: u32,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::with_max_retries(DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            dead: Mutex::new(Vec::new()),
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Take the oldest job.
    pub fn pop(&self) -> Option<QueuedJob> {
        self.jobs.lock().pop_front()
    }

    /// Snapshot of waiting jobs, oldest first.
    pub fn pending(&self) -> Vec<QueuedJob> {
        self.jobs.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Record a job that cannot be processed.
    pub fn dead_letter(&self, job: QueuedJob, reason: MailError) {
        tracing::error!(
            task_id = %job.handle.id,
            task = %job.handle.task,
            reason = %reason,
            "Task dead-lettered"
        );
        self.dead.lock().push(DeadLetter { job, reason });
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead.lock().clone()
    }

    fn enqueue(
        &self,
        task: &TaskSignature,
        payload: &TaskPayload,
        retries: u32,
        retry: Option<RetryRequest>,
    ) -> Result<QueuedJob, MailError> {
        let job = QueuedJob {
            handle: TaskHandle::new(task),
            signature: task.clone(),
            body: payload
                .to_json()
                .map_err(|e| MailError::Queue(e.to_string()))?,
            retries,
            retry,
        };
        self.jobs.lock().push_back(job.clone());
        Ok(job)
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn submit(
        &self,
        task: &TaskSignature,
        payload: TaskPayload,
    ) -> Result<TaskHandle, MailError> {
        let job = self.enqueue(task, &payload, 0, None)?;
        tracing::debug!(
            task_id = %job.handle.id,
            queue = %job.handle.queue,
            messages = payload.messages.len(),
            "Task queued"
        );
        Ok(job.handle)
    }

    async fn schedule_retry(
        &self,
        task: &TaskSignature,
        payload: TaskPayload,
        retry: RetryRequest,
    ) -> Result<TaskHandle, MailError> {
        let retries = retry.retries + 1;

        if retries > self.max_retries || !retry.cause.is_retryable() {
            let reason = if retries > self.max_retries {
                MailError::Queue(format!(
                    "max retries ({}) exceeded: {}",
                    self.max_retries, retry.cause
                ))
            } else {
                MailError::Queue(format!("not retryable: {}", retry.cause))
            };
            let job = QueuedJob {
                handle: TaskHandle::new(task),
                signature: task.clone(),
                body: payload
                    .to_json()
                    .map_err(|e| MailError::Queue(e.to_string()))?,
                retries: retry.retries,
                retry: Some(retry),
            };
            self.dead_letter(job, reason.clone());
            return Err(reason);
        }

        let job = self.enqueue(task, &payload, retries, Some(retry))?;
        tracing::debug!(task_id = %job.handle.id, retries, "Retry queued");
        Ok(job.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::email::Email;

    fn payload(subject: &str) -> TaskPayload {
        let email = Email::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject(subject);
        TaskPayload::new(
            vec![encode(&email).unwrap()],
            BackendParams::new().with("foo", "bar"),
        )
    }

    #[test]
    fn test_default_task_options() {
        let options = TaskOptions::default();
        assert_eq!(options.queue, "mail_dispatch");
        assert_eq!(options.delivery_mode.code(), 1);
        assert_eq!(options.rate_limit.as_deref(), Some("50/m"));
    }

    #[test]
    fn test_payload_json() {
        let payload = payload("hello");
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["backend_params"], serde_json::json!({"foo": "bar"}));
        assert_eq!(json["messages"][0]["subject"], "hello");

        assert_eq!(TaskPayload::from_json(&payload.to_json().unwrap()).unwrap(), payload);
        assert!(matches!(
            TaskPayload::from_json("{not json"),
            Err(MailError::Decoding(_))
        ));
    }

    #[tokio::test]
    async fn test_fifo() {
        let queue = InMemoryQueue::new();
        let task = TaskSignature::dispatch(TaskOptions::default());

        let first = queue.submit(&task, payload("one")).await.unwrap();
        queue.submit(&task, payload("two")).await.unwrap();

        assert_eq!(first.queue, "mail_dispatch");
        assert_eq!(first.task, DISPATCH_TASK_NAME);
        assert_eq!(queue.len(), 2);

        let job = queue.pop().unwrap();
        assert_eq!(job.handle, first);
        assert_eq!(job.payload().unwrap().messages[0].subject, "one");
        assert_eq!(job.request().retries, 0);
    }

    #[tokio::test]
    async fn test_retry_counts_up_then_dead_letters() {
        let queue = InMemoryQueue::with_max_retries(2);
        let task = TaskSignature::dispatch(TaskOptions::default());
        let cause = MailError::Delivery("timeout".into());

        let mut request = TaskRequest::default();
        for expected in 1..=2 {
            queue
                .schedule_retry(&task, payload("x"), RetryRequest::new(cause.clone(), &request))
                .await
                .unwrap();
            let job = queue.pop().unwrap();
            assert_eq!(job.retries, expected);
            assert!(!job.retry.as_ref().unwrap().throw);
            request = job.request();
        }

        let err = queue
            .schedule_retry(&task, payload("x"), RetryRequest::new(cause, &request))
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::Queue(msg) if msg.contains("max retries")));
        assert!(queue.is_empty());
        assert_eq!(queue.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_cause_is_dead_lettered() {
        let queue = InMemoryQueue::new();
        let task = TaskSignature::dispatch(TaskOptions::default());
        let cause = MailError::InvalidAddress("nope".into());

        let result = queue
            .schedule_retry(&task, payload("x"), RetryRequest::new(cause, &TaskRequest::default()))
            .await;

        assert!(result.is_err());
        assert!(queue.is_empty());
        assert_eq!(queue.dead_letters().len(), 1);
    }
}
