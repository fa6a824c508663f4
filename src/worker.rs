//! Eager worker over an [`InMemoryQueue`].
//!
//! Pops jobs and runs the dispatch task on them in the current task. Retries
//! scheduled by a run land back on the same queue, so [`Worker::run_pending`]
//! keeps going until the queue is empty or every remaining retry has been
//! dead-lettered.

use std::sync::Arc;

use crate::dispatch::{DispatchReport, DispatchTask};
use crate::error::MailError;
use crate::queue::InMemoryQueue;

/// Totals across the jobs a worker processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub tasks_run: usize,
    /// Runs that failed as a whole and were dead-lettered.
    pub tasks_failed: usize,
    pub messages_sent: usize,
    pub retries_scheduled: usize,
}

pub struct Worker {
    queue: Arc<InMemoryQueue>,
    task: DispatchTask,
}

impl Worker {
    /// `task` should schedule its retries on `queue`.
    pub fn new(queue: Arc<InMemoryQueue>, task: DispatchTask) -> Self {
        Self { queue, task }
    }

    pub fn queue(&self) -> &Arc<InMemoryQueue> {
        &self.queue
    }

    /// Run the oldest job. `None` if the queue is empty.
    ///
    /// A job whose signature names another task, whose body cannot be parsed,
    /// or whose run fails as a whole is dead-lettered and its error returned.
    pub async fn run_next(&self) -> Option<Result<DispatchReport, MailError>> {
        let job = self.queue.pop()?;

        if job.signature.name != self.task.signature().name {
            let err = MailError::Queue(format!("no handler for task '{}'", job.signature.name));
            self.queue.dead_letter(job, err.clone());
            return Some(Err(err));
        }

        let result = match job.payload() {
            Ok(payload) => self.task.run_payload(payload, &job.request()).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            self.queue.dead_letter(job, e.clone());
        }
        Some(result)
    }

    /// Run jobs until the queue is empty.
    pub async fn run_pending(&self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        while let Some(result) = self.run_next().await {
            stats.tasks_run += 1;
            match result {
                Ok(report) => {
                    stats.messages_sent += report.sent();
                    stats.retries_scheduled += report.retries_scheduled();
                }
                Err(_) => stats.tasks_failed += 1,
            }
        }
        tracing::debug!(?stats, "Worker drained queue");
        stats
    }
}
