//! # mail-dispatch
//!
//! Hand emails to a task queue and deliver them from workers.
//!
//! The caller-facing [`SubmissionBackend`] encodes a batch of [`Email`]s into
//! plain [`MessageRecord`]s, splits the batch into chunks and submits one
//! dispatch task per chunk. A worker runs the [`DispatchTask`] on each
//! payload: it resolves the configured delivery backend and sends the
//! messages one at a time. A message that fails is resubmitted on its own,
//! so one bad address never holds up the rest of its chunk.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mail_dispatch::{
//!     BackendParams, BackendRegistry, Config, DispatchTask, Email, InMemoryQueue,
//!     SubmissionBackend, Worker,
//! };
//!
//! let config = Config::from_env()?;
//! let queue = Arc::new(InMemoryQueue::new());
//!
//! // Caller side
//! let submission = SubmissionBackend::new(config.clone(), queue.clone())?;
//! let email = Email::new()
//!     .from("noreply@example.com")
//!     .to("user@example.com")
//!     .subject("Welcome!")
//!     .body("Hello");
//! submission
//!     .submit(&[email], &BackendParams::new().with("auth_user", "mailer"))
//!     .await?;
//!
//! // Worker side
//! let task = DispatchTask::new(&config, Arc::new(BackendRegistry::with_defaults()), queue.clone());
//! Worker::new(queue, task).run_pending().await;
//! ```
//!
//! Production deployments implement [`TaskQueue`] over their broker and run
//! [`DispatchTask::run_payload`] from its consumer.
//!
//! ## Feature Flags
//!
//! - `smtp` - SMTP delivery via lettre
//! - `local` - in-memory outbox transport and [`testing`] assertions (default)
//! - `metrics` - Prometheus-style counters
//!
//! ## Metrics
//!
//! Enable `features = ["metrics"]` to emit:
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `mail_dispatch_messages_total` | Counter | backend, status | Per-message delivery attempts |
//! | `mail_dispatch_retries_total` | Counter | | Single-message retries scheduled |
//! | `mail_dispatch_chunks_total` | Counter | | Dispatch tasks submitted |
//!
//! Install a recorder (e.g., `metrics-exporter-prometheus`) in your app to collect them.

/// The version of the mail-dispatch crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod address;
mod attachment;
mod backend;
mod codec;
mod config;
mod dispatch;
mod email;
mod error;
mod mailer;
mod queue;
mod submission;
mod worker;

pub mod providers;

#[cfg(feature = "local")]
mod storage;

#[cfg(feature = "local")]
pub mod testing;

pub use address::{Address, ToAddress};
pub use attachment::{Attachment, AttachmentType};
pub use backend::{BackendFactory, BackendParams, BackendRegistry, DeliveryBackend};
pub use codec::{decode, encode, AttachmentRecord, MessageLike, MessageRecord};
pub use config::{Config, DEFAULT_BACKEND, DEFAULT_CHUNK_SIZE};
pub use dispatch::{DispatchReport, DispatchTask, MessageOutcome};
pub use email::Email;
pub use error::MailError;
pub use mailer::{DeliveryResult, Mailer};
pub use queue::{
    DeadLetter, DeliveryMode, InMemoryQueue, QueuedJob, RetryRequest, TaskHandle, TaskOptions,
    TaskPayload, TaskQueue, TaskRequest, TaskSignature, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE,
    DEFAULT_RATE_LIMIT, DISPATCH_TASK_NAME,
};
pub use submission::{translate_options, SubmissionBackend, OPTION_RENAMES};
pub use worker::{Worker, WorkerStats};

#[cfg(feature = "local")]
pub use storage::{MemoryStorage, Storage, StoredEmail};

/// Everything needed to submit and dispatch mail.
pub mod prelude {
    pub use crate::{
        Address, Attachment, BackendParams, BackendRegistry, Config, DispatchTask, Email,
        InMemoryQueue, MailError, Mailer, MessageLike, MessageRecord, SubmissionBackend,
        TaskQueue, Worker,
    };
}
