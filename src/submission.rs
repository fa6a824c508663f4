//! The caller-facing side: turn a batch of emails into queued dispatch tasks.
//!
//! ```rust,ignore
//! use mail_dispatch::{Config, Email, InMemoryQueue, SubmissionBackend, BackendParams};
//!
//! let queue = Arc::new(InMemoryQueue::new());
//! let submission = SubmissionBackend::new(Config::from_env()?, queue)?;
//!
//! let options = BackendParams::new()
//!     .with("auth_user", "mailer")
//!     .with("auth_password", "secret");
//! let handles = submission.submit(&emails, &options).await?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::backend::BackendParams;
use crate::codec::encode;
use crate::config::Config;
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::queue::{TaskHandle, TaskPayload, TaskQueue, TaskSignature};

/// Submission option names and the backend parameter each becomes.
pub const OPTION_RENAMES: &[(&str, &str)] = &[("auth_user", "username"), ("auth_password", "password")];

/// Translate submission options into backend parameters.
///
/// Keys in [`OPTION_RENAMES`] are renamed. Any other key is copied unchanged
/// when `pass_through` is set and dropped otherwise.
pub fn translate_options(options: &BackendParams, pass_through: bool) -> BackendParams {
    let mut params = BackendParams::new();
    for (key, value) in options.iter() {
        match OPTION_RENAMES.iter().find(|(from, _)| *from == key.as_str()) {
            Some((_, to)) => params.insert(*to, value.clone()),
            None if pass_through => params.insert(key.clone(), value.clone()),
            None => tracing::debug!(option = %key, "Dropping unrecognised submission option"),
        }
    }
    params
}

/// Queues emails for delivery by a worker.
pub struct SubmissionBackend {
    config: Config,
    signature: TaskSignature,
    queue: Arc<dyn TaskQueue>,
    options: BackendParams,
}

impl SubmissionBackend {
    /// Fails with [`MailError::Configuration`] if `config` is invalid.
    pub fn new(config: Config, queue: Arc<dyn TaskQueue>) -> Result<Self, MailError> {
        config.validate()?;
        Ok(Self {
            signature: TaskSignature::dispatch(config.task.clone()),
            config,
            queue,
            options: BackendParams::new(),
        })
    }

    /// Options used when this backend is driven through [`Mailer`].
    pub fn with_options(mut self, options: BackendParams) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn signature(&self) -> &TaskSignature {
        &self.signature
    }

    /// Encode `emails`, split them into chunks and submit one dispatch task
    /// per chunk, in batch order. Returns one handle per chunk.
    ///
    /// Nothing is submitted if any email fails to encode. A queue error stops
    /// submission; chunks already submitted stay queued.
    pub async fn submit(
        &self,
        emails: &[Email],
        options: &BackendParams,
    ) -> Result<Vec<TaskHandle>, MailError> {
        let params = translate_options(options, self.config.pass_through_options);

        let records = emails
            .iter()
            .map(|email| match (&email.from, &self.config.default_from) {
                (None, Some(from)) => encode(&email.clone().from(from.clone())),
                _ => encode(email),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut handles = Vec::with_capacity(records.len().div_ceil(self.config.chunk_size));
        for chunk in records.chunks(self.config.chunk_size) {
            let payload = TaskPayload::new(chunk.to_vec(), params.clone());
            let handle = self.queue.submit(&self.signature, payload).await?;
            tracing::debug!(
                task_id = %handle.id,
                queue = %handle.queue,
                messages = chunk.len(),
                "Submitted dispatch task"
            );
            #[cfg(feature = "metrics")]
            metrics::counter!("mail_dispatch_chunks_total").increment(1);
            handles.push(handle);
        }

        tracing::info!(
            messages = records.len(),
            tasks = handles.len(),
            "Queued emails for delivery"
        );
        Ok(handles)
    }
}

#[async_trait]
impl Mailer for SubmissionBackend {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        let handles = self.submit(std::slice::from_ref(email), &self.options).await?;
        handles
            .into_iter()
            .next()
            .map(|h| DeliveryResult::new(h.id))
            .ok_or_else(|| MailError::Queue("no task was submitted".into()))
    }

    /// Every email sharing a chunk gets that chunk's task id.
    async fn deliver_many(&self, emails: &[Email]) -> Result<Vec<DeliveryResult>, MailError> {
        let handles = self.submit(emails, &self.options).await?;
        Ok(handles
            .iter()
            .zip(emails.chunks(self.config.chunk_size))
            .flat_map(|(handle, chunk)| chunk.iter().map(|_| DeliveryResult::new(handle.id.clone())))
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "queue"
    }

    fn validate_config(&self) -> Result<(), MailError> {
        self.config.validate()
    }
}
