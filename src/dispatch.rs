//! The dispatch task: what a worker runs for each queued payload.
//!
//! A run resolves the configured delivery backend, opens it, and sends the
//! payload's messages one at a time. A message that fails is resubmitted on
//! its own as a retry, carrying the same backend parameters; the rest of the
//! batch is unaffected. The run reports how many messages went out.

use std::slice;
use std::sync::Arc;

use tracing::Instrument;

use crate::backend::{BackendParams, BackendRegistry, DeliveryBackend};
use crate::codec::{decode, MessageLike, MessageRecord};
use crate::config::Config;
use crate::email::Email;
use crate::error::MailError;
use crate::queue::{RetryRequest, TaskPayload, TaskQueue, TaskRequest, TaskSignature};

/// What happened to one message of a run.
#[derive(Debug, Clone)]
pub enum MessageOutcome {
    Delivered,
    Failed {
        error: MailError,
        /// Whether the queue accepted the single-message retry.
        retry_scheduled: bool,
    },
}

impl MessageOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Result of one dispatch run, one outcome per input message in input order.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub outcomes: Vec<MessageOutcome>,
}

impl DispatchReport {
    /// Number of messages the backend accepted.
    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.sent()
    }

    pub fn retries_scheduled(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o,
                    MessageOutcome::Failed {
                        retry_scheduled: true,
                        ..
                    }
                )
            })
            .count()
    }
}

/// The registered dispatch task.
#[derive(Clone)]
pub struct DispatchTask {
    signature: TaskSignature,
    backend: String,
    registry: Arc<BackendRegistry>,
    queue: Arc<dyn TaskQueue>,
}

impl DispatchTask {
    /// Build the task from `config`. Retries go to `queue`.
    pub fn new(config: &Config, registry: Arc<BackendRegistry>, queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            signature: TaskSignature::dispatch(config.task.clone()),
            backend: config.backend.clone(),
            registry,
            queue,
        }
    }

    pub fn signature(&self) -> &TaskSignature {
        &self.signature
    }

    pub fn backend_name(&self) -> &str {
        &self.backend
    }

    /// Deliver `messages` with `params`, outside of any queue context.
    ///
    /// Returns `Err` only when the backend cannot be resolved or a message
    /// cannot be decoded; in both cases nothing is sent.
    pub async fn run<I, M>(
        &self,
        messages: I,
        params: BackendParams,
    ) -> Result<DispatchReport, MailError>
    where
        I: IntoIterator<Item = M>,
        M: Into<MessageLike>,
    {
        let records = messages
            .into_iter()
            .map(Into::into)
            .map(MessageLike::into_record)
            .collect::<Result<Vec<_>, _>>()?;
        self.run_payload(TaskPayload::new(records, params), &TaskRequest::default())
            .await
    }

    /// Single-message form of [`run`](Self::run).
    pub async fn run_one(
        &self,
        message: impl Into<MessageLike>,
        params: BackendParams,
    ) -> Result<DispatchReport, MailError> {
        let message: MessageLike = message.into();
        self.run([message], params).await
    }

    /// Execute a payload taken from a queue.
    pub async fn run_payload(
        &self,
        payload: TaskPayload,
        request: &TaskRequest,
    ) -> Result<DispatchReport, MailError> {
        let span = tracing::info_span!(
            "mail_dispatch.dispatch",
            backend = %self.backend,
            task_id = request.id.as_deref().unwrap_or("-"),
            retries = request.retries,
            messages = payload.messages.len(),
        );
        self.execute(payload, request).instrument(span).await
    }

    async fn execute(
        &self,
        payload: TaskPayload,
        request: &TaskRequest,
    ) -> Result<DispatchReport, MailError> {
        let TaskPayload {
            messages,
            backend_params,
        } = payload;

        let backend = self.registry.resolve(&self.backend, &backend_params)?;
        let emails = messages
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = backend.open().await {
            tracing::warn!(backend = %backend.name(), error = %e, "Failed to open backend connection");
        }

        let mut report = DispatchReport::default();
        for (email, record) in emails.iter().zip(messages) {
            let outcome = self
                .send_one(&backend, email, record, &backend_params, request)
                .await;
            report.outcomes.push(outcome);
        }

        if let Err(e) = backend.close().await {
            tracing::warn!(backend = %backend.name(), error = %e, "Failed to close backend connection");
        }

        tracing::info!(
            sent = report.sent(),
            failed = report.failed(),
            "Dispatch run finished"
        );
        Ok(report)
    }

    async fn send_one(
        &self,
        backend: &DeliveryBackend,
        email: &Email,
        record: MessageRecord,
        params: &BackendParams,
        request: &TaskRequest,
    ) -> MessageOutcome {
        let recipients = email.to.iter().map(|a| a.email.as_str()).collect::<Vec<_>>();

        let error = match backend.send(slice::from_ref(email)).await {
            Ok(_) => {
                tracing::debug!(to = ?recipients, subject = %email.subject, "Message sent");
                #[cfg(feature = "metrics")]
                metrics::counter!("mail_dispatch_messages_total", "backend" => backend.provider_name(), "status" => "sent")
                    .increment(1);
                return MessageOutcome::Delivered;
            }
            Err(e) => e,
        };

        tracing::warn!(
            to = ?recipients,
            subject = %email.subject,
            error = %error,
            "Failed to send message, scheduling retry"
        );
        #[cfg(feature = "metrics")]
        metrics::counter!("mail_dispatch_messages_total", "backend" => backend.provider_name(), "status" => "failed")
            .increment(1);

        let retry_payload = TaskPayload::new(vec![record], params.clone());
        let retry = RetryRequest::new(error.clone(), request);
        let retry_scheduled = match self
            .queue
            .schedule_retry(&self.signature, retry_payload, retry)
            .await
        {
            Ok(handle) => {
                tracing::debug!(task_id = %handle.id, "Retry scheduled");
                #[cfg(feature = "metrics")]
                metrics::counter!("mail_dispatch_retries_total").increment(1);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, cause = %error, "Retry was not scheduled");
                false
            }
        };

        MessageOutcome::Failed {
            error,
            retry_scheduled,
        }
    }
}
