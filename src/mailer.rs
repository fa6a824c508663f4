//! Mailer trait and delivery result types.
//!
//! # Why `async_trait`?
//!
//! Delivery backends are chosen by name at runtime (see
//! [`BackendRegistry`](crate::BackendRegistry)) and handed around as
//! `Arc<dyn Mailer>`. Native async traits are not object-safe, so the
//! `async_trait` macro boxes the futures instead. Delivery is I/O-bound; one
//! heap allocation per call does not show up next to network latency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::email::Email;
use crate::error::MailError;

/// Result of a successful email delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Message ID assigned by the provider (or the task id for queued mail)
    pub message_id: String,
}

impl DeliveryResult {
    /// Create a new delivery result with just a message ID.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }
}

/// Capability implemented by every delivery backend.
///
/// ```ignore
/// use mail_dispatch::{Email, Mailer};
/// use mail_dispatch::providers::LoggerMailer;
///
/// let mailer = LoggerMailer::new();
/// let result = mailer.deliver(&email).await?;
/// println!("Sent with ID: {}", result.message_id);
/// ```
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send a single email.
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError>;

    /// Send multiple emails.
    ///
    /// Default implementation calls `deliver()` for each email and stops at
    /// the first failure. Providers with batch APIs can override.
    async fn deliver_many(&self, emails: &[Email]) -> Result<Vec<DeliveryResult>, MailError> {
        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            results.push(self.deliver(email).await?);
        }
        Ok(results)
    }

    /// Open a long-lived connection before a run of deliveries.
    ///
    /// Backends without connection state keep the default no-op.
    async fn open(&self) -> Result<(), MailError> {
        Ok(())
    }

    /// Close whatever `open()` established.
    async fn close(&self) -> Result<(), MailError> {
        Ok(())
    }

    /// Get the provider name (for logging/debugging).
    fn provider_name(&self) -> &'static str {
        "unknown"
    }

    /// Validate configuration.
    ///
    /// Called when a backend is resolved, before any message is handed to it.
    fn validate_config(&self) -> Result<(), MailError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_result_carries_only_message_id() {
        let result = DeliveryResult::new("task-1");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({ "message_id": "task-1" })
        );
    }
}
