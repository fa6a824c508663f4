//! Local mailer for development and testing.
//!
//! Appends delivered emails to an in-memory outbox that tests can inspect.
//!
//! ```rust,ignore
//! use mail_dispatch::providers::LocalMailer;
//! use mail_dispatch::testing::*;
//!
//! let mailer = LocalMailer::new();
//! send_welcome_email(&mailer, "user@example.com").await;
//! assert_email_to(&mailer, "user@example.com");
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};
use crate::storage::{MemoryStorage, Storage, StoredEmail};

/// Local mailer that stores emails in memory.
pub struct LocalMailer {
    storage: Arc<MemoryStorage>,
    /// If set, deliver() will return this error (for testing error paths).
    fail_with: RwLock<Option<String>>,
}

impl LocalMailer {
    /// Create a new local mailer with a fresh outbox.
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::shared())
    }

    /// Create a local mailer writing to an existing outbox.
    ///
    /// The backend registry builds a new `LocalMailer` per dispatch task, all
    /// writing to the same shared outbox.
    pub fn with_storage(storage: Arc<MemoryStorage>) -> Self {
        Self {
            storage,
            fail_with: RwLock::new(None),
        }
    }

    /// Get a reference to the underlying outbox.
    pub fn storage(&self) -> Arc<MemoryStorage> {
        Arc::clone(&self.storage)
    }

    /// Configure the mailer to fail every delivery with an error message.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.fail_with.write() = Some(message.into());
    }

    /// Clear the failure state.
    pub fn clear_failure(&self) {
        *self.fail_with.write() = None;
    }

    /// Get all captured emails in delivery order.
    pub fn emails(&self) -> Vec<StoredEmail> {
        self.storage.all()
    }

    /// Get the most recently sent email.
    pub fn last_email(&self) -> Option<StoredEmail> {
        self.storage.all().pop()
    }

    /// Get the count of sent emails.
    pub fn email_count(&self) -> usize {
        self.storage.count()
    }

    /// Check if any email was sent.
    pub fn has_emails(&self) -> bool {
        self.storage.count() > 0
    }

    /// Remove and return all captured emails.
    pub fn flush(&self) -> Vec<StoredEmail> {
        self.storage.flush()
    }

    /// Check if an email was sent to a specific address.
    pub fn sent_to(&self, email: &str) -> bool {
        self.storage.all().iter().any(|stored| {
            stored
                .email
                .to
                .iter()
                .any(|addr| addr.email.eq_ignore_ascii_case(email))
        })
    }

    /// Find emails matching a predicate.
    pub fn find_emails<F>(&self, predicate: F) -> Vec<StoredEmail>
    where
        F: Fn(&Email) -> bool,
    {
        self.storage
            .all()
            .into_iter()
            .filter(|stored| predicate(&stored.email))
            .collect()
    }
}

impl Default for LocalMailer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for LocalMailer {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            fail_with: RwLock::new(self.fail_with.read().clone()),
        }
    }
}

#[async_trait]
impl Mailer for LocalMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        if let Some(ref message) = *self.fail_with.read() {
            return Err(MailError::Delivery(message.clone()));
        }

        let message_id = self.storage.push(email.clone());
        Ok(DeliveryResult::new(message_id))
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(subject: &str) -> Email {
        Email::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject(subject)
    }

    #[tokio::test]
    async fn test_local_mailer() {
        let mailer = LocalMailer::new();
        let result = mailer.deliver(&email("Test Email")).await.unwrap();

        let stored = mailer.storage().get(&result.message_id).unwrap();
        assert_eq!(stored.email.subject, "Test Email");
        assert!(mailer.sent_to("RECIPIENT@example.com"));
    }

    #[tokio::test]
    async fn test_outbox_keeps_delivery_order() {
        let mailer = LocalMailer::new();
        for subject in ["one", "two", "three"] {
            mailer.deliver(&email(subject)).await.unwrap();
        }

        let subjects: Vec<_> = mailer
            .emails()
            .into_iter()
            .map(|s| s.email.subject)
            .collect();
        assert_eq!(subjects, ["one", "two", "three"]);
        assert_eq!(mailer.last_email().unwrap().email.subject, "three");
    }

    #[tokio::test]
    async fn test_shared_storage() {
        let storage = MemoryStorage::shared();
        let first = LocalMailer::with_storage(Arc::clone(&storage));
        let second = LocalMailer::with_storage(Arc::clone(&storage));

        first.deliver(&email("a")).await.unwrap();
        second.deliver(&email("b")).await.unwrap();

        assert_eq!(storage.count(), 2);
    }

    #[tokio::test]
    async fn test_can_fail() {
        let mailer = LocalMailer::new();
        mailer.set_failure("Simulated failure");

        let err = mailer.deliver(&email("x")).await.unwrap_err();
        assert!(matches!(err, MailError::Delivery(ref msg) if msg == "Simulated failure"));
        assert!(!mailer.has_emails());

        mailer.clear_failure();
        assert!(mailer.deliver(&email("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_find_and_flush() {
        let mailer = LocalMailer::new();
        mailer.deliver(&email("Welcome")).await.unwrap();
        mailer.deliver(&email("Goodbye")).await.unwrap();

        assert_eq!(mailer.find_emails(|e| e.subject == "Welcome").len(), 1);
        assert_eq!(mailer.flush().len(), 2);
        assert_eq!(mailer.email_count(), 0);
    }
}
