//! Outbox storage for the local mailer.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::email::Email;

/// A delivered email with metadata.
#[derive(Debug, Clone)]
pub struct StoredEmail {
    /// Unique identifier for this email.
    pub id: String,
    /// The email content.
    pub email: Email,
    /// When the email was "sent" (stored).
    pub sent_at: DateTime<Utc>,
}

/// Trait for outbox backends.
pub trait Storage: Send + Sync {
    /// Store an email and return its ID.
    fn push(&self, email: Email) -> String;

    /// Get an email by ID.
    fn get(&self, id: &str) -> Option<StoredEmail>;

    /// Get all stored emails in delivery order (oldest first).
    fn all(&self) -> Vec<StoredEmail>;

    /// Get the count of stored emails.
    fn count(&self) -> usize;

    /// Clear all stored emails.
    fn clear(&self);

    /// Remove and return all stored emails, oldest first.
    fn flush(&self) -> Vec<StoredEmail>;
}

/// Thread-safe in-memory outbox.
///
/// Several dispatch tasks may share one outbox; entries keep the order in
/// which deliveries completed.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    emails: RwLock<Vec<StoredEmail>>,
}

impl MemoryStorage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage wrapped in an Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Storage for MemoryStorage {
    fn push(&self, email: Email) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.emails.write().push(StoredEmail {
            id: id.clone(),
            email,
            sent_at: Utc::now(),
        });
        id
    }

    fn get(&self, id: &str) -> Option<StoredEmail> {
        self.emails.read().iter().find(|s| s.id == id).cloned()
    }

    fn all(&self) -> Vec<StoredEmail> {
        self.emails.read().clone()
    }

    fn count(&self) -> usize {
        self.emails.read().len()
    }

    fn clear(&self) {
        self.emails.write().clear();
    }

    fn flush(&self) -> Vec<StoredEmail> {
        std::mem::take(&mut *self.emails.write())
    }
}
