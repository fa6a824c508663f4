//! Error types for mail-dispatch.

use thiserror::Error;

/// Errors that can occur while queueing or delivering emails.
#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// Configuration error (bad chunk size, unknown backend, invalid parameter).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Missing required field (e.g., from address).
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid email address format.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Error reading or processing attachment (generic).
    #[error("Attachment error: {0}")]
    AttachmentError(String),

    /// Attachment file not found.
    #[error("Attachment file not found: {0}")]
    AttachmentFileNotFound(String),

    /// Failed to read attachment file.
    #[error("Failed to read attachment: {0}")]
    AttachmentReadError(String),

    /// The email could not be turned into a message record.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A message record could not be turned back into an email.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// The transport refused or failed to send a message.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Provider-specific error with details.
    #[error("Provider error ({provider}): {message}")]
    ProviderError {
        provider: &'static str,
        message: String,
        /// Optional protocol status code (e.g. SMTP reply code)
        status: Option<u16>,
    },

    /// The task queue refused a submission.
    #[error("Queue error: {0}")]
    Queue(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl MailError {
    /// Create a provider-specific error.
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ProviderError {
            provider,
            message: message.into(),
            status: None,
        }
    }

    /// Create a provider error with a status code.
    pub fn provider_with_status(
        provider: &'static str,
        message: impl Into<String>,
        status: u16,
    ) -> Self {
        Self::ProviderError {
            provider,
            message: message.into(),
            status: Some(status),
        }
    }

    /// Whether a dispatch task should schedule a retry for this error.
    ///
    /// Only transport failures are worth another attempt; malformed messages
    /// and bad configuration fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery(_) | Self::ProviderError { .. })
    }
}

impl From<serde_json::Error> for MailError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::error::Error> for MailError {
    fn from(err: lettre::error::Error) -> Self {
        Self::Delivery(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::transport::smtp::Error> for MailError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self::Delivery(err.to_string())
    }
}

#[cfg(feature = "smtp")]
impl From<lettre::address::AddressError> for MailError {
    fn from(err: lettre::address::AddressError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}
