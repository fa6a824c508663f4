//! Email attachments with support for inline and regular attachments.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MailError;

/// Type of attachment disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    /// Regular attachment (shown as downloadable file)
    #[default]
    Attachment,
    /// Inline attachment (embedded in HTML via cid:)
    Inline,
}

/// An email attachment.
///
/// Attachment bytes are always held in memory: a queued message may be
/// delivered by a worker on another machine, so a local file path would not
/// survive the trip.
///
/// ```
/// use mail_dispatch::Attachment;
///
/// let report = Attachment::from_bytes("report.pdf", b"PDF content".to_vec());
/// assert_eq!(report.content_type, "application/pdf");
///
/// let logo = Attachment::from_bytes("logo.png", vec![0x89, 0x50, 0x4E, 0x47])
///     .inline()
///     .content_id("company-logo");
/// assert!(logo.is_inline());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Filename for the attachment
    pub filename: String,
    /// MIME content type (e.g., "application/pdf", "image/png")
    pub content_type: String,
    /// Raw attachment data
    pub data: Vec<u8>,
    /// Whether this is an inline or regular attachment
    pub disposition: AttachmentType,
    /// Content-ID for inline attachments (used as cid: reference)
    pub content_id: Option<String>,
}

impl Attachment {
    /// Create a new attachment from raw bytes.
    ///
    /// Content type is guessed from the filename extension.
    pub fn from_bytes(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        Self {
            filename,
            content_type,
            data,
            disposition: AttachmentType::Attachment,
            content_id: None,
        }
    }

    /// Create a new attachment by reading a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MailError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let data = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MailError::AttachmentFileNotFound(path.display().to_string())
            } else {
                MailError::AttachmentReadError(format!("{}: {}", path.display(), e))
            }
        })?;

        Ok(Self::from_bytes(filename, data))
    }

    /// Rebuild an attachment from base64 content, as stored in message records.
    pub fn from_base64(
        filename: impl Into<String>,
        content: &str,
        content_type: impl Into<String>,
    ) -> Result<Self, MailError> {
        let filename = filename.into();
        let data = base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|e| MailError::AttachmentError(format!("{}: {}", filename, e)))?;

        Ok(Self {
            filename,
            content_type: content_type.into(),
            data,
            disposition: AttachmentType::Attachment,
            content_id: None,
        })
    }

    /// Set the content type explicitly.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Set as inline attachment (for embedding in HTML).
    pub fn inline(mut self) -> Self {
        self.disposition = AttachmentType::Inline;
        if self.content_id.is_none() {
            self.content_id = Some(self.filename.clone());
        }
        self
    }

    /// Set the Content-ID for inline attachments.
    ///
    /// This is used to reference the attachment in HTML: `<img src="cid:your-id">`
    pub fn content_id(mut self, cid: impl Into<String>) -> Self {
        self.content_id = Some(cid.into());
        self
    }

    /// Get the attachment data as base64-encoded string.
    pub fn base64_data(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Get the size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Check if this is an inline attachment.
    pub fn is_inline(&self) -> bool {
        self.disposition == AttachmentType::Inline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let attachment = Attachment::from_bytes("test.txt", b"Hello".to_vec());
        assert_eq!(attachment.filename, "test.txt");
        assert_eq!(attachment.content_type, "text/plain");
        assert_eq!(attachment.data, b"Hello");
        assert_eq!(attachment.disposition, AttachmentType::Attachment);
    }

    #[test]
    fn test_inline() {
        let attachment = Attachment::from_bytes("logo.png", vec![1, 2, 3]).inline();
        assert_eq!(attachment.disposition, AttachmentType::Inline);
        assert_eq!(attachment.content_id, Some("logo.png".to_string()));
    }

    #[test]
    fn test_mime_guess() {
        assert_eq!(
            Attachment::from_bytes("doc.pdf", vec![]).content_type,
            "application/pdf"
        );
        assert_eq!(
            Attachment::from_bytes("file.unknown_ext_12345", vec![]).content_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn test_base64() {
        let attachment = Attachment::from_bytes("test.txt", b"Hello".to_vec());
        assert_eq!(attachment.base64_data(), "SGVsbG8=");

        let decoded = Attachment::from_base64("test.txt", "SGVsbG8=", "text/plain").unwrap();
        assert_eq!(decoded.data, b"Hello");
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        let err = Attachment::from_base64("x.bin", "***", "application/octet-stream").unwrap_err();
        assert!(matches!(err, MailError::AttachmentError(msg) if msg.contains("x.bin")));
    }

    #[test]
    fn test_from_path_missing() {
        let err = Attachment::from_path("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, MailError::AttachmentFileNotFound(_)));
    }
}
