//! Conversion between [`Email`] and the plain, JSON-friendly [`MessageRecord`]
//! that travels through the task queue.
//!
//! Records are deliberately flat: addresses are header-style strings,
//! attachment bytes are base64, and fields holding their default value
//! (`content_subtype`, `mixed_subtype`, empty alternatives) are left out.
//! Encoding a decoded record gives back the same record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::Address;
use crate::attachment::{Attachment, AttachmentType};
use crate::email::{Email, DEFAULT_CONTENT_SUBTYPE, DEFAULT_MIXED_SUBTYPE};
use crate::error::MailError;

/// Serializable representation of one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub from_email: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub reply_to: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
    /// `(content, mimetype)` pairs, serialized as two-element arrays.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<(String, String)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed_subtype: Option<String>,
}

/// An attachment inside a [`MessageRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub filename: String,
    /// Base64 (standard alphabet, padded) file content.
    pub content: String,
    pub mimetype: String,
    #[serde(default, skip_serializing_if = "is_regular")]
    pub disposition: AttachmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

fn is_regular(disposition: &AttachmentType) -> bool {
    *disposition == AttachmentType::Attachment
}

fn non_default(value: &str, default: &str) -> Option<String> {
    (value != default).then(|| value.to_string())
}

fn render(addresses: &[Address]) -> Vec<String> {
    addresses.iter().map(Address::formatted_rfc5322).collect()
}

fn parse_all(field: &str, values: &[String]) -> Result<Vec<Address>, MailError> {
    values
        .iter()
        .map(|value| {
            Address::parse_mailbox(value)
                .map_err(|e| MailError::Decoding(format!("{}: {}", field, e)))
        })
        .collect()
}

fn check_addresses(field: &str, addresses: &[Address]) -> Result<(), MailError> {
    for address in addresses {
        Address::parse(&address.email)
            .map_err(|e| MailError::Encoding(format!("{}: {}", field, e)))?;
    }
    Ok(())
}

/// Header field names are printable US-ASCII other than `:` (RFC 5322 3.6.8).
fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (33..=126).contains(&b) && b != b':')
}

/// Turn an email into a message record.
///
/// Fails with [`MailError::Encoding`] when the email has no sender, no
/// recipient at all, an address [`decode`] would reject, or a header name
/// that is not a valid field name.
pub fn encode(email: &Email) -> Result<MessageRecord, MailError> {
    let from = email
        .from
        .as_ref()
        .ok_or_else(|| MailError::Encoding("message has no sender".into()))?;

    if email.all_recipients().is_empty() {
        return Err(MailError::Encoding(format!(
            "message '{}' has no recipients",
            email.subject
        )));
    }

    check_addresses("from", std::slice::from_ref(from))?;
    check_addresses("to", &email.to)?;
    check_addresses("cc", &email.cc)?;
    check_addresses("bcc", &email.bcc)?;
    check_addresses("reply_to", &email.reply_to)?;

    if let Some(name) = email.headers.keys().find(|n| !is_valid_header_name(n)) {
        return Err(MailError::Encoding(format!("invalid header name '{}'", name)));
    }

    let attachments = email
        .attachments
        .iter()
        .map(|a| AttachmentRecord {
            filename: a.filename.clone(),
            content: a.base64_data(),
            mimetype: a.content_type.clone(),
            disposition: a.disposition,
            content_id: a.content_id.clone(),
        })
        .collect();

    Ok(MessageRecord {
        subject: email.subject.clone(),
        body: email.body.clone(),
        from_email: from.formatted_rfc5322(),
        to: render(&email.to),
        cc: render(&email.cc),
        bcc: render(&email.bcc),
        reply_to: render(&email.reply_to),
        headers: email.headers.clone(),
        attachments,
        alternatives: email.alternatives.clone(),
        content_subtype: non_default(&email.content_subtype, DEFAULT_CONTENT_SUBTYPE),
        mixed_subtype: non_default(&email.mixed_subtype, DEFAULT_MIXED_SUBTYPE),
    })
}

/// Rebuild an email from a message record.
///
/// Fails with [`MailError::Decoding`] on a missing sender, no recipients, an
/// unparseable address or attachment content that is not valid base64.
pub fn decode(record: &MessageRecord) -> Result<Email, MailError> {
    if record.from_email.trim().is_empty() {
        return Err(MailError::Decoding("record has no from_email".into()));
    }
    if record.to.is_empty() && record.cc.is_empty() && record.bcc.is_empty() {
        return Err(MailError::Decoding(format!(
            "record '{}' has no recipients",
            record.subject
        )));
    }

    let from = Address::parse_mailbox(&record.from_email)
        .map_err(|e| MailError::Decoding(format!("from_email: {}", e)))?;

    let attachments = record
        .attachments
        .iter()
        .map(|a| {
            let mut attachment = Attachment::from_base64(&a.filename, &a.content, &a.mimetype)
                .map_err(|e| MailError::Decoding(e.to_string()))?;
            attachment.disposition = a.disposition;
            attachment.content_id = a.content_id.clone();
            Ok(attachment)
        })
        .collect::<Result<Vec<_>, MailError>>()?;

    Ok(Email {
        from: Some(from),
        to: parse_all("to", &record.to)?,
        cc: parse_all("cc", &record.cc)?,
        bcc: parse_all("bcc", &record.bcc)?,
        reply_to: parse_all("reply_to", &record.reply_to)?,
        subject: record.subject.clone(),
        body: record.body.clone(),
        content_subtype: record
            .content_subtype
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_SUBTYPE.to_string()),
        mixed_subtype: record
            .mixed_subtype
            .clone()
            .unwrap_or_else(|| DEFAULT_MIXED_SUBTYPE.to_string()),
        alternatives: record.alternatives.clone(),
        attachments,
        headers: record.headers.clone(),
    })
}

impl TryFrom<&Email> for MessageRecord {
    type Error = MailError;

    fn try_from(email: &Email) -> Result<Self, Self::Error> {
        encode(email)
    }
}

impl TryFrom<&MessageRecord> for Email {
    type Error = MailError;

    fn try_from(record: &MessageRecord) -> Result<Self, Self::Error> {
        decode(record)
    }
}

/// Either a live email or an already-encoded record.
///
/// Dispatch tasks accept both: records arrive from the queue, live emails
/// come from direct programmatic calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageLike {
    Email(Email),
    Record(MessageRecord),
}

impl MessageLike {
    /// The record form, encoding a live email if needed.
    pub fn into_record(self) -> Result<MessageRecord, MailError> {
        match self {
            Self::Email(email) => encode(&email),
            Self::Record(record) => Ok(record),
        }
    }

    /// The email form, decoding a record if needed.
    pub fn into_email(self) -> Result<Email, MailError> {
        match self {
            Self::Email(email) => Ok(email),
            Self::Record(record) => decode(&record),
        }
    }
}

impl From<Email> for MessageLike {
    fn from(email: Email) -> Self {
        Self::Email(email)
    }
}

impl From<MessageRecord> for MessageLike {
    fn from(record: MessageRecord) -> Self {
        Self::Record(record)
    }
}
