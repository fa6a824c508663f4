//! SMTP provider using lettre.
//!
//! # Example
//!
//! ```rust,ignore
//! use mail_dispatch::providers::SmtpMailer;
//!
//! // With authentication
//! let mailer = SmtpMailer::new("smtp.example.com", 587)
//!     .credentials("username", "password")
//!     .build();
//!
//! // From backend parameters, as a dispatch task does
//! let params = BackendParams::new()
//!     .with("host", "smtp.example.com")
//!     .with("username", "user")
//!     .with("password", "pass");
//! let mailer = SmtpMailer::from_params(&params)?;
//! ```

use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentType, HeaderName, HeaderValue},
        Attachment as LettreAttachment, Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

use crate::address::Address;
use crate::attachment::AttachmentType;
use crate::backend::BackendParams;
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::{DeliveryResult, Mailer};

/// Connection timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// SMTP email provider.
pub struct SmtpMailer {
    host: String,
    timeout: Duration,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Create a new SMTP mailer builder with TLS (STARTTLS on port 587).
    pub fn new(host: &str, port: u16) -> SmtpBuilder {
        SmtpBuilder {
            host: host.to_string(),
            port,
            credentials: None,
            tls: TlsMode::StartTls,
            timeout: None,
        }
    }

    /// Create a new SMTP mailer for localhost (no TLS, no auth).
    pub fn localhost() -> Self {
        Self::new("localhost", 25).no_tls().build()
    }

    /// Build a mailer from backend parameters.
    ///
    /// Recognised keys: `host` (default `localhost`), `port` (default 25),
    /// `username`, `password`, `use_tls` (STARTTLS), `use_ssl` (implicit
    /// TLS) and `timeout` in seconds (default [`DEFAULT_TIMEOUT`]). Other keys
    /// are ignored.
    pub fn from_params(params: &BackendParams) -> Result<Self, MailError> {
        let host = params.get_str("host")?.unwrap_or("localhost");
        let port = params.get_u64("port")?.unwrap_or(25);
        let port = u16::try_from(port)
            .map_err(|_| MailError::Configuration(format!("SMTP port out of range: {}", port)))?;

        let use_tls = params.get_bool("use_tls")?.unwrap_or(false);
        let use_ssl = params.get_bool("use_ssl")?.unwrap_or(false);
        if use_tls && use_ssl {
            return Err(MailError::Configuration(
                "use_tls and use_ssl are mutually exclusive".into(),
            ));
        }

        let mut builder = Self::new(host, port).tls(if use_ssl {
            TlsMode::Tls
        } else if use_tls {
            TlsMode::StartTls
        } else {
            TlsMode::None
        });

        if let Some(username) = params.get_str("username")?.filter(|u| !u.is_empty()) {
            let password = params.get_str("password")?.unwrap_or_default();
            builder = builder.credentials(username, password);
        }
        if let Some(secs) = params.get_u64("timeout")? {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(builder.build())
    }

    /// Build a lettre Message from our Email struct.
    fn build_message(&self, email: &Email) -> Result<Message, MailError> {
        let from = email
            .from
            .as_ref()
            .ok_or(MailError::MissingField("from"))?;

        if email.all_recipients().is_empty() {
            return Err(MailError::MissingField("to"));
        }

        let mut builder = Message::builder()
            .from(address_to_mailbox(from)?)
            .subject(&email.subject);

        for to in &email.to {
            builder = builder.to(address_to_mailbox(to)?);
        }
        for cc in &email.cc {
            builder = builder.cc(address_to_mailbox(cc)?);
        }
        for bcc in &email.bcc {
            builder = builder.bcc(address_to_mailbox(bcc)?);
        }
        for reply_to in &email.reply_to {
            builder = builder.reply_to(address_to_mailbox(reply_to)?);
        }

        for (name, value) in &email.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|e| MailError::Encoding(format!("invalid header '{}': {}", name, e)))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        let main = SinglePart::builder()
            .header(content_type(&format!(
                "text/{}; charset=utf-8",
                email.content_subtype
            )))
            .body(email.body.clone());

        let message = match (email.alternatives.is_empty(), email.attachments.is_empty()) {
            (true, true) => builder.singlepart(main)?,
            (false, true) => builder.multipart(alternative_part(main, email))?,
            (alternatives_empty, false) => {
                let mixed = if email.mixed_subtype == "related" {
                    MultiPart::related()
                } else {
                    MultiPart::mixed()
                };
                let mut multipart = if alternatives_empty {
                    mixed.singlepart(main)
                } else {
                    mixed.multipart(alternative_part(main, email))
                };

                for attachment in &email.attachments {
                    let ct = content_type(&attachment.content_type);
                    let part = match attachment.disposition {
                        AttachmentType::Inline => {
                            let cid = attachment
                                .content_id
                                .as_ref()
                                .unwrap_or(&attachment.filename);
                            LettreAttachment::new_inline(cid.clone())
                                .body(attachment.data.clone(), ct)
                        }
                        AttachmentType::Attachment => {
                            LettreAttachment::new(attachment.filename.clone())
                                .body(attachment.data.clone(), ct)
                        }
                    };
                    multipart = multipart.singlepart(part);
                }

                builder.multipart(multipart)?
            }
        };

        Ok(message)
    }
}

fn content_type(raw: &str) -> ContentType {
    ContentType::parse(raw).unwrap_or(ContentType::TEXT_PLAIN)
}

fn alternative_part(main: SinglePart, email: &Email) -> MultiPart {
    let mut alternative = MultiPart::alternative().singlepart(main);
    for (content, mimetype) in &email.alternatives {
        alternative = alternative.singlepart(
            SinglePart::builder()
                .header(content_type(&format!("{}; charset=utf-8", mimetype)))
                .body(content.clone()),
        );
    }
    alternative
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn deliver(&self, email: &Email) -> Result<DeliveryResult, MailError> {
        let message = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            match e.status().and_then(|code| code.to_string().parse::<u16>().ok()) {
                Some(status) => MailError::provider_with_status("smtp", e.to_string(), status),
                None => MailError::Delivery(e.to_string()),
            }
        })?;

        let message_id = response
            .message()
            .next()
            .and_then(|m| m.lines().next())
            .map(|s| s.to_string())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(DeliveryResult::new(message_id))
    }

    async fn open(&self) -> Result<(), MailError> {
        if self.transport.test_connection().await? {
            Ok(())
        } else {
            Err(MailError::Delivery(format!(
                "SMTP server {} refused the connection",
                self.host
            )))
        }
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }

    fn validate_config(&self) -> Result<(), MailError> {
        if self.host.trim().is_empty() {
            return Err(MailError::Configuration("SMTP host is empty".into()));
        }
        Ok(())
    }
}

/// TLS mode for SMTP connection.
#[derive(Debug, Clone, Copy)]
pub enum TlsMode {
    /// No TLS (dangerous, only for localhost)
    None,
    /// STARTTLS - upgrade to TLS after connecting (port 587)
    StartTls,
    /// Implicit TLS - connect with TLS from start (port 465)
    Tls,
}

/// Builder for SmtpMailer.
pub struct SmtpBuilder {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
    tls: TlsMode,
    timeout: Option<Duration>,
}

impl SmtpBuilder {
    /// Set SMTP credentials.
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username.to_string(), password.to_string()));
        self
    }

    /// Set TLS mode.
    pub fn tls(mut self, mode: TlsMode) -> Self {
        self.tls = mode;
        self
    }

    /// Disable TLS (dangerous, only for localhost/testing).
    pub fn no_tls(mut self) -> Self {
        self.tls = TlsMode::None;
        self
    }

    /// Set the connection timeout. Defaults to [`DEFAULT_TIMEOUT`].
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the SmtpMailer.
    pub fn build(self) -> SmtpMailer {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let dangerous = || AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.host);
        let mut t = match self.tls {
            TlsMode::None => dangerous(),
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .unwrap_or_else(|_| dangerous()),
            TlsMode::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host).unwrap_or_else(|_| dangerous())
            }
        }
        .port(self.port)
        .timeout(Some(timeout));

        if let Some(creds) = self.credentials {
            t = t.credentials(creds);
        }

        SmtpMailer {
            host: self.host,
            timeout,
            transport: t.build(),
        }
    }
}

/// Convert our Address to lettre's Mailbox, punycoding the domain.
fn address_to_mailbox(addr: &Address) -> Result<Mailbox, MailError> {
    let email = addr.to_ascii()?.parse()?;
    Ok(Mailbox::new(addr.name.clone(), email))
}
