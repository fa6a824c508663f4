//! Email struct with builder pattern.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::{Address, ToAddress};
use crate::attachment::Attachment;

/// Default subtype of the main body (`text/plain`).
pub const DEFAULT_CONTENT_SUBTYPE: &str = "plain";

/// Default subtype of the multipart container holding body and attachments.
pub const DEFAULT_MIXED_SUBTYPE: &str = "mixed";

/// An email message.
///
/// ```
/// use mail_dispatch::Email;
///
/// let email = Email::new()
///     .from("sender@example.com")
///     .to("recipient@example.com")
///     .subject("Hello!")
///     .body("Plain text content")
///     .html_body("<h1>HTML content</h1>");
///
/// assert_eq!(email.alternatives.len(), 1);
/// ```
///
/// The main `body` is rendered as `text/{content_subtype}`; every entry in
/// `alternatives` is an additional `(content, mimetype)` rendering of the same
/// message, kept in the order they were attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Sender address
    pub from: Option<Address>,
    /// Primary recipients
    pub to: Vec<Address>,
    /// Carbon copy recipients
    pub cc: Vec<Address>,
    /// Blind carbon copy recipients
    pub bcc: Vec<Address>,
    /// Reply-to addresses
    pub reply_to: Vec<Address>,
    /// Email subject line
    pub subject: String,
    /// Main body
    pub body: String,
    /// Subtype of the main body, `plain` unless changed (e.g. `html`)
    pub content_subtype: String,
    /// Subtype of the outer multipart when attachments are present
    pub mixed_subtype: String,
    /// Alternative renderings as `(content, mimetype)`
    pub alternatives: Vec<(String, String)>,
    /// File attachments
    pub attachments: Vec<Attachment>,
    /// Custom email headers, keyed and ordered by name. Setting a name twice
    /// keeps the last value; insertion order is not kept.
    pub headers: BTreeMap<String, String>,
}

impl Default for Email {
    fn default() -> Self {
        Self {
            from: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
            subject: String::new(),
            body: String::new(),
            content_subtype: DEFAULT_CONTENT_SUBTYPE.to_string(),
            mixed_subtype: DEFAULT_MIXED_SUBTYPE.to_string(),
            alternatives: Vec::new(),
            attachments: Vec::new(),
            headers: BTreeMap::new(),
        }
    }
}

impl Email {
    /// Create a new empty email.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address.
    pub fn from(mut self, addr: impl ToAddress) -> Self {
        self.from = Some(addr.to_address());
        self
    }

    /// Add a recipient.
    pub fn to(mut self, addr: impl ToAddress) -> Self {
        self.to.push(addr.to_address());
        self
    }

    /// Add a CC recipient.
    pub fn cc(mut self, addr: impl ToAddress) -> Self {
        self.cc.push(addr.to_address());
        self
    }

    /// Add a BCC recipient.
    pub fn bcc(mut self, addr: impl ToAddress) -> Self {
        self.bcc.push(addr.to_address());
        self
    }

    /// Add a reply-to address.
    pub fn reply_to(mut self, addr: impl ToAddress) -> Self {
        self.reply_to.push(addr.to_address());
        self
    }

    /// Set the subject line.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the main body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the subtype of the main body (`plain`, `html`, ...).
    pub fn content_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.content_subtype = subtype.into();
        self
    }

    /// Set the subtype of the outer multipart (`mixed`, `related`, ...).
    pub fn mixed_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.mixed_subtype = subtype.into();
        self
    }

    /// Attach an alternative rendering of the body.
    pub fn attach_alternative(
        mut self,
        content: impl Into<String>,
        mimetype: impl Into<String>,
    ) -> Self {
        self.alternatives.push((content.into(), mimetype.into()));
        self
    }

    /// Attach an HTML alternative.
    pub fn html_body(self, html: impl Into<String>) -> Self {
        self.attach_alternative(html, "text/html")
    }

    /// Add an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Add a custom header, replacing any earlier value for `name`.
    ///
    /// Headers are emitted sorted by name, not in the order they were added.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The first HTML rendering, whether it is the main body or an alternative.
    pub fn html(&self) -> Option<&str> {
        if self.content_subtype == "html" {
            return Some(&self.body);
        }
        self.alternatives
            .iter()
            .find(|(_, mimetype)| mimetype == "text/html")
            .map(|(content, _)| content.as_str())
    }

    /// Get all recipients (to + cc + bcc).
    pub fn all_recipients(&self) -> Vec<&Address> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .collect()
    }

    /// Check if the email has all required fields for sending.
    pub fn is_valid(&self) -> bool {
        self.from.is_some() && !self.all_recipients().is_empty()
    }

    /// Check if the email has any attachments.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let email = Email::new()
            .from("sender@example.com")
            .to("recipient@example.com")
            .subject("Test")
            .body("Hello");

        assert_eq!(email.from.unwrap().email, "sender@example.com");
        assert_eq!(email.to.len(), 1);
        assert_eq!(email.subject, "Test");
        assert_eq!(email.body, "Hello");
        assert_eq!(email.content_subtype, "plain");
        assert_eq!(email.mixed_subtype, "mixed");
    }

    #[test]
    fn test_multiple_recipients() {
        let email = Email::new()
            .to("one@example.com")
            .to("two@example.com")
            .cc("cc@example.com")
            .bcc("bcc@example.com");

        assert_eq!(email.all_recipients().len(), 4);
    }

    #[test]
    fn test_is_valid() {
        assert!(!Email::new().to("recipient@example.com").is_valid());
        assert!(!Email::new().from("sender@example.com").is_valid());
        assert!(Email::new()
            .from("sender@example.com")
            .bcc("hidden@example.com")
            .is_valid());
    }

    #[test]
    fn test_alternatives_keep_order() {
        let email = Email::new()
            .body("text")
            .html_body("<p>html</p>")
            .attach_alternative("# md", "text/markdown");

        assert_eq!(
            email.alternatives,
            vec![
                ("<p>html</p>".to_string(), "text/html".to_string()),
                ("# md".to_string(), "text/markdown".to_string()),
            ]
        );
        assert_eq!(email.html(), Some("<p>html</p>"));
    }

    #[test]
    fn test_headers_sorted_by_name_last_value_wins() {
        let email = Email::new()
            .header("X-Zeta", "1")
            .header("X-Alpha", "2")
            .header("X-Zeta", "3");

        let headers: Vec<_> = email
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(headers, [("X-Alpha", "2"), ("X-Zeta", "3")]);
    }

    #[test]
    fn test_html_main_body() {
        let email = Email::new().body("<b>hi</b>").content_subtype("html");
        assert_eq!(email.html(), Some("<b>hi</b>"));
    }

    #[test]
    fn test_to_address_trait() {
        struct User {
            name: String,
            email: String,
        }

        impl ToAddress for User {
            fn to_address(&self) -> Address {
                Address::with_name(&self.name, &self.email)
            }
        }

        let user = User {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
        };

        let email = Email::new().to(&user).reply_to(&user);
        assert_eq!(email.to[0].name, Some("Alice".to_string()));
        assert_eq!(email.reply_to[0].email, "alice@example.com");
    }
}
