//! Dispatch configuration.
//!
//! Configuration is an explicit value handed to
//! [`SubmissionBackend`](crate::SubmissionBackend) and
//! [`DispatchTask`](crate::DispatchTask); nothing is read from process-wide
//! state after construction.
//!
//! ## Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `MAIL_DISPATCH_BACKEND` | Delivery backend name (default: `smtp`) |
//! | `MAIL_DISPATCH_CHUNK_SIZE` | Messages per task (default: 10) |
//! | `MAIL_DISPATCH_QUEUE` | Queue the dispatch task is routed to (default: `mail_dispatch`) |
//! | `MAIL_DISPATCH_RATE_LIMIT` | Broker rate limit, e.g. `50/m`; empty disables |
//! | `MAIL_DISPATCH_DELIVERY_MODE` | `transient`/`1` or `persistent`/`2` |
//! | `EMAIL_FROM` | Default sender email |
//! | `EMAIL_FROM_NAME` | Default sender name |

use serde::{Deserialize, Serialize};
use std::env;

use crate::address::Address;
use crate::error::MailError;
use crate::queue::{DeliveryMode, TaskOptions};

/// Default number of messages per submitted task.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Default delivery backend name.
pub const DEFAULT_BACKEND: &str = "smtp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the delivery backend workers resolve from the registry.
    pub backend: String,
    /// Maximum number of messages per submitted task.
    pub chunk_size: usize,
    /// Forward unrecognised submission options to the delivery backend.
    pub pass_through_options: bool,
    /// Sender applied to messages submitted without one.
    pub default_from: Option<Address>,
    /// Registration options of the dispatch task.
    pub task: TaskOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pass_through_options: true,
            default_from: None,
            task: TaskOptions::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backend = name.into();
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    pub fn pass_through_options(mut self, enabled: bool) -> Self {
        self.pass_through_options = enabled;
        self
    }

    pub fn default_from(mut self, from: impl Into<Address>) -> Self {
        self.default_from = Some(from.into());
        self
    }

    pub fn task_options(mut self, options: TaskOptions) -> Self {
        self.task = options;
        self
    }

    /// Check the values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), MailError> {
        if self.chunk_size == 0 {
            return Err(MailError::Configuration(
                "chunk size must be a positive integer".into(),
            ));
        }
        if self.backend.trim().is_empty() {
            return Err(MailError::Configuration("backend name is empty".into()));
        }
        if self.task.queue.trim().is_empty() {
            return Err(MailError::Configuration("task queue name is empty".into()));
        }
        Ok(())
    }

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the value of a
    /// variable if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MailError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup("MAIL_DISPATCH_BACKEND") {
            config.backend = backend.trim().to_lowercase();
        }

        if let Some(raw) = lookup("MAIL_DISPATCH_CHUNK_SIZE") {
            config.chunk_size = parse_chunk_size(&raw)?;
        }

        if let Some(queue) = lookup("MAIL_DISPATCH_QUEUE") {
            config.task.queue = queue;
        }

        if let Some(rate) = lookup("MAIL_DISPATCH_RATE_LIMIT") {
            let rate = rate.trim();
            config.task.rate_limit = (!rate.is_empty()).then(|| rate.to_string());
        }

        if let Some(mode) = lookup("MAIL_DISPATCH_DELIVERY_MODE") {
            config.task.delivery_mode = match mode.trim().to_lowercase().as_str() {
                "1" | "transient" => DeliveryMode::Transient,
                "2" | "persistent" => DeliveryMode::Persistent,
                other => {
                    return Err(MailError::Configuration(format!(
                        "MAIL_DISPATCH_DELIVERY_MODE must be transient or persistent, got '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(email) = lookup("EMAIL_FROM") {
            config.default_from = Some(match lookup("EMAIL_FROM_NAME") {
                Some(name) => Address::with_name(name, email),
                None => Address::new(email),
            });
        }

        config.validate()?;
        tracing::debug!(
            backend = %config.backend,
            chunk_size = config.chunk_size,
            queue = %config.task.queue,
            "Loaded dispatch configuration"
        );
        Ok(config)
    }
}

fn parse_chunk_size(raw: &str) -> Result<usize, MailError> {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => usize::try_from(n).map_err(|_| {
            MailError::Configuration(format!("MAIL_DISPATCH_CHUNK_SIZE out of range: {}", n))
        }),
        Ok(n) => Err(MailError::Configuration(format!(
            "MAIL_DISPATCH_CHUNK_SIZE must be a positive integer, got {}",
            n
        ))),
        Err(_) => Err(MailError::Configuration(format!(
            "MAIL_DISPATCH_CHUNK_SIZE is not an integer: '{}'",
            raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.backend, "smtp");
        assert!(config.pass_through_options);
        assert!(config.default_from.is_none());
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("MAIL_DISPATCH_BACKEND", "Logger"),
            ("MAIL_DISPATCH_CHUNK_SIZE", " 4 "),
            ("MAIL_DISPATCH_QUEUE", "outbound"),
            ("MAIL_DISPATCH_RATE_LIMIT", ""),
            ("MAIL_DISPATCH_DELIVERY_MODE", "persistent"),
            ("EMAIL_FROM", "noreply@example.com"),
            ("EMAIL_FROM_NAME", "Example"),
        ]))
        .unwrap();

        assert_eq!(config.backend, "logger");
        assert_eq!(config.chunk_size, 4);
        assert_eq!(config.task.queue, "outbound");
        assert_eq!(config.task.rate_limit, None);
        assert_eq!(config.task.delivery_mode.code(), 2);
        let from = config.default_from.unwrap();
        assert_eq!(from.email, "noreply@example.com");
        assert_eq!(from.name.as_deref(), Some("Example"));
    }

    #[test]
    fn test_bad_chunk_size() {
        for raw in ["0", "-3", "ten", ""] {
            let result = Config::from_lookup(lookup(&[("MAIL_DISPATCH_CHUNK_SIZE", raw)]));
            assert!(
                matches!(result, Err(MailError::Configuration(_))),
                "accepted chunk size {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_bad_delivery_mode() {
        let result = Config::from_lookup(lookup(&[("MAIL_DISPATCH_DELIVERY_MODE", "3")]));
        assert!(matches!(result, Err(MailError::Configuration(_))));
    }

    #[test]
    fn test_validate() {
        assert!(Config::new().validate().is_ok());
        assert!(Config::new().chunk_size(0).validate().is_err());
        assert!(Config::new().backend(" ").validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config = serde_json::from_str(r#"{"chunk_size": 25}"#).unwrap();
        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.backend, "smtp");
        assert_eq!(config.task.queue, "mail_dispatch");
    }
}
