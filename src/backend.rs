//! Delivery backend selection.
//!
//! Dispatch tasks name their delivery backend in configuration (`"smtp"`,
//! `"local"`, ...). A [`BackendRegistry`] maps those names to factories that
//! build a [`Mailer`] from [`BackendParams`]; resolving a name yields a
//! [`DeliveryBackend`], built fresh for every task run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::codec::MessageLike;
use crate::email::Email;
use crate::error::MailError;
use crate::mailer::Mailer;
use crate::providers;

#[cfg(feature = "local")]
use crate::storage::MemoryStorage;

/// Keyword parameters handed to a backend factory (credentials, host, ...).
///
/// Serialized as a flat JSON object inside every task payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendParams(BTreeMap<String, serde_json::Value>);

impl BackendParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// A string parameter; any other JSON type is a configuration error.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, MailError> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(invalid(key, "a string", other)),
        }
    }

    /// An unsigned integer parameter, given as a number or a numeric string.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, MailError> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Number(n)) if n.is_u64() => Ok(n.as_u64()),
            Some(serde_json::Value::String(s)) if s.trim().parse::<u64>().is_ok() => {
                Ok(s.trim().parse().ok())
            }
            Some(other) => Err(invalid(key, "a non-negative integer", other)),
        }
    }

    /// A boolean parameter, given as a bool or as `"true"`/`"false"`/`"1"`/`"0"`.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, MailError> {
        match self.0.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Bool(b)) => Ok(Some(*b)),
            Some(serde_json::Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(invalid(key, "a boolean", &serde_json::Value::String(s.clone()))),
            },
            Some(other) => Err(invalid(key, "a boolean", other)),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

fn invalid(key: &str, expected: &str, got: &serde_json::Value) -> MailError {
    MailError::Configuration(format!(
        "backend parameter '{}' must be {}, got {}",
        key, expected, got
    ))
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for BackendParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<BTreeMap<String, serde_json::Value>> for BackendParams {
    fn from(map: BTreeMap<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Builds a mailer from backend parameters.
pub type BackendFactory =
    Arc<dyn Fn(&BackendParams) -> Result<Arc<dyn Mailer>, MailError> + Send + Sync>;

/// Maps backend names to factories.
///
/// ```
/// use std::sync::Arc;
/// use mail_dispatch::{BackendRegistry, Mailer};
/// use mail_dispatch::providers::LoggerMailer;
///
/// let mut registry = BackendRegistry::new();
/// registry.register("quiet", |_params| Ok(Arc::new(LoggerMailer::new()) as Arc<dyn Mailer>));
/// assert!(registry.contains("quiet"));
/// ```
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
    #[cfg(feature = "local")]
    outbox: Arc<MemoryStorage>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            #[cfg(feature = "local")]
            outbox: MemoryStorage::shared(),
        }
    }

    /// A registry with the built-in backends: `logger`, `logger_full`,
    /// `local` (with the `local` feature) and `smtp`.
    ///
    /// Every `local` mailer built by this registry writes to the same outbox,
    /// available through [`BackendRegistry::local_outbox`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("logger", |_| {
            Ok(Arc::new(providers::LoggerMailer::new()) as Arc<dyn Mailer>)
        });
        registry.register("logger_full", |_| {
            Ok(Arc::new(providers::LoggerMailer::full()) as Arc<dyn Mailer>)
        });

        #[cfg(feature = "local")]
        {
            let outbox = Arc::clone(&registry.outbox);
            registry.register("local", move |_| {
                Ok(Arc::new(providers::LocalMailer::with_storage(Arc::clone(&outbox)))
                    as Arc<dyn Mailer>)
            });
        }

        #[cfg(feature = "smtp")]
        registry.register("smtp", |params| {
            Ok(Arc::new(providers::SmtpMailer::from_params(params)?) as Arc<dyn Mailer>)
        });
        #[cfg(not(feature = "smtp"))]
        registry.register("smtp", |_| {
            Err(MailError::Configuration(
                "backend 'smtp' requires the 'smtp' feature. \
                Add `features = [\"smtp\"]` to Cargo.toml"
                    .into(),
            ))
        });

        registry
    }

    /// Register (or replace) a backend factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&BackendParams) -> Result<Arc<dyn Mailer>, MailError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the backend registered under `name`.
    ///
    /// Unknown names fail with [`MailError::Configuration`], as does a mailer
    /// whose `validate_config()` rejects the parameters it was built from.
    pub fn resolve(&self, name: &str, params: &BackendParams) -> Result<DeliveryBackend, MailError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            MailError::Configuration(format!(
                "Unknown delivery backend: {}. Registered backends are: {}",
                name,
                self.names().join(", ")
            ))
        })?;

        let mailer = factory(params)?;
        mailer.validate_config()?;

        tracing::debug!(backend = name, provider = mailer.provider_name(), "Resolved delivery backend");

        Ok(DeliveryBackend {
            name: name.to_string(),
            mailer,
        })
    }

    /// The outbox shared by every `local` mailer this registry builds.
    #[cfg(feature = "local")]
    pub fn local_outbox(&self) -> Arc<MemoryStorage> {
        Arc::clone(&self.outbox)
    }

    /// A `LocalMailer` view over the shared outbox, for assertions.
    #[cfg(feature = "local")]
    pub fn local_mailer(&self) -> providers::LocalMailer {
        providers::LocalMailer::with_storage(self.local_outbox())
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

/// A resolved delivery backend.
///
/// Performs no retries of its own: whatever the underlying mailer raises is
/// returned to the caller.
pub struct DeliveryBackend {
    name: String,
    mailer: Arc<dyn Mailer>,
}

impl DeliveryBackend {
    /// The name this backend was resolved from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provider_name(&self) -> &'static str {
        self.mailer.provider_name()
    }

    pub async fn open(&self) -> Result<(), MailError> {
        self.mailer.open().await
    }

    pub async fn close(&self) -> Result<(), MailError> {
        self.mailer.close().await
    }

    /// Hand `emails` to the transport. Returns how many were accepted.
    pub async fn send(&self, emails: &[Email]) -> Result<usize, MailError> {
        Ok(self.mailer.deliver_many(emails).await?.len())
    }

    /// Like [`send`](Self::send), decoding records first.
    pub async fn send_messages(&self, messages: Vec<MessageLike>) -> Result<usize, MailError> {
        let emails = messages
            .into_iter()
            .map(MessageLike::into_email)
            .collect::<Result<Vec<_>, _>>()?;
        self.send(&emails).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::DeliveryResult;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct Picky;

    #[async_trait]
    impl Mailer for Picky {
        async fn deliver(&self, _email: &Email) -> Result<DeliveryResult, MailError> {
            Ok(DeliveryResult::new("picky"))
        }

        fn validate_config(&self) -> Result<(), MailError> {
            Err(MailError::Configuration("picky never likes its config".into()))
        }
    }

    fn email() -> Email {
        Email::new()
            .from("a@example.com")
            .to("b@example.com")
            .subject("hi")
    }

    #[test]
    fn test_params_accessors() {
        let params = BackendParams::new()
            .with("host", "smtp.example.com")
            .with("port", 587)
            .with("port_str", "2525")
            .with("use_tls", true)
            .with("use_ssl", "0");

        assert_eq!(params.get_str("host").unwrap(), Some("smtp.example.com"));
        assert_eq!(params.get_u64("port").unwrap(), Some(587));
        assert_eq!(params.get_u64("port_str").unwrap(), Some(2525));
        assert_eq!(params.get_bool("use_tls").unwrap(), Some(true));
        assert_eq!(params.get_bool("use_ssl").unwrap(), Some(false));
        assert_eq!(params.get_str("missing").unwrap(), None);
        assert!(params.get_str("port").is_err());
        assert!(params.get_u64("host").is_err());
    }

    #[test]
    fn test_params_serialize_flat() {
        let params: BackendParams = [("username", "user"), ("password", "pass")]
            .into_iter()
            .collect();
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            serde_json::json!({"username": "user", "password": "pass"})
        );
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        let registry = BackendRegistry::with_defaults();
        let err = registry
            .resolve("carrier-pigeon", &BackendParams::new())
            .err()
            .unwrap();
        assert!(matches!(err, MailError::Configuration(msg) if msg.contains("carrier-pigeon")));
    }

    #[test]
    fn test_validate_config_runs_on_resolve() {
        let mut registry = BackendRegistry::new();
        registry.register("picky", |_| Ok(Arc::new(Picky) as Arc<dyn Mailer>));
        assert!(matches!(
            registry.resolve("picky", &BackendParams::new()),
            Err(MailError::Configuration(_))
        ));
    }

    #[test]
    fn test_params_reach_factory() {
        let seen: Arc<Mutex<Option<BackendParams>>> = Arc::default();
        let captured = Arc::clone(&seen);

        let mut registry = BackendRegistry::new();
        registry.register("tracing", move |params| {
            *captured.lock() = Some(params.clone());
            Ok(Arc::new(providers::LoggerMailer::new()) as Arc<dyn Mailer>)
        });

        let params = BackendParams::new().with("foo", "bar");
        let backend = registry.resolve("tracing", &params).unwrap();

        assert_eq!(backend.name(), "tracing");
        assert_eq!(seen.lock().as_ref(), Some(&params));
    }

    #[cfg(feature = "local")]
    #[tokio::test]
    async fn test_local_backends_share_outbox() {
        let registry = BackendRegistry::with_defaults();
        let first = registry.resolve("local", &BackendParams::new()).unwrap();
        let second = registry.resolve("local", &BackendParams::new()).unwrap();

        assert_eq!(first.send(&[email()]).await.unwrap(), 1);
        let record = crate::codec::encode(&email()).unwrap();
        assert_eq!(second.send_messages(vec![record.into()]).await.unwrap(), 1);

        assert_eq!(registry.local_mailer().email_count(), 2);
    }

    #[cfg(not(feature = "smtp"))]
    #[test]
    fn test_smtp_without_feature_explains_itself() {
        let registry = BackendRegistry::with_defaults();
        let err = registry.resolve("smtp", &BackendParams::new()).err().unwrap();
        assert!(err.to_string().contains("'smtp' feature"));
    }
}
