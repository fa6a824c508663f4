//! Delivery transports.
//!
//! Each transport implements the [`Mailer`](crate::Mailer) trait and is
//! registered by name in [`BackendRegistry::with_defaults`](crate::BackendRegistry::with_defaults).
//!
//! | Name | Transport | Feature Flag |
//! |------|-----------|-------------|
//! | `smtp` | [`SmtpMailer`] | `smtp` |
//! | `local` | [`LocalMailer`] | `local` |
//! | `logger`, `logger_full` | [`LoggerMailer`] | (none) |

#[cfg(feature = "smtp")]
mod smtp;
#[cfg(feature = "smtp")]
pub use smtp::{SmtpBuilder, SmtpMailer, TlsMode};

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::LocalMailer;

mod logger;
pub use logger::LoggerMailer;
