//! Transactional email delivery.
//!
//! Selects SMTP credentials from the environment (OAuth2, app password, or a
//! disposable Ethereal test account), lazily builds one shared lettre
//! transport per service, and exposes a single send operation.

mod error;
mod ethereal;
mod oauth;
mod service;
mod types;

pub use error::{AuthChallengeStep, MailerError};
pub use ethereal::TestAccount;
pub use service::{Mailer, MailerService, MailerTransport};
pub use types::{EmailMessage, MailerCredentials, MessageResult, TransportVariant};
