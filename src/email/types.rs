use serde::{Deserialize, Serialize};
use std::env;

/// Gmail SMTP endpoint used by the OAuth2 and app-password variants.
pub const GMAIL_SMTP_HOST: &str = "smtp.gmail.com";
pub const GMAIL_SMTP_PORT: u16 = 465;

/// Ethereal test relay used when no real credentials are configured.
pub const ETHEREAL_SMTP_HOST: &str = "smtp.ethereal.email";
pub const ETHEREAL_SMTP_PORT: u16 = 587;

/// Display name combined with the account address on outgoing mail.
pub const SENDER_DISPLAY_NAME: &str = "Courier";

/// Credentials the mailer authenticates with, exactly one active per service.
///
/// Selected by priority: OAuth2 when the full client id / client secret /
/// refresh token trio is present, then an app password, then a disposable
/// Ethereal test account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailerCredentials {
  OAuth2 {
    user: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
  },
  AppPassword {
    user: String,
    password: String,
  },
  Ephemeral,
}

impl MailerCredentials {
  /// Select the credential variant from the process environment.
  pub fn from_env() -> Self {
    let user = env::var("EMAIL_USER").unwrap_or_default();

    let client_id = env::var("CLIENT_ID").ok();
    let client_secret = env::var("CLIENT_SECRET").ok();
    let refresh_token = env::var("REFRESH_TOKEN").ok();

    if let (Some(client_id), Some(client_secret), Some(refresh_token)) =
      (client_id, client_secret, refresh_token)
    {
      return MailerCredentials::OAuth2 {
        user,
        client_id,
        client_secret,
        refresh_token,
      };
    }

    if let Ok(password) = env::var("EMAIL_PASSWORD") {
      return MailerCredentials::AppPassword { user, password };
    }

    MailerCredentials::Ephemeral
  }
}

/// Which transport variant a service ended up bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportVariant {
  OAuth2,
  AppPassword,
  Ephemeral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
  pub to: String,
  pub subject: String,
  pub text: String,
  pub html: String,
}

impl EmailMessage {
  pub fn new(to: String, subject: String, text: String, html: String) -> Self {
    EmailMessage {
      to,
      subject,
      text,
      html,
    }
  }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResult {
  /// Message-ID assigned to the outgoing message.
  pub message_id: String,
  /// Human-viewable preview link, only present for the Ephemeral variant.
  pub preview_url: Option<String>,
}
