use async_trait::async_trait;
use lettre::{
  message::{header::ContentType, Mailbox, MultiPart, SinglePart},
  transport::smtp::authentication::{Credentials, Mechanism},
  AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tokio::sync::OnceCell;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{AuthChallengeStep, MailerError};
use super::ethereal::{self, TestAccount};
use super::oauth;
use super::types::{
  EmailMessage, MailerCredentials, MessageResult, TransportVariant, ETHEREAL_SMTP_HOST,
  ETHEREAL_SMTP_PORT, GMAIL_SMTP_HOST, GMAIL_SMTP_PORT, SENDER_DISPLAY_NAME,
};

/// A configured SMTP client bound to one credential variant.
pub struct MailerTransport {
  transporter: AsyncSmtpTransport<Tokio1Executor>,
  sender: String,
  variant: TransportVariant,
  ready: bool,
}

impl MailerTransport {
  /// Gmail submission with XOAUTH2, implicit TLS on port 465.
  pub(crate) fn oauth2(user: &str, access_token: &str) -> Result<Self, MailerError> {
    let transporter = AsyncSmtpTransport::<Tokio1Executor>::relay(GMAIL_SMTP_HOST)
      .map_err(|e| MailerError::TransportUnavailable(e.to_string()))?
      .port(GMAIL_SMTP_PORT)
      .credentials(Credentials::new(user.to_string(), access_token.to_string()))
      .authentication(vec![Mechanism::Xoauth2])
      .build();

    Ok(MailerTransport {
      transporter,
      sender: user.to_string(),
      variant: TransportVariant::OAuth2,
      ready: false,
    })
  }

  /// Gmail submission with an app password, implicit TLS on port 465.
  pub(crate) fn app_password(user: &str, password: &str) -> Result<Self, MailerError> {
    let transporter = AsyncSmtpTransport::<Tokio1Executor>::relay(GMAIL_SMTP_HOST)
      .map_err(|e| MailerError::TransportUnavailable(e.to_string()))?
      .port(GMAIL_SMTP_PORT)
      .credentials(Credentials::new(user.to_string(), password.to_string()))
      .build();

    Ok(MailerTransport {
      transporter,
      sender: user.to_string(),
      variant: TransportVariant::AppPassword,
      ready: false,
    })
  }

  /// Ethereal test relay, STARTTLS on port 587.
  pub(crate) fn ephemeral(account: &TestAccount) -> Result<Self, MailerError> {
    let transporter = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(ETHEREAL_SMTP_HOST)
      .map_err(|e| MailerError::TransportUnavailable(e.to_string()))?
      .port(ETHEREAL_SMTP_PORT)
      .credentials(Credentials::new(account.user.clone(), account.pass.clone()))
      .build();

    Ok(MailerTransport {
      transporter,
      sender: account.user.clone(),
      variant: TransportVariant::Ephemeral,
      ready: false,
    })
  }

  pub fn variant(&self) -> TransportVariant {
    self.variant
  }

  pub fn sender(&self) -> &str {
    &self.sender
  }

  /// Whether the connectivity handshake succeeded. An unverified transport
  /// is still handed out; delivery then fails at send time.
  pub fn is_ready(&self) -> bool {
    self.ready
  }
}

#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send_email(
    &self,
    to: &str,
    subject: &str,
    text: &str,
    html: &str,
  ) -> Result<MessageResult, MailerError>;

  async fn send_message(&self, message: &EmailMessage) -> Result<MessageResult, MailerError> {
    self
      .send_email(&message.to, &message.subject, &message.text, &message.html)
      .await
  }
}

/// Mail delivery service owning one lazily constructed shared transport.
///
/// The transport is built on the first send, verified once, and reused for
/// the life of the service. Concurrent first callers share a single
/// in-flight construction.
pub struct MailerService {
  credentials: Option<MailerCredentials>,
  transport: OnceCell<MailerTransport>,
}

impl MailerService {
  /// Service that selects credentials from the environment on first use.
  pub fn new() -> Self {
    MailerService {
      credentials: None,
      transport: OnceCell::new(),
    }
  }

  /// Service bound to explicit credentials instead of the environment.
  pub fn with_credentials(credentials: MailerCredentials) -> Self {
    MailerService {
      credentials: Some(credentials),
      transport: OnceCell::new(),
    }
  }

  /// Service seeded with a pre-built transport, skipping lazy construction.
  pub fn with_transport(transport: MailerTransport) -> Self {
    MailerService {
      credentials: None,
      transport: OnceCell::new_with(Some(transport)),
    }
  }

  pub(crate) async fn transport(&self) -> Result<&MailerTransport, MailerError> {
    self.transport.get_or_try_init(|| self.init_transport()).await
  }

  async fn init_transport(&self) -> Result<MailerTransport, MailerError> {
    let credentials = match &self.credentials {
      Some(credentials) => credentials.clone(),
      None => MailerCredentials::from_env(),
    };

    let mut transport = match &credentials {
      MailerCredentials::OAuth2 {
        user,
        client_id,
        client_secret,
        refresh_token,
      } => {
        let access_token =
          match oauth::fetch_access_token(client_id, client_secret, refresh_token).await {
            Ok(token) => token,
            Err(err) => {
              error!("Error connecting to email server: {}", err);
              log_auth_guidance(&err);
              // Construction still yields a client; authentication is
              // rejected again at verify or send time.
              String::new()
            }
          };
        MailerTransport::oauth2(user, &access_token)?
      }
      MailerCredentials::AppPassword { user, password } => {
        MailerTransport::app_password(user, password)?
      }
      MailerCredentials::Ephemeral => {
        let account = ethereal::create_test_account().await?;
        warn!(
          "No real email credentials found. Using Ethereal test account {} for local testing.",
          account.user
        );
        MailerTransport::ephemeral(&account)?
      }
    };

    match transport.transporter.test_connection().await {
      Ok(true) => {
        transport.ready = true;
        info!("Email server is ready to send messages");
      }
      Ok(false) => {
        warn!("Email server verification did not complete");
      }
      Err(err) => {
        error!("Error connecting to email server: {}", err);
        if transport.variant == TransportVariant::OAuth2 && err.is_permanent() {
          let challenge = MailerError::AuthChallengeFailed {
            step: AuthChallengeStep::Xoauth2,
            reason: err.to_string(),
          };
          log_auth_guidance(&challenge);
        }
      }
    }

    Ok(transport)
  }
}

impl Default for MailerService {
  fn default() -> Self {
    MailerService::new()
  }
}

#[async_trait]
impl Mailer for MailerService {
  async fn send_email(
    &self,
    to: &str,
    subject: &str,
    text: &str,
    html: &str,
  ) -> Result<MessageResult, MailerError> {
    let transport = match self.transport().await {
      Ok(transport) => transport,
      Err(err) => {
        error!("Error sending email: {}", err);
        return Err(err);
      }
    };

    let message_id = generate_message_id(transport.sender());
    let email = build_message(transport.sender(), to, subject, text, html, &message_id)?;

    match transport.transporter.send(email).await {
      Ok(response) => {
        info!("Message sent: {}", message_id);

        let preview_url = match transport.variant() {
          TransportVariant::Ephemeral => {
            let response_text = response.message().collect::<Vec<_>>().join(" ");
            let url = ethereal::preview_url(&response_text);
            if let Some(url) = &url {
              info!("Preview URL: {}", url);
            }
            url
          }
          _ => None,
        };

        Ok(MessageResult {
          message_id,
          preview_url,
        })
      }
      Err(err) => {
        error!("Error sending email: {}", err);
        Err(MailerError::Delivery(err))
      }
    }
  }
}

/// Operator guidance for rejected OAuth2 challenges, keyed by the step.
fn log_auth_guidance(err: &MailerError) {
  if let MailerError::AuthChallengeFailed { .. } = err {
    error!("OAuth2 authentication failed (invalid_grant). Common causes:");
    error!("- The refresh token was revoked or expired.");
    error!("- Re-generate the refresh token via Google's OAuth2 consent flow (request access_type=offline and prompt=consent).");
    error!("- Alternatively set an app-specific password and add EMAIL_PASSWORD to .env (works when the account has 2FA enabled).");
  }
}

fn build_message(
  from: &str,
  to: &str,
  subject: &str,
  text: &str,
  html: &str,
  message_id: &str,
) -> Result<Message, MailerError> {
  let from_mailbox = Mailbox::new(
    Some(SENDER_DISPLAY_NAME.to_string()),
    from
      .parse()
      .map_err(|e| MailerError::InvalidAddress(format!("{}: {}", from, e)))?,
  );
  let to_mailbox: Mailbox = to
    .parse()
    .map_err(|e| MailerError::InvalidAddress(format!("{}: {}", to, e)))?;

  let message = Message::builder()
    .from(from_mailbox)
    .to(to_mailbox)
    .subject(subject)
    .message_id(Some(message_id.to_string()))
    .multipart(
      MultiPart::alternative()
        .singlepart(
          SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string()),
        )
        .singlepart(
          SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(html.to_string()),
        ),
    )?;

  Ok(message)
}

/// Message-IDs use the sender's domain, like most submission agents do.
fn generate_message_id(sender: &str) -> String {
  let domain = match sender.split_once('@') {
    Some((_, domain)) if !domain.is_empty() => domain,
    _ => "localhost",
  };
  format!("<{}@{}>", Uuid::new_v4(), domain)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::env;

  #[test]
  fn test_generate_message_id_uses_sender_domain() {
    let id = generate_message_id("someone@example.com");
    assert!(id.starts_with('<'));
    assert!(id.ends_with("@example.com>"));
  }

  #[test]
  fn test_generate_message_id_falls_back_to_localhost() {
    assert!(generate_message_id("").ends_with("@localhost>"));
    assert!(generate_message_id("nodomain@").ends_with("@localhost>"));
  }

  #[test]
  fn test_build_message_is_multipart_alternative() {
    let message = build_message(
      "sender@example.com",
      "a@example.com",
      "Subj",
      "body",
      "<p>body</p>",
      "<test-id@example.com>",
    )
    .unwrap();

    let formatted = String::from_utf8(message.formatted()).unwrap();
    assert!(formatted.contains("Subject: Subj"));
    assert!(formatted.contains("multipart/alternative"));
    assert!(formatted.contains("text/plain"));
    assert!(formatted.contains("text/html"));
    assert!(formatted.contains("<p>body</p>"));
    assert!(formatted.contains("Message-ID: <test-id@example.com>"));
    assert!(formatted.contains("Courier"));
  }

  #[test]
  fn test_build_message_rejects_bad_recipient() {
    let result = build_message(
      "sender@example.com",
      "not-an-address",
      "Subj",
      "body",
      "<p>body</p>",
      "<test-id@example.com>",
    );
    assert!(matches!(result, Err(MailerError::InvalidAddress(_))));
  }

  #[test]
  fn test_build_message_rejects_bad_sender() {
    let result = build_message("", "a@example.com", "Subj", "body", "<p>body</p>", "<id@x>");
    assert!(matches!(result, Err(MailerError::InvalidAddress(_))));
  }

  #[tokio::test]
  async fn test_app_password_transport_metadata() {
    let transport = MailerTransport::app_password("user@gmail.com", "app-password").unwrap();
    assert_eq!(transport.variant(), TransportVariant::AppPassword);
    assert_eq!(transport.sender(), "user@gmail.com");
    assert!(!transport.is_ready());
  }

  #[tokio::test]
  async fn test_oauth2_transport_metadata() {
    let transport = MailerTransport::oauth2("user@gmail.com", "ya29.token").unwrap();
    assert_eq!(transport.variant(), TransportVariant::OAuth2);
    assert_eq!(transport.sender(), "user@gmail.com");
  }

  #[tokio::test]
  async fn test_ephemeral_transport_metadata() {
    let account = TestAccount {
      user: "disposable@ethereal.email".to_string(),
      pass: "pass".to_string(),
    };
    let transport = MailerTransport::ephemeral(&account).unwrap();
    assert_eq!(transport.variant(), TransportVariant::Ephemeral);
    assert_eq!(transport.sender(), "disposable@ethereal.email");
  }

  #[tokio::test]
  async fn test_seeded_transport_is_reused_across_calls() {
    let transport = MailerTransport::app_password("user@gmail.com", "app-password").unwrap();
    let service = MailerService::with_transport(transport);

    let first = service.transport().await.unwrap() as *const MailerTransport;
    let second = service.transport().await.unwrap() as *const MailerTransport;
    assert!(std::ptr::eq(first, second));
  }

  // Needs real credentials in the environment, so excluded from normal runs.
  #[tokio::test]
  #[ignore]
  async fn test_send_email_end_to_end() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    assert!(env::var("EMAIL_USER").is_ok(), "EMAIL_USER must be set for this test");

    let service = MailerService::new();
    let result = service
      .send_email("test@example.com", "Test Subject", "Test Body", "<p>Test Body</p>")
      .await?;

    assert!(!result.message_id.is_empty());

    Ok(())
  }
}
