use std::error::Error;

/// Step of the OAuth2 challenge that was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChallengeStep {
  /// Exchanging the refresh token for an access token.
  TokenRefresh,
  /// The SMTP AUTH XOAUTH2 exchange itself.
  Xoauth2,
}

#[derive(Debug)]
pub enum MailerError {
  /// No transport could be constructed at all.
  TransportUnavailable(String),
  /// An OAuth2 challenge step was rejected.
  AuthChallengeFailed {
    step: AuthChallengeStep,
    reason: String,
  },
  InvalidAddress(String),
  MessageBuild(String),
  /// Submission failed; the underlying SMTP error is preserved unchanged.
  Delivery(lettre::transport::smtp::Error),
}

impl Error for MailerError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      MailerError::Delivery(err) => Some(err),
      _ => None,
    }
  }
}

impl std::fmt::Display for MailerError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      MailerError::TransportUnavailable(msg) => write!(f, "No transport available: {}", msg),
      MailerError::AuthChallengeFailed { step, reason } => match step {
        AuthChallengeStep::TokenRefresh => {
          write!(f, "OAuth2 token refresh failed: {}", reason)
        }
        AuthChallengeStep::Xoauth2 => {
          write!(f, "AUTH XOAUTH2 was rejected by the server: {}", reason)
        }
      },
      MailerError::InvalidAddress(msg) => write!(f, "Invalid email address: {}", msg),
      MailerError::MessageBuild(msg) => write!(f, "Failed to build message: {}", msg),
      MailerError::Delivery(err) => write!(f, "Failed to send message: {}", err),
    }
  }
}

impl From<lettre::transport::smtp::Error> for MailerError {
  fn from(err: lettre::transport::smtp::Error) -> Self {
    MailerError::Delivery(err)
  }
}

impl From<lettre::error::Error> for MailerError {
  fn from(err: lettre::error::Error) -> Self {
    MailerError::MessageBuild(err.to_string())
  }
}

impl From<lettre::address::AddressError> for MailerError {
  fn from(err: lettre::address::AddressError) -> Self {
    MailerError::InvalidAddress(err.to_string())
  }
}
