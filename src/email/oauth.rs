use serde::Deserialize;
use tracing::debug;

use super::error::{AuthChallengeStep, MailerError};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
  error: String,
  #[serde(default)]
  error_description: Option<String>,
}

impl TokenErrorResponse {
  fn reason(self) -> String {
    match self.error_description {
      Some(description) => format!("{}: {}", self.error, description),
      None => self.error,
    }
  }
}

/// Exchange a long-lived refresh token for a short-lived access token.
///
/// Google does not always return a new refresh token on refresh, so only the
/// access token is surfaced here.
pub(crate) async fn fetch_access_token(
  client_id: &str,
  client_secret: &str,
  refresh_token: &str,
) -> Result<String, MailerError> {
  debug!("Refreshing OAuth2 access token");

  let params = [
    ("client_id", client_id),
    ("client_secret", client_secret),
    ("refresh_token", refresh_token),
    ("grant_type", "refresh_token"),
  ];

  let response = reqwest::Client::new()
    .post(TOKEN_URL)
    .form(&params)
    .send()
    .await
    .map_err(|e| MailerError::AuthChallengeFailed {
      step: AuthChallengeStep::TokenRefresh,
      reason: e.to_string(),
    })?;

  if !response.status().is_success() {
    let reason = match response.json::<TokenErrorResponse>().await {
      Ok(body) => body.reason(),
      Err(e) => e.to_string(),
    };
    return Err(MailerError::AuthChallengeFailed {
      step: AuthChallengeStep::TokenRefresh,
      reason,
    });
  }

  let token: TokenResponse =
    response
      .json()
      .await
      .map_err(|e| MailerError::AuthChallengeFailed {
        step: AuthChallengeStep::TokenRefresh,
        reason: format!("Malformed token response: {}", e),
      })?;

  Ok(token.access_token)
}
