use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::MailerError;

const PROVISION_URL: &str = "https://api.nodemailer.com/user";
const WEB_URL: &str = "https://ethereal.email";

#[derive(Debug, Serialize)]
struct ProvisionRequest<'a> {
  requestor: &'a str,
  version: &'a str,
}

/// Disposable mailbox provisioned on the Ethereal test relay.
#[derive(Debug, Clone, Deserialize)]
pub struct TestAccount {
  pub user: String,
  pub pass: String,
}

/// Provision a fresh disposable account against the Ethereal API.
pub(crate) async fn create_test_account() -> Result<TestAccount, MailerError> {
  debug!("Requesting Ethereal test account");

  let request = ProvisionRequest {
    requestor: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
  };

  let response = reqwest::Client::new()
    .post(PROVISION_URL)
    .json(&request)
    .send()
    .await
    .map_err(|e| MailerError::TransportUnavailable(format!("Ethereal provisioning failed: {}", e)))?
    .error_for_status()
    .map_err(|e| MailerError::TransportUnavailable(format!("Ethereal provisioning failed: {}", e)))?;

  let account: TestAccount = response
    .json()
    .await
    .map_err(|e| MailerError::TransportUnavailable(format!("Malformed Ethereal response: {}", e)))?;

  Ok(account)
}

/// Extract the hosted preview link from an Ethereal SMTP accept response.
///
/// The relay answers submission with a line like
/// `250 Accepted [STATUS=new MSGID=XojQZNSU3.SGdpEq]`; the MSGID token keys
/// the message view on the Ethereal web UI.
pub(crate) fn preview_url(smtp_response: &str) -> Option<String> {
  let start = smtp_response.find("MSGID=")? + "MSGID=".len();
  let id: String = smtp_response[start..]
    .chars()
    .take_while(|c| !c.is_whitespace() && *c != ']')
    .collect();

  if id.is_empty() {
    return None;
  }

  Some(format!("{}/message/{}", WEB_URL, id))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_preview_url_from_accept_response() {
    let response = "250 Accepted [STATUS=new MSGID=XojQZNSU3.SGdpEqXojgAAAB]";
    assert_eq!(
      preview_url(response),
      Some("https://ethereal.email/message/XojQZNSU3.SGdpEqXojgAAAB".to_string())
    );
  }

  #[test]
  fn test_preview_url_absent_without_msgid() {
    assert_eq!(preview_url("250 OK: queued as 12345"), None);
    assert_eq!(preview_url("250 Accepted [STATUS=new MSGID=]"), None);
  }

  #[test]
  fn test_test_account_parsing() {
    let body = r#"{
      "status": "success",
      "user": "orville.hermann@ethereal.email",
      "pass": "s3cr3tpass",
      "smtp": {"host": "smtp.ethereal.email", "port": 587, "secure": false},
      "web": "https://ethereal.email"
    }"#;

    let account: TestAccount = serde_json::from_str(body).unwrap();
    assert_eq!(account.user, "orville.hermann@ethereal.email");
    assert_eq!(account.pass, "s3cr3tpass");
  }
}
