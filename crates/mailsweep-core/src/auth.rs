//! Credential plumbing between the token endpoint and the IMAP session.

use async_trait::async_trait;
use mailsweep_oauth::sasl::xoauth2_payload;
use mailsweep_oauth::{AccessToken, TokenRefresher};

use crate::account::MailAccount;
use crate::error::Result;

/// Produces a fresh access token for an account.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Exchanges the account's refresh token for an access token.
    async fn access_token(&self, account: &MailAccount) -> Result<AccessToken>;
}

#[async_trait]
impl TokenSource for TokenRefresher {
    async fn access_token(&self, account: &MailAccount) -> Result<AccessToken> {
        Ok(self
            .refresh(&account.refresh_token, &account.client_id)
            .await?)
    }
}

/// `AUTHENTICATE XOAUTH2` responder.
///
/// Answers every challenge with the same payload; the IMAP library takes
/// care of the base64 wrapping.
pub struct XOAuth2 {
    payload: String,
}

impl XOAuth2 {
    /// Builds the responder for `user` and `token`.
    #[must_use]
    pub fn new(user: &str, token: &AccessToken) -> Self {
        Self {
            payload: xoauth2_payload(user, token.as_str()),
        }
    }
}

impl async_imap::Authenticator for XOAuth2 {
    type Response = String;

    fn process(&mut self, _challenge: &[u8]) -> Self::Response {
        self.payload.clone()
    }
}

impl std::fmt::Debug for XOAuth2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XOAuth2").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use async_imap::Authenticator;

    #[test]
    fn test_xoauth2_response() {
        let mut auth = XOAuth2::new("a@outlook.com", &AccessToken::new("tok"));
        assert_eq!(auth.process(b""), "user=a@outlook.com\x01auth=Bearer tok\x01\x01");
        // Same answer on a second challenge
        assert_eq!(auth.process(b"err"), "user=a@outlook.com\x01auth=Bearer tok\x01\x01");
    }

    #[test]
    fn test_debug_hides_payload() {
        let auth = XOAuth2::new("a@outlook.com", &AccessToken::new("tok"));
        assert!(!format!("{auth:?}").contains("tok"));
    }
}
