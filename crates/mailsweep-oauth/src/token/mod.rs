//! `OAuth2` access tokens and token endpoint responses.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived bearer token.
///
/// No expiry is tracked: a token is requested at the start of every pass and
/// dropped at its end.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a bearer string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the bearer string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token and returns the bearer string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

// Bearer strings stay out of logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(<{} bytes>)", self.0.len())
    }
}

/// Body of a token endpoint response.
///
/// Success and failure share one shape so the `error` field can be checked
/// before anything else, whatever the HTTP status was.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token (present on success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Token type, usually "Bearer".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Error code (present on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Parses a raw response body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a JSON object.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(Into::into)
    }

    /// Turns the response into an access token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OAuth`] when an `error` field is present and
    /// [`Error::InvalidResponse`] when no usable token was returned.
    pub fn into_access_token(self) -> Result<AccessToken> {
        if let Some(error) = self.error {
            return Err(Error::oauth_error(
                error,
                self.error_description.unwrap_or_default(),
            ));
        }

        match self.access_token {
            Some(token) if !token.is_empty() => Ok(AccessToken::new(token)),
            _ => Err(Error::InvalidResponse(
                "response carries neither access_token nor error".to_string(),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = TokenResponse::from_json(
            r#"{"token_type":"Bearer","expires_in":3600,"access_token":"EwBgA8l6"}"#,
        )
        .unwrap();
        let token = response.into_access_token().unwrap();
        assert_eq!(token.as_str(), "EwBgA8l6");
    }

    #[test]
    fn test_error_response() {
        let response = TokenResponse::from_json(r#"{"error": "invalid_grant"}"#).unwrap();
        let err = response.into_access_token().unwrap_err();
        assert_eq!(err.oauth_code(), Some("invalid_grant"));
    }

    #[test]
    fn test_error_wins_over_token() {
        let response = TokenResponse::from_json(
            r#"{"access_token":"abc","error":"interaction_required","error_description":"AADSTS50076"}"#,
        )
        .unwrap();
        match response.into_access_token().unwrap_err() {
            Error::OAuth { error, description } => {
                assert_eq!(error, "interaction_required");
                assert_eq!(description, "AADSTS50076");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_token() {
        let response = TokenResponse::from_json(r#"{"token_type":"Bearer"}"#).unwrap();
        assert!(matches!(
            response.into_access_token(),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            TokenResponse::from_json("<html>502</html>"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let token = AccessToken::new("secret-bearer");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-bearer"));
    }
}
