//! `OAuth2` provider configurations.

use crate::error::{Error, Result};
use url::Url;

/// Token endpoint of the Microsoft identity platform (personal and work accounts).
pub const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Microsoft").
    pub name: String,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested alongside a refresh, if any.
    pub default_scopes: Vec<String>,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is invalid.
    pub fn new(name: impl Into<String>, token_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            token_url: Url::parse(token_url.as_ref())?,
            default_scopes: Vec::new(),
        })
    }

    /// Sets the default scopes.
    #[must_use]
    pub fn with_default_scopes(mut self, scopes: Vec<String>) -> Self {
        self.default_scopes = scopes;
        self
    }

    /// Microsoft/Outlook `OAuth2` provider configuration.
    ///
    /// Refresh requests are sent without a scope so the server reuses the
    /// scopes granted with the original consent.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Self::new("Microsoft", MICROSOFT_TOKEN_URL)
    }

    /// Validates that the token endpoint is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.token_url.host_str().is_none_or(str::is_empty) {
            return Err(Error::InvalidConfig("token_url has no host".into()));
        }
        if !matches!(self.token_url.scheme(), "https" | "http") {
            return Err(Error::InvalidConfig(format!(
                "token_url scheme must be http(s), got {}",
                self.token_url.scheme()
            )));
        }
        Ok(())
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

    #[test]
    fn test_microsoft_provider() {
        let provider = Provider::microsoft().unwrap();
        assert_eq!(provider.name, "Microsoft");
        assert_eq!(provider.token_url.as_str(), MICROSOFT_TOKEN_URL);
        assert!(provider.default_scopes.is_empty());
        provider.validate().unwrap();
    }

    #[test]
    fn test_custom_provider_rejects_bad_scheme() {
        let provider = Provider::new("Custom", "ftp://auth.example.com/token").unwrap();
        assert!(matches!(provider.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Provider::new("Broken", "not a url"),
            Err(Error::UrlError(_))
        ));
    }
}
