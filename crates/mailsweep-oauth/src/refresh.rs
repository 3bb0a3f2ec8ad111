//! Refresh-token exchange.

use std::collections::HashMap;

use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::provider::Provider;
use crate::token::{AccessToken, TokenResponse};

/// Exchanges refresh tokens for access tokens at a provider's token endpoint.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl TokenRefresher {
    /// Creates a refresher for the given provider.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            http_client: Client::new(),
        }
    }

    /// Replaces the HTTP client (timeouts, proxies, test fixtures).
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Performs one refresh-token grant.
    ///
    /// The response body is parsed whatever the HTTP status, since token
    /// endpoints report `invalid_grant` and friends with a 400. There is no
    /// retry: the first failure is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OAuth`] if the endpoint reports an error,
    /// [`crate::Error::Http`] / [`crate::Error::Json`] on transport or parse
    /// failures and [`crate::Error::InvalidResponse`] if no token came back.
    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> Result<AccessToken> {
        let scope = self.provider.default_scopes.join(" ");

        let mut params = HashMap::new();
        params.insert("client_id", client_id);
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        if !scope.is_empty() {
            params.insert("scope", scope.as_str());
        }

        debug!(provider = %self.provider.name, url = %self.provider.token_url, "requesting access token");

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        match TokenResponse::from_json(&body).and_then(TokenResponse::into_access_token) {
            Ok(token) => {
                info!(provider = %self.provider.name, "obtained new access token");
                Ok(token)
            }
            Err(e) => {
                warn!(provider = %self.provider.name, %status, error = %e, "access token refresh failed");
                Err(e)
            }
        }
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
    use crate::Error;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response and hands back the raw request.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/common/oauth2/v2.0/token", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(end) = text.find("\r\n\r\n") {
                    let content_length = text[..end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(request).unwrap()
        });

        (url, handle)
    }

    fn refresher(url: &str) -> TokenRefresher {
        let provider = Provider::new("Test", url).unwrap();
        let client = Client::builder().no_proxy().build().unwrap();
        TokenRefresher::new(provider).with_http_client(client)
    }

    #[tokio::test]
    async fn test_refresh_success() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"token_type":"Bearer","expires_in":3600,"access_token":"fresh-token"}"#,
        )
        .await;

        let token = refresher(&url).refresh("rt-123", "client-abc").await.unwrap();
        assert_eq!(token.as_str(), "fresh-token");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /common/oauth2/v2.0/token"));
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=rt-123"));
        assert!(request.contains("client_id=client-abc"));
        assert!(!request.contains("scope="));
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant() {
        let (url, server) = serve_once(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"AADSTS70000: expired"}"#,
        )
        .await;

        let err = refresher(&url).refresh("rt-old", "client-abc").await.unwrap_err();
        assert_eq!(err.oauth_code(), Some("invalid_grant"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_garbage_body() {
        let (url, server) = serve_once("502 Bad Gateway", "upstream down").await;

        let err = refresher(&url).refresh("rt", "client").await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        drop(listener);

        let err = refresher(&url).refresh("rt", "client").await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
