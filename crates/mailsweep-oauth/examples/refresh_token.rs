//! Example: exchange a Microsoft refresh token for an access token
//!
//! ## Prerequisites
//!
//! An Azure AD app registration (its Application (client) ID) and a refresh
//! token previously issued to it with the `IMAP.AccessAsUser.All` and
//! `offline_access` scopes.
//!
//! ```bash
//! export OAUTH_CLIENT_ID="your-client-id-here"
//! export OAUTH_REFRESH_TOKEN="..."
//! export OAUTH_EMAIL="your-email@outlook.com"
//! cargo run --package mailsweep-oauth --example refresh_token
//! ```

use mailsweep_oauth::sasl::xoauth2_payload;
use mailsweep_oauth::{Provider, TokenRefresher};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client_id = env::var("OAUTH_CLIENT_ID")?;
    let refresh_token = env::var("OAUTH_REFRESH_TOKEN")?;
    let email = env::var("OAUTH_EMAIL")?;

    let provider = Provider::microsoft()?;
    println!("Provider:  {}", provider.name);
    println!("Token URL: {}", provider.token_url);

    let refresher = TokenRefresher::new(provider);
    match refresher.refresh(&refresh_token, &client_id).await {
        Ok(token) => {
            let payload = xoauth2_payload(&email, token.as_str());
            println!("Access token obtained ({} chars)", token.as_str().len());
            println!("XOAUTH2 payload is {} bytes before base64", payload.len());
        }
        Err(e) => {
            if let Some(code) = e.oauth_code() {
                println!("Token endpoint refused the refresh: {code}");
            }
            return Err(e.into());
        }
    }

    Ok(())
}
