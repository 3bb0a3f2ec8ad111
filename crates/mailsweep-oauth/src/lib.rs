//! # mailsweep-oauth
//!
//! `OAuth2` pieces needed to open a mail session with a refreshable credential.
//!
//! ## Features
//!
//! - **Token refresh**: exchange a long-lived refresh token for a fresh access token
//! - **Provider configurations**: token endpoints for Microsoft, Google and custom providers
//! - **SASL payloads**: the XOAUTH2 initial client response
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailsweep_oauth::{Provider, TokenRefresher, sasl::xoauth2_payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let refresher = TokenRefresher::new(Provider::microsoft()?);
//!     let token = refresher.refresh("refresh-token", "client-id").await?;
//!
//!     // Send: AUTHENTICATE XOAUTH2 base64(payload)
//!     let payload = xoauth2_payload("user@outlook.com", token.as_str());
//!     Ok(())
//! }
//! ```
//!
//! Tokens are never cached here: every call performs exactly one HTTP exchange
//! and the caller decides what to do with a failure.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod provider;
pub mod refresh;
pub mod sasl;
pub mod token;

pub use error::{Error, Result};
pub use provider::Provider;
pub use refresh::TokenRefresher;
pub use token::AccessToken;
