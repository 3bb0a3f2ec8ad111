//! # mailsweep-core
//!
//! Single-account mailbox sync over IMAP.
//!
//! A pass refreshes the account's `OAuth2` access token, opens an XOAUTH2
//! session, moves everything in the junk folder back into the inbox, then
//! fetches the newest inbox messages, flattens each into one renderable
//! body and hands the unique ones to a [`MailStore`].
//!
//! ```ignore
//! use mailsweep_core::{MailAccount, AccountId, MemoryStore, SyncConfig, SyncEngine};
//!
//! let engine = SyncEngine::from_config(SyncConfig::default(), MemoryStore::new())?;
//! let account = MailAccount::new(AccountId(1), "me@outlook.com", refresh_token, client_id);
//! let result = engine
//!     .check_account(&account, |percent: u8, label: &str| println!("{percent:>3}% {label}"))
//!     .await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod auth;
pub mod config;
pub mod dedup;
mod error;
pub mod fetch;
pub mod junk;
pub mod message;
pub mod progress;
pub mod session;
pub mod store;
pub mod sync;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::cast_possible_truncation)]
mod testing;

pub use account::{AccountId, MailAccount, normalize_check_time};
pub use auth::TokenSource;
pub use config::{FolderAliases, FolderKind, ProviderConfig, SyncConfig};
pub use dedup::{Deduplicator, IdentityKey};
pub use error::{Error, Result};
pub use junk::ConsolidationOutcome;
pub use message::MailMessage;
pub use progress::{ProgressReporter, overall_progress};
pub use session::{Connector, ImapConnector, MailSession, SessionManager};
pub use store::{MailStore, MemoryStore};
pub use sync::{SyncEngine, SyncResult};
