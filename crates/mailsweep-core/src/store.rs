//! Persistence boundary.
//!
//! The engine never owns storage: it hands tokens, records and check times
//! to a [`MailStore`]. [`MemoryStore`] is the in-process implementation used
//! by tests and the bundled example.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailsweep_oauth::AccessToken;

use crate::account::AccountId;
use crate::dedup::IdentityKey;
use crate::error::{Error, Result};
use crate::message::MailMessage;

/// Durable storage used by a sync pass.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Saves the access token obtained for `account`.
    async fn update_token(&self, account: AccountId, token: &AccessToken) -> Result<()>;

    /// Saves one message; returns `false` if the store already had it.
    async fn add_record(&self, account: AccountId, message: &MailMessage) -> Result<bool>;

    /// Marks `account` as checked now.
    async fn update_check_time(&self, account: AccountId) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    tokens: HashMap<AccountId, AccessToken>,
    records: HashMap<AccountId, Vec<MailMessage>>,
    keys: HashMap<AccountId, HashSet<IdentityKey>>,
    check_times: HashMap<AccountId, DateTime<Utc>>,
}

/// Keeps everything in memory; records are unique per account and key.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_string()))
    }

    /// Last token saved for `account`.
    #[must_use]
    pub fn token(&self, account: AccountId) -> Option<AccessToken> {
        self.lock().ok()?.tokens.get(&account).cloned()
    }

    /// Records saved for `account`, in insertion order.
    #[must_use]
    pub fn records(&self, account: AccountId) -> Vec<MailMessage> {
        self.lock()
            .ok()
            .and_then(|state| state.records.get(&account).cloned())
            .unwrap_or_default()
    }

    /// Last check time of `account`.
    #[must_use]
    pub fn check_time(&self, account: AccountId) -> Option<DateTime<Utc>> {
        self.lock().ok()?.check_times.get(&account).copied()
    }
}

#[async_trait]
impl MailStore for MemoryStore {
    async fn update_token(&self, account: AccountId, token: &AccessToken) -> Result<()> {
        self.lock()?.tokens.insert(account, token.clone());
        Ok(())
    }

    async fn add_record(&self, account: AccountId, message: &MailMessage) -> Result<bool> {
        let mut state = self.lock()?;
        if !state
            .keys
            .entry(account)
            .or_default()
            .insert(message.key.clone())
        {
            return Ok(false);
        }
        state
            .records
            .entry(account)
            .or_default()
            .push(message.clone());
        Ok(true)
    }

    async fn update_check_time(&self, account: AccountId) -> Result<()> {
        self.lock()?.check_times.insert(account, Utc::now());
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

    fn message(subject: &str) -> MailMessage {
        MailMessage {
            subject: subject.to_string(),
            sender: "a@b.c".to_string(),
            received: None,
            content: "body".to_string(),
            attachments: Vec::new(),
            folder: "INBOX".to_string(),
            key: IdentityKey::new(subject, "a@b.c", None),
        }
    }

    #[tokio::test]
    async fn test_add_record_rejects_duplicates() {
        let store = MemoryStore::new();
        let id = AccountId(1);

        assert!(store.add_record(id, &message("one")).await.unwrap());
        assert!(!store.add_record(id, &message("one")).await.unwrap());
        assert!(store.add_record(id, &message("two")).await.unwrap());
        // Keys are scoped per account
        assert!(store.add_record(AccountId(2), &message("one")).await.unwrap());

        let subjects: Vec<_> = store.records(id).into_iter().map(|m| m.subject).collect();
        assert_eq!(subjects, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_token_and_check_time() {
        let store = MemoryStore::new();
        let id = AccountId(3);
        assert!(store.token(id).is_none());
        assert!(store.check_time(id).is_none());

        store.update_token(id, &AccessToken::new("t1")).await.unwrap();
        store.update_token(id, &AccessToken::new("t2")).await.unwrap();
        store.update_check_time(id).await.unwrap();

        assert_eq!(store.token(id).unwrap().as_str(), "t2");
        assert!(store.check_time(id).is_some());
    }
}
