//! Account model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::check_time::deserialize_check_time;

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mailbox the engine can sync.
#[derive(Clone, Serialize, Deserialize)]
pub struct MailAccount {
    /// Account identifier used by the store.
    pub id: AccountId,
    /// Mailbox address, also the XOAUTH2 user.
    pub email: String,
    /// Long-lived OAuth2 refresh token.
    pub refresh_token: String,
    /// OAuth2 application (client) ID.
    pub client_id: String,
    /// End of the previous successful pass, if any.
    ///
    /// Stored values may be RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`;
    /// anything else reads as `None`.
    #[serde(default, deserialize_with = "deserialize_check_time")]
    pub last_check_time: Option<DateTime<Utc>>,
}

impl MailAccount {
    /// Creates an account that has never been checked.
    pub fn new(
        id: AccountId,
        email: impl Into<String>,
        refresh_token: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            refresh_token: refresh_token.into(),
            client_id: client_id.into(),
            last_check_time: None,
        }
    }

    /// Sets the last check time.
    #[must_use]
    pub fn with_last_check_time(mut self, at: DateTime<Utc>) -> Self {
        self.last_check_time = Some(at);
        self
    }
}

impl std::fmt::Debug for MailAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailAccount")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("last_check_time", &self.last_check_time)
            .finish()
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
    use chrono::TimeZone;

    #[test]
    fn test_account_id_display() {
        assert_eq!(AccountId::new(42).to_string(), "42");
    }

    #[test]
    fn test_debug_hides_refresh_token() {
        let account = MailAccount::new(AccountId(1), "a@outlook.com", "secret-refresh", "cid");
        let debug = format!("{account:?}");
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("a@outlook.com"));
    }

    #[test]
    fn test_deserialize_without_check_time() {
        let json = r#"{"id":7,"email":"a@b.c","refresh_token":"r","client_id":"c"}"#;
        let account: MailAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.id, AccountId(7));
        assert!(account.last_check_time.is_none());
    }

    #[test]
    fn test_deserialize_space_separated_check_time() {
        let json = r#"{"id":7,"email":"a@b.c","refresh_token":"r","client_id":"c","last_check_time":"2024-01-01 00:00:00"}"#;
        let account: MailAccount = serde_json::from_str(json).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(account.last_check_time, Some(at));
        assert_eq!(
            crate::fetch::search_query(account.last_check_time.as_ref()),
            "(SINCE \"01-Jan-2024\")"
        );
    }

    #[test]
    fn test_deserialize_unparseable_check_time_is_none() {
        let json = r#"{"id":7,"email":"a@b.c","refresh_token":"r","client_id":"c","last_check_time":"last tuesday"}"#;
        let account: MailAccount = serde_json::from_str(json).unwrap();
        assert!(account.last_check_time.is_none());

        let json = r#"{"id":7,"email":"a@b.c","refresh_token":"r","client_id":"c","last_check_time":null}"#;
        let account: MailAccount = serde_json::from_str(json).unwrap();
        assert!(account.last_check_time.is_none());
    }

    #[test]
    fn test_serialized_check_time_reads_back() {
        let at = Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 58).unwrap();
        let account = MailAccount::new(AccountId(3), "a", "r", "c").with_last_check_time(at);

        let json = serde_json::to_string(&account).unwrap();
        let back: MailAccount = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_check_time, Some(at));
    }

    #[test]
    fn test_with_last_check_time() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let account = MailAccount::new(AccountId(1), "a", "r", "c").with_last_check_time(at);
        assert_eq!(account.last_check_time, Some(at));
    }
}
