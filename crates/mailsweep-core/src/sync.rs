//! One end-to-end sync pass for a single account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailsweep_oauth::TokenRefresher;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::account::MailAccount;
use crate::auth::TokenSource;
use crate::config::{FolderAliases, SyncConfig};
use crate::error::Result;
use crate::fetch::{fetch_folder, fetch_inbox, list_folders};
use crate::junk::consolidate_junk;
use crate::message::MailMessage;
use crate::progress::{Monotonic, NoProgress, ProgressReporter, Remap, overall_progress};
use crate::session::{Connector, ImapConnector, MailSession, SessionManager, SessionTask};
use crate::store::MailStore;

/// Outcome of [`SyncEngine::check_account`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Whether the pass completed.
    pub success: bool,
    /// Human-readable summary or failure reason.
    pub message: String,
    /// Messages fetched after deduplication.
    pub total: usize,
    /// Messages the store accepted as new.
    pub saved: usize,
}

impl SyncResult {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            total: 0,
            saved: 0,
        }
    }
}

/// Junk consolidation followed by the inbox fetch, run once per attempt.
struct InboxPass<'a> {
    config: &'a SyncConfig,
    since: Option<DateTime<Utc>>,
}

#[async_trait]
impl<'a, S: MailSession> SessionTask<S> for InboxPass<'a> {
    type Output = Vec<MailMessage>;

    async fn run(
        &mut self,
        session: &mut S,
        progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<MailMessage>> {
        progress.report(20, "Checking junk folders");
        consolidate_junk(
            session,
            &self.config.junk_aliases,
            &self.config.inbox,
            self.config.strict_consolidation,
        )
        .await?;

        fetch_inbox(
            session,
            &self.config.inbox,
            self.since.as_ref(),
            self.config.max_messages,
            progress,
        )
        .await
    }
}

struct FolderList<'a> {
    folders: &'a FolderAliases,
}

#[async_trait]
impl<'a, S: MailSession> SessionTask<S> for FolderList<'a> {
    type Output = Vec<String>;

    async fn run(
        &mut self,
        session: &mut S,
        _progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<String>> {
        Ok(list_folders(session, self.folders).await)
    }
}

struct FolderBrowse<'a> {
    folder: &'a str,
    folders: &'a FolderAliases,
    limit: usize,
}

#[async_trait]
impl<'a, S: MailSession> SessionTask<S> for FolderBrowse<'a> {
    type Output = Vec<MailMessage>;

    async fn run(
        &mut self,
        session: &mut S,
        _progress: &mut dyn ProgressReporter,
    ) -> Result<Vec<MailMessage>> {
        Ok(fetch_folder(session, self.folder, self.folders, self.limit).await)
    }
}

/// Drives sync passes for one provider.
///
/// Generic over the token source, the IMAP connector and the store so each
/// collaborator can be swapped out.
pub struct SyncEngine<T, C, S> {
    config: SyncConfig,
    tokens: T,
    sessions: SessionManager<C>,
    store: S,
}

impl<S: MailStore> SyncEngine<TokenRefresher, ImapConnector, S> {
    /// Builds an engine talking to the configured provider over the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: SyncConfig, store: S) -> Result<Self> {
        config.validate()?;
        let tokens = TokenRefresher::new(config.provider.oauth_provider()?);
        let connector = ImapConnector::from_provider(&config.provider);
        Ok(Self::new(config, tokens, connector, store))
    }
}

impl<T, C, S> SyncEngine<T, C, S>
where
    T: TokenSource,
    C: Connector,
    S: MailStore,
{
    /// Assembles an engine from its parts.
    pub fn new(config: SyncConfig, tokens: T, connector: C, store: S) -> Self {
        let sessions = SessionManager::from_config(connector, &config);
        Self {
            config,
            tokens,
            sessions,
            store,
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Runs one full pass for `account`.
    ///
    /// Never fails: credential and session errors come back as a result
    /// with `success == false`. On success, progress goes from 0 to 100
    /// without ever decreasing; a failure is reported at 0 with its reason.
    pub async fn check_account(
        &self,
        account: &MailAccount,
        progress: impl FnMut(u8, &str) + Send,
    ) -> SyncResult {
        info!(account = %account.id, email = %account.email, "checking mailbox");

        let mut progress = progress;
        let mut tracker = Monotonic::new(&mut progress);

        match self.run_pass(account, &mut tracker).await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("Mail check failed for {}: {e}", account.email);
                error!(account = %account.id, email = %account.email, error = %e, "mail check failed");
                tracker.into_inner().report(0, &message);
                SyncResult::failed(message)
            }
        }
    }

    async fn run_pass(
        &self,
        account: &MailAccount,
        progress: &mut Monotonic<'_>,
    ) -> Result<SyncResult> {
        progress.report(0, "Requesting access token");
        let token = self.tokens.access_token(account).await?;

        if let Err(e) = self.store.update_token(account.id, &token).await {
            warn!(account = %account.id, error = %e, "failed to persist access token");
        }

        progress.report(10, "Fetching mail");
        let since = if self.config.incremental {
            account.last_check_time
        } else {
            None
        };
        let mut pass = InboxPass {
            config: &self.config,
            since,
        };
        let messages = {
            let mut remap = Remap::new(&mut *progress, overall_progress);
            self.sessions
                .run(&account.email, &token, &mut pass, &mut remap)
                .await?
        };

        let total = messages.len();
        progress.report(90, &format!("Fetched {total} messages, saving"));

        let mut saved = 0;
        for message in &messages {
            match self.store.add_record(account.id, message).await {
                Ok(true) => saved += 1,
                Ok(false) => debug!(key = %message.key, "message already stored"),
                Err(e) => warn!(key = %message.key, error = %e, "failed to store message"),
            }
        }

        if let Err(e) = self.store.update_check_time(account.id).await {
            warn!(account = %account.id, error = %e, "failed to update check time");
        }

        let message = format!("Done: {total} messages processed, {saved} new");
        progress.report(100, &message);
        info!(account = %account.id, email = %account.email, total, saved, "mailbox check complete");

        Ok(SyncResult {
            success: true,
            message,
            total,
            saved,
        })
    }

    /// Lists the account's folders.
    ///
    /// # Errors
    ///
    /// Returns an error if no token could be obtained or every session
    /// attempt failed.
    pub async fn list_folders(&self, account: &MailAccount) -> Result<Vec<String>> {
        let token = self.tokens.access_token(account).await?;
        let mut task = FolderList {
            folders: &self.config.folders,
        };
        self.sessions
            .run(&account.email, &token, &mut task, &mut NoProgress)
            .await
    }

    /// Reads the newest `limit` messages of `folder`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if no token could be obtained or every session
    /// attempt failed.
    pub async fn fetch_folder(
        &self,
        account: &MailAccount,
        folder: &str,
        limit: usize,
    ) -> Result<Vec<MailMessage>> {
        let token = self.tokens.access_token(account).await?;
        let mut task = FolderBrowse {
            folder,
            folders: &self.config.folders,
            limit,
        };
        self.sessions
            .run(&account.email, &token, &mut task, &mut NoProgress)
            .await
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
    use crate::account::AccountId;
    use crate::dedup::IdentityKey;
    use crate::error::Error;
    use crate::store::MemoryStore;
    use crate::testing::{FakeConnector, FakeServer, raw_message};
    use chrono::TimeZone;
    use mailsweep_oauth::AccessToken;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct StaticToken {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn access_token(&self, _account: &MailAccount) -> Result<AccessToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(mailsweep_oauth::Error::oauth_error("invalid_grant", "expired").into());
            }
            Ok(AccessToken::new("access"))
        }
    }

    /// Store that refuses every write.
    struct BrokenStore;

    #[async_trait]
    impl MailStore for BrokenStore {
        async fn update_token(&self, _: AccountId, _: &AccessToken) -> Result<()> {
            Err(Error::store("disk full"))
        }
        async fn add_record(&self, _: AccountId, _: &MailMessage) -> Result<bool> {
            Err(Error::store("disk full"))
        }
        async fn update_check_time(&self, _: AccountId) -> Result<()> {
            Err(Error::store("disk full"))
        }
    }

    fn account() -> MailAccount {
        MailAccount::new(AccountId(1), "user@outlook.com", "refresh", "client")
    }

    fn engine<S: MailStore>(
        server: &FakeServer,
        tokens: StaticToken,
        config: SyncConfig,
        store: S,
    ) -> SyncEngine<StaticToken, FakeConnector, S> {
        SyncEngine::new(config, tokens, server.connector(), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_pass() {
        let server = FakeServer::new();
        server.add_message("INBOX", &raw_message("a", "x@y.z", None, "1"));
        server.add_message("Junk", &raw_message("b", "x@y.z", None, "2"));
        let engine = engine(&server, StaticToken::default(), SyncConfig::default(), MemoryStore::new());

        let mut seen = Vec::new();
        let result = engine
            .check_account(&account(), |p: u8, _: &str| seen.push(p))
            .await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.total, 2);
        assert_eq!(result.saved, 2);
        assert_eq!(engine.store().records(AccountId(1)).len(), 2);
        assert_eq!(engine.store().token(AccountId(1)).unwrap().as_str(), "access");
        assert!(engine.store().check_time(AccountId(1)).is_some());

        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_failure_opens_no_session() {
        let server = FakeServer::new();
        let tokens = StaticToken {
            fail: true,
            ..StaticToken::default()
        };
        let engine = engine(&server, tokens, SyncConfig::default(), MemoryStore::new());

        let mut last = None;
        let result = engine
            .check_account(&account(), |p: u8, label: &str| last = Some((p, label.to_string())))
            .await;

        assert!(!result.success);
        assert!(result.message.contains("invalid_grant"));
        assert_eq!(server.connect_attempts(), 0);
        assert!(engine.store().check_time(AccountId(1)).is_none());
        assert_eq!(last.unwrap().0, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_exhaustion_fails_pass() {
        let server = FakeServer::new();
        server.fail_next_connects(3);
        let engine = engine(&server, StaticToken::default(), SyncConfig::default(), MemoryStore::new());

        let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

        assert!(!result.success);
        assert_eq!(result.total, 0);
        assert_eq!(server.connect_attempts(), 3);
        assert!(engine.store().check_time(AccountId(1)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failures_are_not_fatal() {
        let server = FakeServer::new();
        server.add_message("INBOX", &raw_message("a", "x@y.z", None, "1"));
        let engine = engine(&server, StaticToken::default(), SyncConfig::default(), BrokenStore);

        let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

        assert!(result.success);
        assert_eq!(result.total, 1);
        assert_eq!(result.saved, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incremental_uses_last_check_time() {
        let server = FakeServer::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let engine = engine(&server, StaticToken::default(), SyncConfig::default(), MemoryStore::new());

        engine
            .check_account(&account().with_last_check_time(at), |_: u8, _: &str| {})
            .await;

        let inbox_queries: Vec<_> = server
            .searches()
            .into_iter()
            .filter(|(folder, _)| folder == "INBOX")
            .map(|(_, query)| query)
            .collect();
        assert_eq!(inbox_queries, vec!["(SINCE \"01-Jan-2024\")"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_fetch_when_not_incremental() {
        let server = FakeServer::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let config = SyncConfig {
            incremental: false,
            ..SyncConfig::default()
        };
        let engine = engine(&server, StaticToken::default(), config, MemoryStore::new());

        engine
            .check_account(&account().with_last_check_time(at), |_: u8, _: &str| {})
            .await;

        assert_eq!(server.searches().last().unwrap().1, "ALL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_consolidation_retries_pass() {
        let server = FakeServer::new();
        server.add_message("Junk", &raw_message("b", "x@y.z", None, "2"));
        server.fail_copy();
        let config = SyncConfig {
            strict_consolidation: true,
            ..SyncConfig::default()
        };
        let engine = engine(&server, StaticToken::default(), config, MemoryStore::new());

        let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

        assert!(!result.success);
        assert_eq!(server.connect_attempts(), 3);
        assert_eq!(server.copies().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pass_saves_nothing_new() {
        let server = FakeServer::new();
        server.add_message("INBOX", &raw_message("a", "x@y.z", None, "1"));
        let engine = engine(&server, StaticToken::default(), SyncConfig::default(), MemoryStore::new());

        let first = engine.check_account(&account(), |_: u8, _: &str| {}).await;
        let second = engine.check_account(&account(), |_: u8, _: &str| {}).await;

        assert_eq!((first.total, first.saved), (1, 1));
        assert_eq!((second.total, second.saved), (1, 0));
        let keys: Vec<IdentityKey> = engine
            .store()
            .records(AccountId(1))
            .into_iter()
            .map(|m| m.key)
            .collect();
        assert_eq!(keys, vec![IdentityKey::new("a", "x@y.z", None)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_and_browse_folders() {
        let server = FakeServer::new();
        server.add_message("Archive", &raw_message("old", "x@y.z", None, "1"));
        let tokens = StaticToken::default();
        let engine = engine(&server, tokens, SyncConfig::default(), MemoryStore::new());

        let folders = engine.list_folders(&account()).await.unwrap();
        assert!(folders.contains(&"Archive".to_string()));
        assert!(folders.contains(&"sentitems".to_string()));

        let messages = engine.fetch_folder(&account(), "Archive", 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "old");
        assert_eq!(engine.tokens.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_result_serializes() {
        let json = serde_json::to_value(SyncResult::failed("boom".to_string())).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "boom");
        assert_eq!(json["total"], 0);
    }
}
