//! IMAP sessions and the retrying session manager.
//!
//! [`MailSession`] is the small set of mailbox verbs a pass needs. The
//! production implementation is [`ImapSession`] (async-imap over rustls);
//! tests drive the same code through in-memory sessions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_imap::imap_proto::{Response, Status};
use async_trait::async_trait;
use futures::TryStreamExt;
use mailsweep_oauth::AccessToken;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, info, warn};

use crate::auth::XOAuth2;
use crate::config::{ProviderConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;

/// Mailbox verbs used by a sync pass.
///
/// Sequence numbers refer to the currently selected mailbox.
#[async_trait]
pub trait MailSession: Send {
    /// Lists every mailbox name (`LIST "" "*"`).
    async fn list_folders(&mut self) -> Result<Vec<String>>;

    /// Selects a mailbox and returns its message count.
    async fn select(&mut self, mailbox: &str) -> Result<u32>;

    /// Runs `SEARCH` and returns matching sequence numbers, ascending.
    async fn search(&mut self, query: &str) -> Result<Vec<u32>>;

    /// Fetches the full RFC 822 source of one message.
    async fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>>;

    /// Copies a sequence set to another mailbox.
    async fn copy(&mut self, ids: &str, mailbox: &str) -> Result<()>;

    /// Adds the `\Deleted` flag to a sequence set.
    async fn mark_deleted(&mut self, ids: &str) -> Result<()>;

    /// Permanently removes `\Deleted` messages from the selected mailbox.
    async fn expunge(&mut self) -> Result<()>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<()>;
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Session type produced.
    type Session: MailSession;

    /// Connects and authenticates `user` with `token`.
    async fn connect(&self, user: &str, token: &AccessToken) -> Result<Self::Session>;
}

/// Work done inside one session attempt.
#[async_trait]
pub trait SessionTask<S: MailSession + ?Sized>: Send {
    /// Value produced by a successful attempt.
    type Output: Send;

    /// Runs against an authenticated session.
    ///
    /// Progress is on the session-phase scale (0-100).
    async fn run(&mut self, session: &mut S, progress: &mut dyn ProgressReporter)
    -> Result<Self::Output>;
}

/// Formats sequence numbers as an IMAP sequence set (`1,2,3`).
#[must_use]
pub fn sequence_set(ids: &[u32]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Creates a TLS connector with the bundled web PKI roots.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

/// Implicit-TLS IMAP connector with XOAUTH2 authentication.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
}

impl ImapConnector {
    /// Creates a connector for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates a connector for a provider's IMAP server.
    #[must_use]
    pub fn from_provider(provider: &ProviderConfig) -> Self {
        Self::new(provider.imap_host.clone(), provider.imap_port)
    }

    async fn connect_tls(&self) -> Result<TlsStream<TcpStream>> {
        let tcp = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| Error::Connection(format!("{}:{}: {e}", self.host, self.port)))?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| Error::Connection(format!("invalid server name {}: {e}", self.host)))?;

        create_tls_connector()
            .connect(server_name, tcp)
            .await
            .map_err(|e| Error::Connection(format!("TLS handshake failed: {e}")))
    }
}

#[async_trait]
impl Connector for ImapConnector {
    type Session = ImapSession;

    async fn connect(&self, user: &str, token: &AccessToken) -> Result<ImapSession> {
        debug!(host = %self.host, port = self.port, "connecting");
        let stream = self.connect_tls().await?;
        let session = open_session(stream, user, token).await?;

        info!(host = %self.host, user, "IMAP session authenticated");
        Ok(session)
    }
}

/// Reads the server greeting, then authenticates `user` with XOAUTH2.
///
/// # Errors
///
/// Returns [`Error::Connection`] if the server closes the stream or greets
/// with anything but `OK`, and [`Error::Authentication`] if AUTHENTICATE is
/// refused.
pub async fn open_session<T>(stream: T, user: &str, token: &AccessToken) -> Result<ImapSession<T>>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    let mut client = async_imap::Client::new(stream);

    {
        let greeting = client
            .read_response()
            .await
            .ok_or_else(|| Error::Connection("connection closed before greeting".to_string()))??;
        check_greeting(greeting.parsed())?;
    }

    let session = client
        .authenticate("XOAUTH2", XOAuth2::new(user, token))
        .await
        .map_err(|(e, _)| Error::Authentication(e.to_string()))?;

    Ok(ImapSession { inner: session })
}

fn check_greeting(greeting: &Response<'_>) -> Result<()> {
    match greeting {
        Response::Data {
            status: Status::Ok, ..
        } => Ok(()),
        Response::Data {
            status, information, ..
        } => Err(Error::Connection(format!(
            "server greeting {status:?}: {}",
            information.as_deref().unwrap_or("")
        ))),
        other => Err(Error::Connection(format!("unexpected server greeting: {other:?}"))),
    }
}

/// Authenticated async-imap session, over TLS in production.
pub struct ImapSession<T = TlsStream<TcpStream>>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug,
{
    inner: async_imap::Session<T>,
}

#[async_trait]
impl<T> MailSession for ImapSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + fmt::Debug + Send,
{
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        let names: Vec<_> = self
            .inner
            .list(Some(""), Some("*"))
            .await?
            .try_collect()
            .await?;
        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }

    async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let mailbox = self.inner.select(mailbox).await?;
        Ok(mailbox.exists)
    }

    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = self.inner.search(query).await?.into_iter().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>> {
        let fetches: Vec<_> = self
            .inner
            .fetch(id.to_string(), "RFC822")
            .await?
            .try_collect()
            .await?;
        fetches
            .iter()
            .find_map(|f| f.body().map(<[u8]>::to_vec))
            .ok_or_else(|| Error::Operation(format!("FETCH {id} returned no body")))
    }

    async fn copy(&mut self, ids: &str, mailbox: &str) -> Result<()> {
        self.inner.copy(ids, mailbox).await?;
        Ok(())
    }

    async fn mark_deleted(&mut self, ids: &str) -> Result<()> {
        let _: Vec<_> = self
            .inner
            .store(ids, "+FLAGS (\\Deleted)")
            .await?
            .try_collect()
            .await?;
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        let _: Vec<u32> = self.inner.expunge().await?.try_collect().await?;
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.inner.logout().await?;
        Ok(())
    }
}

/// Runs session tasks with a fixed retry policy.
///
/// Each attempt opens a fresh session, runs the whole task, and logs out
/// again whatever the outcome. Attempts are separated by a fixed delay.
#[derive(Debug, Clone)]
pub struct SessionManager<C> {
    connector: C,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<C: Connector> SessionManager<C> {
    /// Creates a manager with an explicit retry policy.
    pub fn new(connector: C, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            connector,
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    /// Creates a manager using the retry policy from `config`.
    pub fn from_config(connector: C, config: &SyncConfig) -> Self {
        Self::new(connector, config.max_attempts, config.retry_delay)
    }

    /// Returns the connector.
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Runs `task` until an attempt succeeds or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetriesExhausted`] with the last failure once every
    /// attempt has failed.
    pub async fn run<T>(
        &self,
        user: &str,
        token: &AccessToken,
        task: &mut T,
        progress: &mut dyn ProgressReporter,
    ) -> Result<T::Output>
    where
        T: SessionTask<C::Session>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            progress.report(10, "Connecting to server");

            let mut session = None;
            let outcome = match self.connector.connect(user, token).await {
                Ok(connected) => task.run(session.insert(connected), progress).await,
                Err(e) => Err(e),
            };
            close(session).await;

            match outcome {
                Ok(output) => return Ok(output),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "IMAP session attempt failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(Error::RetriesExhausted {
            attempts: self.max_attempts,
            last: last_error,
        })
    }
}

/// Logs out if a session was opened; failures are only logged.
async fn close<S: MailSession>(session: Option<S>) {
    match session {
        Some(mut session) => {
            if let Err(e) = session.logout().await {
                debug!(error = %e, "logout failed, dropping connection");
            }
        }
        None => debug!("no session to close"),
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
    use crate::progress::NoProgress;
    use crate::testing::{FakeConnector, FakeServer, FakeSession};

    struct CountInbox;

    #[async_trait]
    impl SessionTask<FakeSession> for CountInbox {
        type Output = u32;

        async fn run(
            &mut self,
            session: &mut FakeSession,
            _progress: &mut dyn ProgressReporter,
        ) -> Result<u32> {
            session.select("INBOX").await
        }
    }

    fn manager(server: &FakeServer) -> SessionManager<FakeConnector> {
        SessionManager::new(server.connector(), 3, Duration::from_secs(1))
    }

    #[test]
    fn test_sequence_set() {
        assert_eq!(sequence_set(&[1, 2, 3]), "1,2,3");
        assert_eq!(sequence_set(&[7]), "7");
        assert_eq!(sequence_set(&[]), "");
    }

    #[test]
    fn test_create_tls_connector() {
        let _connector = create_tls_connector();
    }

    #[test]
    fn test_connector_from_provider() {
        let connector = ImapConnector::from_provider(&ProviderConfig::default());
        assert_eq!(connector.host, "outlook.live.com");
        assert_eq!(connector.port, 993);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let server = FakeServer::new();
        server.add_message("INBOX", b"Subject: a\r\n\r\nx");

        let count = manager(&server)
            .run("u", &AccessToken::new("t"), &mut CountInbox, &mut NoProgress)
            .await
            .unwrap();

        assert_eq!(count, 1);
        assert_eq!(server.connect_attempts(), 1);
        assert_eq!(server.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let server = FakeServer::new();
        server.fail_next_connects(2);

        let start = tokio::time::Instant::now();
        let result = manager(&server)
            .run("u", &AccessToken::new("t"), &mut CountInbox, &mut NoProgress)
            .await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(server.connect_attempts(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_exhaust() {
        let server = FakeServer::new();
        server.fail_next_connects(10);

        let err = manager(&server)
            .run("u", &AccessToken::new("t"), &mut CountInbox, &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(server.connect_attempts(), 3);
        assert_eq!(server.logouts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_failure_still_logs_out() {
        let server = FakeServer::new();
        server.fail_select("INBOX");
        server.fail_logout();

        let err = manager(&server)
            .run("u", &AccessToken::new("t"), &mut CountInbox, &mut NoProgress)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("3 attempts"));
        assert_eq!(server.connect_attempts(), 3);
        // Logout was attempted after every failed task, its error ignored
        assert_eq!(server.logouts(), 3);
    }
}
