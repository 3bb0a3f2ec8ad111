//! Junk consolidation: move everything from the junk folder into the inbox.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::{MailSession, sequence_set};

/// What a consolidation run did.
///
/// Failures after the junk folder was found are recovered, not raised; they
/// are reported here so callers can log or escalate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// No alias could be selected.
    NotFound,
    /// The junk folder was empty.
    Empty {
        /// Alias that selected.
        folder: String,
    },
    /// Messages were copied to the inbox and removed from junk.
    Moved {
        /// Alias that selected.
        folder: String,
        /// Number of messages moved.
        count: usize,
    },
    /// Listing the junk folder failed.
    SearchFailed {
        /// Alias that selected.
        folder: String,
        /// Server error.
        error: String,
    },
    /// The copy was refused; junk was left untouched.
    CopyFailed {
        /// Alias that selected.
        folder: String,
        /// Server error.
        error: String,
    },
    /// Messages reached the inbox but could not be removed from junk.
    CleanupFailed {
        /// Alias that selected.
        folder: String,
        /// Number of messages copied.
        count: usize,
        /// Server error.
        error: String,
    },
}

impl ConsolidationOutcome {
    /// Returns the swallowed error, if any.
    #[must_use]
    pub fn recovered_error(&self) -> Option<&str> {
        match self {
            Self::SearchFailed { error, .. }
            | Self::CopyFailed { error, .. }
            | Self::CleanupFailed { error, .. } => Some(error),
            Self::NotFound | Self::Empty { .. } | Self::Moved { .. } => None,
        }
    }

    /// Number of messages that reached the inbox.
    #[must_use]
    pub const fn moved(&self) -> usize {
        match self {
            Self::Moved { count, .. } | Self::CleanupFailed { count, .. } => *count,
            _ => 0,
        }
    }
}

/// Moves the contents of the first selectable junk alias into `inbox`.
///
/// Aliases are probed in order; the first one that selects is the only one
/// processed. With `strict` set, a recovered failure is returned as an error
/// instead.
///
/// # Errors
///
/// Only in strict mode, when the outcome carries a recovered error.
pub async fn consolidate_junk<S>(
    session: &mut S,
    aliases: &[String],
    inbox: &str,
    strict: bool,
) -> Result<ConsolidationOutcome>
where
    S: MailSession + ?Sized,
{
    let outcome = consolidate(session, aliases, inbox).await;

    if let Some(error) = outcome.recovered_error() {
        warn!(?outcome, "junk consolidation incomplete");
        if strict {
            return Err(Error::Operation(format!("junk consolidation: {error}")));
        }
    }
    Ok(outcome)
}

async fn consolidate<S>(session: &mut S, aliases: &[String], inbox: &str) -> ConsolidationOutcome
where
    S: MailSession + ?Sized,
{
    for alias in aliases {
        if let Err(e) = session.select(alias).await {
            debug!(folder = %alias, error = %e, "junk alias not selectable");
            continue;
        }
        info!(folder = %alias, "found junk folder");
        return drain(session, alias, inbox).await;
    }

    debug!("no junk folder found");
    ConsolidationOutcome::NotFound
}

async fn drain<S>(session: &mut S, folder: &str, inbox: &str) -> ConsolidationOutcome
where
    S: MailSession + ?Sized,
{
    let folder = folder.to_string();

    let ids = match session.search("ALL").await {
        Ok(ids) => ids,
        Err(e) => {
            return ConsolidationOutcome::SearchFailed {
                folder,
                error: e.to_string(),
            };
        }
    };
    if ids.is_empty() {
        return ConsolidationOutcome::Empty { folder };
    }

    let count = ids.len();
    let set = sequence_set(&ids);
    info!(folder = %folder, count, "moving junk messages to inbox");

    if let Err(e) = session.copy(&set, inbox).await {
        return ConsolidationOutcome::CopyFailed {
            folder,
            error: e.to_string(),
        };
    }

    let cleanup = match session.mark_deleted(&set).await {
        Ok(()) => session.expunge().await,
        Err(e) => Err(e),
    };
    match cleanup {
        Ok(()) => {
            info!(folder = %folder, count, "junk consolidation complete");
            ConsolidationOutcome::Moved { folder, count }
        }
        Err(e) => ConsolidationOutcome::CleanupFailed {
            folder,
            count,
            error: e.to_string(),
        },
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
    use crate::config::SyncConfig;
    use crate::testing::{FakeServer, FakeSession, raw_message};
    use mailsweep_oauth::AccessToken;

    use crate::session::Connector;

    async fn open(server: &FakeServer) -> FakeSession {
        server
            .connector()
            .connect("u", &AccessToken::new("t"))
            .await
            .unwrap()
    }

    fn aliases() -> Vec<String> {
        SyncConfig::default().junk_aliases
    }

    fn seed(server: &FakeServer, folder: &str, count: usize) {
        for i in 0..count {
            server.add_message(folder, &raw_message(&format!("{folder} {i}"), "x@y.z", None, "b"));
        }
    }

    #[tokio::test]
    async fn test_moves_three_from_junk() {
        let server = FakeServer::new();
        seed(&server, "INBOX", 2);
        seed(&server, "Junk", 3);
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", false)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ConsolidationOutcome::Moved {
                folder: "Junk".to_string(),
                count: 3
            }
        );
        assert_eq!(server.message_count("Junk"), 0);
        assert_eq!(server.message_count("INBOX"), 5);
        assert_eq!(server.copies(), vec![("1,2,3".to_string(), "INBOX".to_string())]);

        session.select("INBOX").await.unwrap();
        assert_eq!(session.search("ALL").await.unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_first_selectable_alias_wins() {
        let server = FakeServer::new();
        server.add_folder("Junk Email");
        seed(&server, "Spam", 2);
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", false)
            .await
            .unwrap();

        // "Junk Email" selects first and is empty; "Spam" is never touched
        assert_eq!(
            outcome,
            ConsolidationOutcome::Empty {
                folder: "Junk Email".to_string()
            }
        );
        assert_eq!(server.message_count("Spam"), 2);
    }

    #[tokio::test]
    async fn test_unselectable_alias_moves_on() {
        let server = FakeServer::new();
        seed(&server, "Junk Email", 1);
        server.fail_select("Junk Email");
        seed(&server, "垃圾邮件", 1);
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", true)
            .await
            .unwrap();

        assert_eq!(outcome.moved(), 1);
        assert_eq!(server.message_count("INBOX"), 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = FakeServer::new();
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", true)
            .await
            .unwrap();
        assert_eq!(outcome, ConsolidationOutcome::NotFound);
        assert!(outcome.recovered_error().is_none());
    }

    #[tokio::test]
    async fn test_copy_failure_is_recovered() {
        let server = FakeServer::new();
        seed(&server, "Junk", 2);
        server.fail_copy();
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", false)
            .await
            .unwrap();

        assert!(matches!(outcome, ConsolidationOutcome::CopyFailed { .. }));
        assert_eq!(outcome.moved(), 0);
        // Originals stay in junk
        assert_eq!(server.message_count("Junk"), 2);
        assert_eq!(server.message_count("INBOX"), 0);
    }

    #[tokio::test]
    async fn test_expunge_failure_is_recovered() {
        let server = FakeServer::new();
        seed(&server, "Junk", 2);
        server.fail_expunge();
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", false)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ConsolidationOutcome::CleanupFailed { count: 2, .. }
        ));
        assert_eq!(server.message_count("INBOX"), 2);
    }

    #[tokio::test]
    async fn test_strict_escalates() {
        let server = FakeServer::new();
        seed(&server, "Junk", 2);
        server.fail_copy();
        let mut session = open(&server).await;

        let err = consolidate_junk(&mut session, &aliases(), "INBOX", true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("junk consolidation"));
    }

    #[tokio::test]
    async fn test_search_failure_stops_scan() {
        let server = FakeServer::new();
        server.add_folder("Junk Email");
        seed(&server, "Junk", 1);
        server.fail_search();
        let mut session = open(&server).await;

        let outcome = consolidate_junk(&mut session, &aliases(), "INBOX", false)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            ConsolidationOutcome::SearchFailed { ref folder, .. } if folder == "Junk Email"
        ));
        assert_eq!(server.message_count("Junk"), 1);
    }
}
