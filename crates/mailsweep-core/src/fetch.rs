//! Message retrieval from a selected mailbox.

use chrono::{DateTime, Utc};
use mailsweep_mime::parse_message;
use tracing::{debug, error, info, warn};

use crate::config::FolderAliases;
use crate::dedup::{Deduplicator, IdentityKey};
use crate::error::Result;
use crate::message::MailMessage;
use crate::progress::ProgressReporter;
use crate::session::MailSession;

/// Formats a date the way IMAP `SEARCH` expects it (`01-Jan-2024`).
#[must_use]
pub fn imap_search_date(at: &DateTime<Utc>) -> String {
    at.format("%d-%b-%Y").to_string()
}

/// Builds the inbox search: `(SINCE "dd-Mon-yyyy")` or `ALL`.
#[must_use]
pub fn search_query(since: Option<&DateTime<Utc>>) -> String {
    since.map_or_else(
        || "ALL".to_string(),
        |at| format!("(SINCE \"{}\")", imap_search_date(at)),
    )
}

/// Keeps the `limit` highest ids and returns them newest first.
#[must_use]
pub fn newest_first(mut ids: Vec<u32>, limit: usize) -> Vec<u32> {
    ids.sort_unstable();
    let skip = ids.len().saturating_sub(limit);
    ids.drain(..skip);
    ids.reverse();
    ids
}

#[allow(clippy::cast_possible_truncation)]
fn per_message_progress(index: usize, total: usize) -> u8 {
    // 40..90 across the batch
    (40 + index * 50 / total.max(1)).min(90) as u8
}

/// Fetches new inbox mail.
///
/// Searches `inbox` (since `since`, if given), keeps the newest `limit`
/// messages and processes them newest first. Messages whose identity key
/// was already seen are dropped; messages that fail to fetch or parse are
/// logged and skipped. Progress runs from 40 to 90 on the session scale.
///
/// # Errors
///
/// Returns an error if the inbox cannot be selected or searched.
pub async fn fetch_inbox<S>(
    session: &mut S,
    inbox: &str,
    since: Option<&DateTime<Utc>>,
    limit: usize,
    progress: &mut dyn ProgressReporter,
) -> Result<Vec<MailMessage>>
where
    S: MailSession + ?Sized,
{
    progress.report(40, "Fetching inbox");
    session.select(inbox).await?;

    let query = search_query(since);
    info!(folder = inbox, %query, "searching inbox");
    let ids = newest_first(session.search(&query).await?, limit);

    let total = ids.len();
    info!(folder = inbox, total, "messages to process");

    let mut dedup = Deduplicator::new();
    let mut messages = Vec::with_capacity(total);

    for (index, id) in ids.into_iter().enumerate() {
        progress.report(per_message_progress(index, total), inbox);

        let raw = match session.fetch_rfc822(id).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(id, error = %e, "failed to fetch message");
                continue;
            }
        };
        let parsed = match parse_message(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(id, error = %e, "failed to parse message");
                continue;
            }
        };

        let envelope = &parsed.envelope;
        let key = IdentityKey::new(&envelope.subject, &envelope.sender, envelope.received.as_ref());
        if !dedup.insert(&key) {
            debug!(id, %key, "duplicate message skipped");
            continue;
        }

        messages.push(MailMessage::from_parsed(&parsed, inbox, key));
    }

    progress.report(90, "Fetch complete");
    Ok(messages)
}

/// Lists folder names for browsing.
///
/// `.` and `..` are dropped and the provider's default folders are added if
/// the server did not list them. The result is sorted. If listing fails the
/// first default folder is returned on its own.
pub async fn list_folders<S>(session: &mut S, folders: &FolderAliases) -> Vec<String>
where
    S: MailSession + ?Sized,
{
    let mut names = match session.list_folders().await {
        Ok(names) => names,
        Err(e) => {
            error!(error = %e, "failed to list folders");
            return folders.defaults.iter().take(1).cloned().collect();
        }
    };

    names.retain(|name| !name.is_empty() && name != "." && name != "..");
    for default in &folders.defaults {
        if !names.contains(default) {
            names.push(default.clone());
        }
    }
    names.sort();
    names
}

/// Selects `folder`, falling back to the other aliases of its well-known kind.
///
/// Returns the name that selected.
async fn select_folder<S>(session: &mut S, folder: &str, folders: &FolderAliases) -> Option<String>
where
    S: MailSession + ?Sized,
{
    let fallbacks = folders
        .kind_of(folder)
        .map(|kind| folders.aliases(kind))
        .unwrap_or_default();

    let candidates = std::iter::once(folder).chain(
        fallbacks
            .iter()
            .map(String::as_str)
            .filter(|alias| *alias != folder),
    );
    for candidate in candidates {
        match session.select(candidate).await {
            Ok(_) => return Some(candidate.to_string()),
            Err(e) => debug!(folder = candidate, error = %e, "cannot select folder"),
        }
    }
    None
}

/// Reads the newest `limit` messages of any folder, newest first.
///
/// A well-known name such as `sentitems` falls back to its other aliases
/// when the server does not know it. No deduplication is done. Per-message
/// failures are skipped; a folder that cannot be selected or searched
/// yields an empty list.
pub async fn fetch_folder<S>(
    session: &mut S,
    folder: &str,
    folders: &FolderAliases,
    limit: usize,
) -> Vec<MailMessage>
where
    S: MailSession + ?Sized,
{
    let Some(selected) = select_folder(session, folder, folders).await else {
        warn!(folder, "cannot select folder");
        return Vec::new();
    };
    let folder = selected.as_str();
    let ids = match session.search("ALL").await {
        Ok(ids) => newest_first(ids, limit),
        Err(e) => {
            warn!(folder, error = %e, "cannot search folder");
            return Vec::new();
        }
    };

    let mut messages = Vec::with_capacity(ids.len());
    for id in ids {
        let parsed = match session.fetch_rfc822(id).await {
            Ok(raw) => parse_message(&raw).map(|parsed| {
                let envelope = &parsed.envelope;
                let key =
                    IdentityKey::new(&envelope.subject, &envelope.sender, envelope.received.as_ref());
                MailMessage::from_parsed(&parsed, folder, key)
            }),
            Err(e) => {
                error!(folder, id, error = %e, "failed to fetch message");
                continue;
            }
        };
        match parsed {
            Ok(message) => messages.push(message),
            Err(e) => error!(folder, id, error = %e, "failed to parse message"),
        }
    }
    messages
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
    use crate::session::Connector;
    use crate::testing::{FakeServer, FakeSession, raw_message};
    use chrono::TimeZone;
    use mailsweep_oauth::AccessToken;
    use proptest::prelude::*;

    async fn open(server: &FakeServer) -> FakeSession {
        server
            .connector()
            .connect("u", &AccessToken::new("t"))
            .await
            .unwrap()
    }

    const DATE: &str = "Mon, 01 Jan 2024 10:00:00 +0000";

    #[test]
    fn test_imap_search_date() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(imap_search_date(&at), "01-Jan-2024");
        let at = Utc.with_ymd_and_hms(2023, 11, 25, 23, 59, 59).unwrap();
        assert_eq!(imap_search_date(&at), "25-Nov-2023");
    }

    #[test]
    fn test_search_query() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(search_query(Some(&at)), "(SINCE \"01-Jan-2024\")");
        assert_eq!(search_query(None), "ALL");
    }

    #[test]
    fn test_newest_first() {
        assert_eq!(newest_first(vec![3, 1, 2], 10), vec![3, 2, 1]);
        assert_eq!(newest_first((1..=150).collect(), 100)[0], 150);
        assert_eq!(newest_first((1..=150).collect(), 100).len(), 100);
        assert_eq!(*newest_first((1..=150).collect(), 100).last().unwrap(), 51);
        assert!(newest_first(Vec::new(), 100).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_inbox_dedups_and_orders() {
        let server = FakeServer::new();
        server.add_message("INBOX", &raw_message("Hello", "a@b.c", Some(DATE), "first"));
        server.add_message("INBOX", &raw_message("Other", "a@b.c", Some(DATE), "other"));
        server.add_message("INBOX", &raw_message("Hello", "a@b.c", Some(DATE), "second copy"));
        let mut session = open(&server).await;

        let messages = fetch_inbox(&mut session, "INBOX", None, 100, &mut NoProgress)
            .await
            .unwrap();

        // Newest first, so the later duplicate is the one kept
        let bodies: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(bodies, vec!["second copy", "other"]);
        assert_eq!(messages[0].folder, "INBOX");
        assert_eq!(
            messages[0].key.as_str(),
            "Hello|a@b.c|2024-01-01T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_fetch_inbox_since_query() {
        let server = FakeServer::new();
        let mut session = open(&server).await;
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        fetch_inbox(&mut session, "INBOX", Some(&since), 100, &mut NoProgress)
            .await
            .unwrap();

        let searches = server.searches();
        assert_eq!(searches.len(), 1);
        assert!(searches[0].1.contains("SINCE \"01-Jan-2024\""));
    }

    #[tokio::test]
    async fn test_fetch_inbox_skips_bad_messages() {
        let server = FakeServer::new();
        server.add_message("INBOX", &raw_message("one", "a@b.c", None, "1"));
        server.add_message("INBOX", &raw_message("two", "a@b.c", Some("garbage"), "2"));
        server.add_message("INBOX", &raw_message("three", "a@b.c", None, "3"));
        server.fail_fetch(3);
        let mut session = open(&server).await;

        let messages = fetch_inbox(&mut session, "INBOX", None, 100, &mut NoProgress)
            .await
            .unwrap();

        let subjects: Vec<_> = messages.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["two", "one"]);
        assert!(messages.iter().all(|m| m.received.is_none()));
        assert!(messages[0].key.as_str().ends_with("|unknown"));
    }

    #[tokio::test]
    async fn test_fetch_inbox_limit() {
        let server = FakeServer::new();
        for i in 1..=5 {
            server.add_message("INBOX", &raw_message(&format!("m{i}"), "a@b.c", None, "x"));
        }
        let mut session = open(&server).await;

        let messages = fetch_inbox(&mut session, "INBOX", None, 2, &mut NoProgress)
            .await
            .unwrap();
        let subjects: Vec<_> = messages.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["m5", "m4"]);
    }

    #[tokio::test]
    async fn test_fetch_inbox_progress() {
        let server = FakeServer::new();
        for i in 0..4 {
            server.add_message("INBOX", &raw_message(&format!("m{i}"), "a@b.c", None, "x"));
        }
        let mut session = open(&server).await;
        let mut seen = Vec::new();
        let mut progress = |p: u8, _: &str| seen.push(p);

        fetch_inbox(&mut session, "INBOX", None, 100, &mut progress)
            .await
            .unwrap();

        assert_eq!(seen, vec![40, 40, 52, 65, 77, 90]);
    }

    #[tokio::test]
    async fn test_fetch_inbox_select_failure() {
        let server = FakeServer::new();
        server.fail_select("INBOX");
        let mut session = open(&server).await;

        assert!(
            fetch_inbox(&mut session, "INBOX", None, 100, &mut NoProgress)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_list_folders_adds_defaults() {
        let server = FakeServer::new();
        server.add_folder("Projects");
        server.add_folder("junkemail");
        let mut session = open(&server).await;

        let names = list_folders(&mut session, &FolderAliases::default()).await;
        assert_eq!(
            names,
            vec!["INBOX", "Projects", "deleteditems", "drafts", "inbox", "junkemail", "sentitems"]
        );
    }

    #[tokio::test]
    async fn test_fetch_folder_without_dedup() {
        let server = FakeServer::new();
        server.add_message("Archive", &raw_message("same", "a@b.c", Some(DATE), "1"));
        server.add_message("Archive", &raw_message("same", "a@b.c", Some(DATE), "2"));
        let mut session = open(&server).await;

        let folders = FolderAliases::default();
        let messages = fetch_folder(&mut session, "Archive", &folders, 10).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "2");
        assert_eq!(messages[0].folder, "Archive");

        assert!(fetch_folder(&mut session, "Missing", &folders, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_folder_falls_back_to_alias() {
        let server = FakeServer::new();
        server.add_message("Sent Items", &raw_message("sent", "me@b.c", Some(DATE), "1"));
        let mut session = open(&server).await;

        let messages = fetch_folder(&mut session, "sentitems", &FolderAliases::default(), 10).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "sent");
        assert_eq!(messages[0].folder, "Sent Items");
    }

    #[tokio::test]
    async fn test_fetch_folder_prefers_exact_name() {
        let server = FakeServer::new();
        server.add_message("Sent", &raw_message("exact", "me@b.c", Some(DATE), "1"));
        server.add_message("Sent Items", &raw_message("alias", "me@b.c", Some(DATE), "1"));
        let mut session = open(&server).await;

        let messages = fetch_folder(&mut session, "Sent", &FolderAliases::default(), 10).await;

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "exact");
    }

    proptest! {
        #[test]
        fn prop_newest_first_bounds(ids in proptest::collection::hash_set(1u32..10_000, 0..300), limit in 1usize..150) {
            let ids: Vec<u32> = ids.into_iter().collect();
            let picked = newest_first(ids.clone(), limit);
            prop_assert_eq!(picked.len(), ids.len().min(limit));
            prop_assert!(picked.windows(2).all(|w| w[0] > w[1]));
            if let Some(max) = ids.iter().max() {
                prop_assert_eq!(picked[0], *max);
            }
        }

        #[test]
        fn prop_search_date_shape(days in 0i64..40_000) {
            let at = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::days(days);
            let formatted = imap_search_date(&at);
            prop_assert_eq!(formatted.len(), 11);
            prop_assert_eq!(&formatted[2..3], "-");
            prop_assert_eq!(&formatted[6..7], "-");
        }
    }
}
