//! End-to-end sync passes against an in-memory mailbox.
//!
//! The IMAP side is a scripted mailbox behind the public `Connector` /
//! `MailSession` traits; the token endpoint is either a stub or a loopback
//! HTTP responder driving the real refresher.

#![allow(clippy::unwrap_used, clippy::similar_names, clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mailsweep_core::{
    AccountId, Connector, Error, MailAccount, MailSession, MemoryStore, Result, SyncConfig,
    SyncEngine, TokenSource,
};
use mailsweep_oauth::{AccessToken, Provider, TokenRefresher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Default)]
struct Mailbox {
    folders: HashMap<String, Vec<Vec<u8>>>,
    refuse_connects: u32,
    connects: u32,
    searches: Vec<String>,
}

#[derive(Clone, Default)]
struct Server(Arc<Mutex<Mailbox>>);

impl Server {
    fn with_folders(folders: &[&str]) -> Self {
        let server = Self::default();
        for folder in folders {
            server.0.lock().unwrap().folders.insert((*folder).to_string(), Vec::new());
        }
        server
    }

    fn deliver(&self, folder: &str, raw: &str) {
        self.0
            .lock()
            .unwrap()
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(raw.as_bytes().to_vec());
    }

    fn count(&self, folder: &str) -> usize {
        self.0.lock().unwrap().folders.get(folder).map_or(0, Vec::len)
    }

    fn connects(&self) -> u32 {
        self.0.lock().unwrap().connects
    }
}

struct Session {
    server: Server,
    selected: String,
    deleted: Vec<usize>,
}

#[async_trait]
impl Connector for Server {
    type Session = Session;

    async fn connect(&self, _user: &str, _token: &AccessToken) -> Result<Session> {
        let mut mailbox = self.0.lock().unwrap();
        mailbox.connects += 1;
        if mailbox.refuse_connects > 0 {
            mailbox.refuse_connects -= 1;
            return Err(Error::Connection("refused".to_string()));
        }
        Ok(Session {
            server: self.clone(),
            selected: String::new(),
            deleted: Vec::new(),
        })
    }
}

fn ids(set: &str) -> Vec<usize> {
    set.split(',').map(|id| id.parse().unwrap()).collect()
}

#[async_trait]
impl MailSession for Session {
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        Ok(self.server.0.lock().unwrap().folders.keys().cloned().collect())
    }

    async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let count = self
            .server
            .0
            .lock()
            .unwrap()
            .folders
            .get(mailbox)
            .map(Vec::len)
            .ok_or_else(|| Error::Operation(format!("no mailbox {mailbox}")))?;
        self.selected = mailbox.to_string();
        self.deleted.clear();
        Ok(count as u32)
    }

    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let mut mailbox = self.server.0.lock().unwrap();
        mailbox.searches.push(format!("{} {query}", self.selected));
        let count = mailbox.folders[&self.selected].len() as u32;
        Ok((1..=count).collect())
    }

    async fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>> {
        Ok(self.server.0.lock().unwrap().folders[&self.selected][id as usize - 1].clone())
    }

    async fn copy(&mut self, set: &str, mailbox: &str) -> Result<()> {
        let mut state = self.server.0.lock().unwrap();
        let copied: Vec<_> = ids(set)
            .into_iter()
            .map(|id| state.folders[&self.selected][id - 1].clone())
            .collect();
        state.folders.entry(mailbox.to_string()).or_default().extend(copied);
        Ok(())
    }

    async fn mark_deleted(&mut self, set: &str) -> Result<()> {
        self.deleted.extend(ids(set));
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        let mut state = self.server.0.lock().unwrap();
        let folder = state.folders.get_mut(&self.selected).unwrap();
        let mut index = 0;
        folder.retain(|_| {
            index += 1;
            !self.deleted.contains(&index)
        });
        self.deleted.clear();
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FixedToken;

#[async_trait]
impl TokenSource for FixedToken {
    async fn access_token(&self, _account: &MailAccount) -> Result<AccessToken> {
        Ok(AccessToken::new("token"))
    }
}

fn account() -> MailAccount {
    MailAccount::new(AccountId(7), "user@outlook.com", "refresh", "client")
}

fn config() -> SyncConfig {
    SyncConfig {
        retry_delay: Duration::ZERO,
        ..SyncConfig::default()
    }
}

fn plain(subject: &str, date: &str, body: &str) -> String {
    format!(
        "From: Alice <alice@example.com>\r\nSubject: {subject}\r\nDate: {date}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\r\n{body}"
    )
}

const ALTERNATIVE: &str = "From: news@example.com\r\n\
Subject: Newsletter\r\n\
Date: Tue, 02 Jan 2024 09:00:00 +0100\r\n\
Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
\r\n\
--alt\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
plain version\r\n\
--alt\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>html version</p>\r\n\
--alt--\r\n";

const WITH_ATTACHMENT: &str = "From: boss@example.com\r\n\
Subject: Report\r\n\
Date: Wed, 03 Jan 2024 09:00:00 +0000\r\n\
Content-Type: multipart/mixed; boundary=\"mix\"\r\n\
\r\n\
--mix\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
see attached\r\n\
--mix\r\n\
Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--mix--\r\n";

#[tokio::test]
async fn full_pass_consolidates_dedups_and_stores() {
    let server = Server::with_folders(&["INBOX", "Junk"]);
    server.deliver("INBOX", ALTERNATIVE);
    server.deliver("INBOX", &plain("Hi", "Mon, 01 Jan 2024 10:00:00 +0000", "one"));
    server.deliver("INBOX", &plain("Hi", "Mon, 01 Jan 2024 10:00:00 +0000", "one again"));
    server.deliver("Junk", WITH_ATTACHMENT);
    server.deliver("Junk", &plain("Promo", "Thu, 04 Jan 2024 10:00:00 +0000", "buy"));
    server.deliver("Junk", &plain("Promo 2", "Fri, 05 Jan 2024 10:00:00 +0000", "buy more"));

    let engine = SyncEngine::new(config(), FixedToken, server.clone(), MemoryStore::new());
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

    let mut progress = Vec::new();
    let result = engine
        .check_account(&account().with_last_check_time(since), |p: u8, _: &str| {
            progress.push(p);
        })
        .await;

    assert!(result.success, "{}", result.message);
    // 6 messages reached the inbox, one is a duplicate
    assert_eq!(server.count("INBOX"), 6);
    assert_eq!(server.count("Junk"), 0);
    assert_eq!(result.total, 5);
    assert_eq!(result.saved, 5);

    let searches = server.0.lock().unwrap().searches.clone();
    assert_eq!(searches, vec!["Junk ALL", "INBOX (SINCE \"01-Jan-2024\")"]);

    let records = engine.store().records(AccountId(7));
    let by_subject = |subject: &str| records.iter().find(|m| m.subject == subject).unwrap();

    let newsletter = &by_subject("Newsletter").content;
    assert!(newsletter.contains("<p>html version</p>"));
    assert!(!newsletter.contains("plain version"));
    let report = by_subject("Report");
    assert!(report.content.starts_with("see attached"));
    assert!(report.content.ends_with("[Attachments]: report.pdf"));
    assert_eq!(report.attachments, vec!["report.pdf"]);
    // Newest first, so the later copy of "Hi" wins
    assert_eq!(by_subject("Hi").content, "one again");
    assert_eq!(
        by_subject("Newsletter").received.unwrap().to_rfc3339(),
        "2024-01-02T09:00:00+01:00"
    );

    assert!(progress[0] <= 10);
    assert_eq!(*progress.last().unwrap(), 100);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");
    assert!(engine.store().check_time(AccountId(7)).is_some());
}

#[tokio::test]
async fn three_refused_connections_fail_the_pass() {
    let server = Server::with_folders(&["INBOX"]);
    server.0.lock().unwrap().refuse_connects = 3;

    let engine = SyncEngine::new(config(), FixedToken, server.clone(), MemoryStore::new());
    let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

    assert!(!result.success);
    assert!(result.message.contains("3 attempts"), "{}", result.message);
    assert_eq!(server.connects(), 3);
    assert!(engine.store().records(AccountId(7)).is_empty());
}

#[tokio::test]
async fn two_refused_connections_still_succeed() {
    let server = Server::with_folders(&["INBOX"]);
    server.deliver("INBOX", &plain("Hi", "Mon, 01 Jan 2024 10:00:00 +0000", "x"));
    server.0.lock().unwrap().refuse_connects = 2;

    let engine = SyncEngine::new(config(), FixedToken, server.clone(), MemoryStore::new());
    let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

    assert!(result.success);
    assert_eq!(result.saved, 1);
    assert_eq!(server.connects(), 3);
}

/// Serves one canned token-endpoint response on a loopback port.
async fn token_endpoint(status: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/token", listener.local_addr().unwrap());

    tokio::spawn(async move {
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
    });

    url
}

fn refresher(url: &str) -> TokenRefresher {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    TokenRefresher::new(Provider::new("Test", url).unwrap()).with_http_client(client)
}

#[tokio::test]
async fn invalid_grant_opens_no_session() {
    let url = token_endpoint(
        "400 Bad Request",
        r#"{"error":"invalid_grant","error_description":"AADSTS70000: refresh token expired"}"#,
    )
    .await;
    let server = Server::with_folders(&["INBOX"]);
    let engine = SyncEngine::new(config(), refresher(&url), server.clone(), MemoryStore::new());

    let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

    assert!(!result.success);
    assert!(result.message.contains("invalid_grant"), "{}", result.message);
    assert_eq!(server.connects(), 0);
    assert!(engine.store().token(AccountId(7)).is_none());
}

#[tokio::test]
async fn refreshed_token_is_persisted() {
    let url = token_endpoint(
        "200 OK",
        r#"{"token_type":"Bearer","expires_in":3600,"access_token":"fresh"}"#,
    )
    .await;
    let server = Server::with_folders(&["INBOX"]);
    let engine = SyncEngine::new(config(), refresher(&url), server.clone(), MemoryStore::new());

    let result = engine.check_account(&account(), |_: u8, _: &str| {}).await;

    assert!(result.success, "{}", result.message);
    assert_eq!(result.total, 0);
    assert_eq!(engine.store().token(AccountId(7)).unwrap().as_str(), "fresh");
    assert_eq!(server.connects(), 1);
}
