//! Wire-level tests for the async-imap session.
//!
//! A scripted IMAP server on loopback TCP answers each tagged command with a
//! canned reply, so the greeting, AUTHENTICATE continuation and mailbox verbs
//! all go through the real protocol client.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::time::Duration;

use mailsweep_core::session::{ImapSession, open_session};
use mailsweep_core::{Error, MailSession};
use mailsweep_oauth::AccessToken;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const LIMIT: Duration = Duration::from_secs(5);

/// Starts a server that sends `greeting`, then serves commands until LOGOUT.
///
/// Returns the address and a handle yielding every line the client sent.
async fn scripted_server(greeting: &'static str) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();
        let mut received = Vec::new();

        write.write_all(greeting.as_bytes()).await.unwrap();

        while let Ok(Some(line)) = lines.next_line().await {
            received.push(line.clone());
            let (tag, command) = line.split_once(' ').unwrap_or((line.as_str(), ""));
            let verb = command
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_ascii_uppercase();

            let reply = match verb.as_str() {
                "AUTHENTICATE" => {
                    write.write_all(b"+ \r\n").await.unwrap();
                    let payload = lines.next_line().await.unwrap().unwrap();
                    received.push(payload);
                    format!("{tag} OK AUTHENTICATE completed\r\n")
                }
                "SELECT" => format!("* 3 EXISTS\r\n* 0 RECENT\r\n{tag} OK [READ-WRITE] SELECT completed\r\n"),
                "SEARCH" => format!("* SEARCH 3 1 2\r\n{tag} OK SEARCH completed\r\n"),
                "COPY" => format!("{tag} OK COPY completed\r\n"),
                "LOGOUT" => format!("* BYE logging out\r\n{tag} OK LOGOUT completed\r\n"),
                _ => format!("{tag} BAD unknown command\r\n"),
            };
            write.write_all(reply.as_bytes()).await.unwrap();
            if verb == "LOGOUT" {
                break;
            }
        }
        received
    });

    (addr, handle)
}

async fn open(addr: &str) -> mailsweep_core::Result<ImapSession<TcpStream>> {
    let stream = TcpStream::connect(addr).await.unwrap();
    timeout(
        LIMIT,
        open_session(stream, "user@example.com", &AccessToken::new("token")),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_greeting_then_xoauth2_then_verbs() {
    let (addr, server) = scripted_server("* OK IMAP4rev1 ready\r\n").await;

    let mut session = open(&addr).await.unwrap();

    let exists = timeout(LIMIT, session.select("INBOX")).await.unwrap().unwrap();
    assert_eq!(exists, 3);

    let ids = timeout(LIMIT, session.search("ALL")).await.unwrap().unwrap();
    assert_eq!(ids, vec![1, 2, 3]);

    timeout(LIMIT, session.copy("1,2,3", "INBOX"))
        .await
        .unwrap()
        .unwrap();
    timeout(LIMIT, session.logout()).await.unwrap().unwrap();

    let received = timeout(LIMIT, server).await.unwrap().unwrap();
    assert!(received[0].ends_with("AUTHENTICATE XOAUTH2"));
    // base64 of the XOAUTH2 payload
    assert!(!received[1].is_empty());
    assert!(!received[1].contains(' '));
    assert!(received.iter().any(|l| l.ends_with("SELECT \"INBOX\"") || l.ends_with("SELECT INBOX")));
    assert!(received.iter().any(|l| l.contains("COPY 1,2,3")));
}

#[tokio::test]
async fn test_bye_greeting_is_connection_error() {
    let (addr, _server) = scripted_server("* BYE too many connections\r\n").await;

    let err = open(&addr).await.err().unwrap();

    assert!(matches!(err, Error::Connection(_)));
    assert!(err.to_string().contains("too many connections"));
}

#[tokio::test]
async fn test_closed_before_greeting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let err = open(&addr).await.err().unwrap();

    assert!(matches!(err, Error::Connection(_) | Error::Io(_)));
}
