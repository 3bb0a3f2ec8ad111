//! In-memory IMAP server for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mailsweep_oauth::AccessToken;

use crate::error::{Error, Result};
use crate::session::{Connector, MailSession};

#[derive(Debug, Clone)]
struct StoredMessage {
    raw: Vec<u8>,
    deleted: bool,
}

#[derive(Debug, Default)]
struct ServerState {
    folders: BTreeMap<String, Vec<StoredMessage>>,
    fail_connects: u32,
    fail_select: HashSet<String>,
    fail_search: bool,
    fail_copy: bool,
    fail_expunge: bool,
    fail_logout: bool,
    fail_fetch: HashSet<u32>,
    connect_attempts: u32,
    logouts: u32,
    searches: Vec<(String, String)>,
    copies: Vec<(String, String)>,
}

/// Shared handle to the fake server state.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        let server = Self::default();
        server.add_folder("INBOX");
        server
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            server: self.clone(),
        }
    }

    pub fn add_folder(&self, name: &str) {
        self.state().folders.entry(name.to_string()).or_default();
    }

    pub fn add_message(&self, folder: &str, raw: &[u8]) {
        self.state()
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(StoredMessage {
                raw: raw.to_vec(),
                deleted: false,
            });
    }

    pub fn message_count(&self, folder: &str) -> usize {
        self.state().folders.get(folder).map_or(0, Vec::len)
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state().fail_connects = count;
    }

    pub fn fail_select(&self, folder: &str) {
        self.state().fail_select.insert(folder.to_string());
    }

    pub fn fail_search(&self) {
        self.state().fail_search = true;
    }

    pub fn fail_copy(&self) {
        self.state().fail_copy = true;
    }

    pub fn fail_expunge(&self) {
        self.state().fail_expunge = true;
    }

    pub fn fail_logout(&self) {
        self.state().fail_logout = true;
    }

    pub fn fail_fetch(&self, id: u32) {
        self.state().fail_fetch.insert(id);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state().connect_attempts
    }

    pub fn logouts(&self) -> u32 {
        self.state().logouts
    }

    /// `(folder, query)` pairs in the order they were searched.
    pub fn searches(&self) -> Vec<(String, String)> {
        self.state().searches.clone()
    }

    /// `(sequence set, destination)` pairs in the order they were copied.
    pub fn copies(&self) -> Vec<(String, String)> {
        self.state().copies.clone()
    }
}

pub struct FakeConnector {
    server: FakeServer,
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self, _user: &str, _token: &AccessToken) -> Result<FakeSession> {
        let mut state = self.server.state();
        state.connect_attempts += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(Error::Connection("connection refused".to_string()));
        }
        Ok(FakeSession {
            server: self.server.clone(),
            selected: None,
        })
    }
}

pub struct FakeSession {
    server: FakeServer,
    selected: Option<String>,
}

impl FakeSession {
    fn selected(&self) -> Result<String> {
        self.selected
            .clone()
            .ok_or_else(|| Error::Operation("no mailbox selected".to_string()))
    }
}

fn parse_set(ids: &str) -> Vec<usize> {
    ids.split(',')
        .filter_map(|id| id.trim().parse::<usize>().ok())
        .collect()
}

#[async_trait]
impl MailSession for FakeSession {
    async fn list_folders(&mut self) -> Result<Vec<String>> {
        Ok(self.server.state().folders.keys().cloned().collect())
    }

    async fn select(&mut self, mailbox: &str) -> Result<u32> {
        let state = self.server.state();
        if state.fail_select.contains(mailbox) {
            return Err(Error::Operation(format!("SELECT {mailbox}: NO")));
        }
        let count = state
            .folders
            .get(mailbox)
            .map(|messages| u32::try_from(messages.len()).unwrap())
            .ok_or_else(|| Error::Operation(format!("SELECT {mailbox}: no such mailbox")))?;
        drop(state);
        self.selected = Some(mailbox.to_string());
        Ok(count)
    }

    async fn search(&mut self, query: &str) -> Result<Vec<u32>> {
        let folder = self.selected()?;
        let mut state = self.server.state();
        state.searches.push((folder.clone(), query.to_string()));
        if state.fail_search {
            return Err(Error::Operation("SEARCH: BAD".to_string()));
        }
        let count = state.folders.get(&folder).map_or(0, Vec::len);
        Ok((1..=u32::try_from(count).unwrap()).collect())
    }

    async fn fetch_rfc822(&mut self, id: u32) -> Result<Vec<u8>> {
        let folder = self.selected()?;
        let state = self.server.state();
        if state.fail_fetch.contains(&id) {
            return Err(Error::Operation(format!("FETCH {id}: NO")));
        }
        state
            .folders
            .get(&folder)
            .and_then(|messages| messages.get(id as usize - 1))
            .map(|m| m.raw.clone())
            .ok_or_else(|| Error::Operation(format!("FETCH {id}: no such message")))
    }

    async fn copy(&mut self, ids: &str, mailbox: &str) -> Result<()> {
        let folder = self.selected()?;
        let mut state = self.server.state();
        state.copies.push((ids.to_string(), mailbox.to_string()));
        if state.fail_copy {
            return Err(Error::Operation("COPY: NO".to_string()));
        }
        let source = state.folders.get(&folder).cloned().unwrap_or_default();
        let copied: Vec<_> = parse_set(ids)
            .into_iter()
            .filter_map(|id| source.get(id - 1).cloned())
            .collect();
        state
            .folders
            .entry(mailbox.to_string())
            .or_default()
            .extend(copied);
        Ok(())
    }

    async fn mark_deleted(&mut self, ids: &str) -> Result<()> {
        let folder = self.selected()?;
        let mut state = self.server.state();
        if let Some(messages) = state.folders.get_mut(&folder) {
            for id in parse_set(ids) {
                if let Some(message) = messages.get_mut(id - 1) {
                    message.deleted = true;
                }
            }
        }
        Ok(())
    }

    async fn expunge(&mut self) -> Result<()> {
        let folder = self.selected()?;
        let mut state = self.server.state();
        if state.fail_expunge {
            return Err(Error::Operation("EXPUNGE: NO".to_string()));
        }
        if let Some(messages) = state.folders.get_mut(&folder) {
            messages.retain(|m| !m.deleted);
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        let mut state = self.server.state();
        state.logouts += 1;
        if state.fail_logout {
            return Err(Error::Operation("LOGOUT: connection reset".to_string()));
        }
        Ok(())
    }
}

/// Builds a minimal RFC 822 message.
pub fn raw_message(subject: &str, from: &str, date: Option<&str>, body: &str) -> Vec<u8> {
    let mut raw = format!("Subject: {subject}\r\nFrom: {from}\r\n");
    if let Some(date) = date {
        raw.push_str(&format!("Date: {date}\r\n"));
    }
    raw.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    raw.push_str(body);
    raw.into_bytes()
}
