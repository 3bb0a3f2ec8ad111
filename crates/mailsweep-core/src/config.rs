//! Engine configuration.
//!
//! Everything provider-specific (server, token endpoint, folder names) lives
//! here as plain data so one engine can serve several providers. All types
//! deserialize from JSON and fall back to the Outlook defaults for missing
//! fields.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default IMAP host.
pub const DEFAULT_IMAP_HOST: &str = "outlook.live.com";

/// Default IMAP port (implicit TLS).
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Default number of inbox messages processed per pass.
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Default number of session attempts per pass.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between session attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Server and token endpoint of a mail provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Display name.
    pub name: String,
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP server port.
    pub imap_port: u16,
    /// OAuth2 token endpoint.
    pub token_url: String,
    /// Scopes sent with the refresh request; empty sends none.
    pub scopes: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "Microsoft".to_string(),
            imap_host: DEFAULT_IMAP_HOST.to_string(),
            imap_port: DEFAULT_IMAP_PORT,
            token_url: mailsweep_oauth::provider::MICROSOFT_TOKEN_URL.to_string(),
            scopes: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// Builds the OAuth provider for this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token URL is not a valid http(s) URL.
    pub fn oauth_provider(&self) -> Result<mailsweep_oauth::Provider> {
        let provider = mailsweep_oauth::Provider::new(self.name.clone(), &self.token_url)?
            .with_default_scopes(self.scopes.clone());
        provider.validate()?;
        Ok(provider)
    }
}

/// Well-known folder roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    /// Inbox.
    Inbox,
    /// Sent items.
    Sent,
    /// Drafts.
    Drafts,
    /// Deleted items.
    Trash,
    /// Junk / spam.
    Spam,
    /// Archive.
    Archive,
}

impl FolderKind {
    /// All kinds, in table order.
    pub const ALL: [Self; 6] = [
        Self::Inbox,
        Self::Sent,
        Self::Drafts,
        Self::Trash,
        Self::Spam,
        Self::Archive,
    ];
}

/// Names a provider uses for each well-known folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderAliases {
    /// Inbox names.
    pub inbox: Vec<String>,
    /// Sent-items names.
    pub sent: Vec<String>,
    /// Drafts names.
    pub drafts: Vec<String>,
    /// Deleted-items names.
    pub trash: Vec<String>,
    /// Junk names.
    pub spam: Vec<String>,
    /// Archive names.
    pub archive: Vec<String>,
    /// Folders always offered by [`crate::fetch::list_folders`], even if
    /// the server does not list them.
    pub defaults: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl Default for FolderAliases {
    fn default() -> Self {
        Self {
            inbox: strings(&["inbox", "Inbox", "INBOX"]),
            sent: strings(&["sentitems", "Sent Items", "Sent", "已发送"]),
            drafts: strings(&["drafts", "Drafts", "草稿箱"]),
            trash: strings(&["deleteditems", "Deleted Items", "Trash", "已删除"]),
            spam: strings(&["junkemail", "Junk E-mail", "Spam", "垃圾邮件"]),
            archive: strings(&["archive", "Archive", "归档"]),
            defaults: strings(&["inbox", "sentitems", "drafts", "deleteditems", "junkemail"]),
        }
    }
}

impl FolderAliases {
    /// Returns the alias list for a folder kind.
    #[must_use]
    pub fn aliases(&self, kind: FolderKind) -> &[String] {
        match kind {
            FolderKind::Inbox => &self.inbox,
            FolderKind::Sent => &self.sent,
            FolderKind::Drafts => &self.drafts,
            FolderKind::Trash => &self.trash,
            FolderKind::Spam => &self.spam,
            FolderKind::Archive => &self.archive,
        }
    }

    /// Finds which well-known folder a server name refers to.
    ///
    /// Matching is exact first, then case-insensitive.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<FolderKind> {
        FolderKind::ALL
            .into_iter()
            .find(|kind| self.aliases(*kind).iter().any(|alias| alias == name))
            .or_else(|| {
                FolderKind::ALL.into_iter().find(|kind| {
                    self.aliases(*kind)
                        .iter()
                        .any(|alias| alias.eq_ignore_ascii_case(name))
                })
            })
    }
}

/// Settings for one sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Provider server and token endpoint.
    pub provider: ProviderConfig,
    /// Folder junk mail is consolidated into and fetched from.
    pub inbox: String,
    /// Junk folder names, probed in order.
    pub junk_aliases: Vec<String>,
    /// Well-known folder names for listing.
    pub folders: FolderAliases,
    /// Newest messages processed per pass.
    pub max_messages: usize,
    /// Session attempts per pass.
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(with = "duration_millis", rename = "retry_delay_ms")]
    pub retry_delay: Duration,
    /// Turn recovered junk-consolidation errors into attempt failures.
    pub strict_consolidation: bool,
    /// Only search for mail since the account's last check time.
    pub incremental: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            inbox: "INBOX".to_string(),
            junk_aliases: strings(&["Junk Email", "Junk", "Spam", "垃圾邮件", "junkemail"]),
            folders: FolderAliases::default(),
            max_messages: DEFAULT_MAX_MESSAGES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            strict_consolidation: false,
            incremental: true,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the result is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Checks that the configuration can drive a pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.provider.imap_host.trim().is_empty() {
            return Err(Error::Config("IMAP host is required".to_string()));
        }
        if self.provider.imap_port == 0 {
            return Err(Error::Config("IMAP port must be 1-65535".to_string()));
        }
        if self.inbox.trim().is_empty() {
            return Err(Error::Config("inbox folder name is required".to_string()));
        }
        if self.max_messages == 0 {
            return Err(Error::Config("max_messages must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Serde helpers for `Duration` stored as whole milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)] // Required by serde with= signature
    pub fn serialize<S>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
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

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.provider.imap_host, "outlook.live.com");
        assert_eq!(config.provider.imap_port, 993);
        assert_eq!(config.inbox, "INBOX");
        assert_eq!(config.junk_aliases[0], "Junk Email");
        assert_eq!(config.junk_aliases.len(), 5);
        assert_eq!(config.max_messages, 100);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert!(!config.strict_consolidation);
        assert!(config.incremental);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SyncConfig::from_json_str(
            r#"{"max_messages": 20, "retry_delay_ms": 250, "provider": {"imap_host": "imap.example.com"}}"#,
        )
        .unwrap();
        assert_eq!(config.max_messages, 20);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.provider.imap_host, "imap.example.com");
        assert_eq!(config.provider.imap_port, 993);
        assert_eq!(config.inbox, "INBOX");
    }

    #[test]
    fn test_json_roundtrip_field_names() {
        let json = serde_json::to_value(SyncConfig::default()).unwrap();
        assert_eq!(json["retry_delay_ms"], 1000);
        assert_eq!(json["folders"]["spam"][0], "junkemail");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let err = SyncConfig::from_json_str(r#"{"max_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let config = SyncConfig {
            max_messages: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.provider.imap_host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SyncConfig::from_json_str("{not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_from_missing_path() {
        assert!(matches!(
            SyncConfig::from_path("/nonexistent/mailsweep.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_oauth_provider() {
        let provider = ProviderConfig::default().oauth_provider().unwrap();
        assert_eq!(
            provider.token_url.as_str(),
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );

        let bad = ProviderConfig {
            token_url: "not a url".to_string(),
            ..ProviderConfig::default()
        };
        assert!(matches!(bad.oauth_provider(), Err(Error::OAuth(_))));
    }

    #[test]
    fn test_kind_of() {
        let folders = FolderAliases::default();
        assert_eq!(folders.kind_of("junkemail"), Some(FolderKind::Spam));
        assert_eq!(folders.kind_of("Sent Items"), Some(FolderKind::Sent));
        assert_eq!(folders.kind_of("已删除"), Some(FolderKind::Trash));
        assert_eq!(folders.kind_of("ARCHIVE"), Some(FolderKind::Archive));
        assert_eq!(folders.kind_of("Projects"), None);
    }
}
