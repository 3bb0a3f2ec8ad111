//! Messages produced by a pass.

use chrono::{DateTime, FixedOffset};
use mailsweep_mime::ParsedMessage;
use serde::{Deserialize, Serialize};

use crate::dedup::IdentityKey;

/// A fetched, decoded message ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailMessage {
    /// Decoded subject.
    pub subject: String,
    /// Decoded `From` value.
    pub sender: String,
    /// `Date` header, if present and parseable.
    pub received: Option<DateTime<FixedOffset>>,
    /// Rendered body with the attachment footer.
    pub content: String,
    /// Attachment filenames, in document order.
    pub attachments: Vec<String>,
    /// Folder the message was read from.
    pub folder: String,
    /// Dedup key.
    pub key: IdentityKey,
}

impl MailMessage {
    /// Builds a message from a parsed MIME tree.
    ///
    /// The body is only walked here, so call this after the duplicate check.
    #[must_use]
    pub fn from_parsed(parsed: &ParsedMessage<'_>, folder: &str, key: IdentityKey) -> Self {
        let content = parsed.content();
        Self {
            subject: parsed.envelope.subject.clone(),
            sender: parsed.envelope.sender.clone(),
            received: parsed.envelope.received,
            content: content.render(),
            attachments: content.attachments,
            folder: folder.to_string(),
            key,
        }
    }
}
