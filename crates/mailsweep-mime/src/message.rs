//! Parsed message handle.

use mailparse::ParsedMail;

use crate::content::{RichContent, extract_rich_content};
use crate::error::Result;
use crate::header::Envelope;

/// A parsed RFC 5322 message.
///
/// Headers are decoded eagerly; the body is only walked when
/// [`ParsedMessage::content`] is called, so callers can discard duplicates
/// cheaply.
#[derive(Debug)]
pub struct ParsedMessage<'a> {
    /// Decoded subject, sender and date.
    pub envelope: Envelope,
    mail: ParsedMail<'a>,
}

impl<'a> ParsedMessage<'a> {
    /// Flattens the body into renderable content.
    #[must_use]
    pub fn content(&self) -> RichContent {
        extract_rich_content(&self.mail)
    }

    /// Returns the underlying MIME tree.
    #[must_use]
    pub const fn mail(&self) -> &ParsedMail<'a> {
        &self.mail
    }
}

/// Parses a raw message as returned by an IMAP `FETCH RFC822`.
///
/// # Errors
///
/// Returns an error if the header block or MIME structure is malformed.
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage<'_>> {
    let mail = mailparse::parse_mail(raw)?;
    let envelope = Envelope::from_headers(&mail.headers);
    Ok(ParsedMessage { envelope, mail })
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
    use crate::BodyFormat;

    #[test]
    fn test_parse_simple_message() {
        let raw = concat!(
            "From: =?utf-8?B?5byg5LiJ?= <zhang@example.com>\r\n",
            "To: me@example.com\r\n",
            "Subject: Quarterly numbers\r\n",
            "Date: Mon, 01 Jan 2024 10:00:00 +0000\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Hello, World!",
        );

        let message = parse_message(raw.as_bytes()).unwrap();
        assert_eq!(message.envelope.subject, "Quarterly numbers");
        assert_eq!(message.envelope.sender, "张三 <zhang@example.com>");
        assert_eq!(
            message.envelope.received.unwrap().to_rfc3339(),
            "2024-01-01T10:00:00+00:00"
        );

        let content = message.content();
        assert_eq!(content.format, BodyFormat::Plain);
        assert_eq!(content.render(), "Hello, World!");
    }

    #[test]
    fn test_parse_without_date() {
        let raw = b"Subject: no date\r\nFrom: a@b.c\r\n\r\nbody";
        let message = parse_message(raw).unwrap();
        assert!(message.envelope.received.is_none());
        assert!(message.mail().subparts.is_empty());
    }
}
