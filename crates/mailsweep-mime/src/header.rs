//! Header decoding: subjects, senders and dates.

use chrono::{DateTime, FixedOffset, Utc};
use mailparse::{MailHeader, MailHeaderMap};

/// Decoded identity headers of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// Subject, RFC 2047 decoded. Empty when the header is missing.
    pub subject: String,
    /// Raw `From` value, RFC 2047 decoded. Empty when the header is missing.
    pub sender: String,
    /// `Date` header with its original offset; `None` if absent or unparseable.
    pub received: Option<DateTime<FixedOffset>>,
}

impl Envelope {
    /// Reads subject, sender and date from a header block.
    #[must_use]
    pub fn from_headers(headers: &[MailHeader<'_>]) -> Self {
        // get_first_value already decodes encoded words
        let subject = headers.get_first_value("Subject").unwrap_or_default();
        let sender = headers.get_first_value("From").unwrap_or_default();
        let received = headers
            .get_first_value("Date")
            .and_then(|d| parse_date(&d));

        Self {
            subject,
            sender,
            received,
        }
    }
}

/// Decodes RFC 2047 encoded words (`=?charset?B|Q?text?=`) left in a value.
///
/// For raw values mailparse does not decode itself, such as `Content-Type`
/// and `Content-Disposition` parameters. Values without encoded words, and values that fail to decode, are
/// returned unchanged.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    if !value.contains("=?") {
        return value.to_string();
    }

    let composed = format!("X-Decode: {value}");
    match mailparse::parse_header(composed.as_bytes()) {
        Ok((header, _)) => header.get_value().trim().to_string(),
        Err(_) => value.to_string(),
    }
}

/// Parses an RFC 2822 `Date` header.
///
/// The sender's UTC offset is kept. Dates that only the lenient parser
/// understands come back in UTC. Empty or unparseable input yields `None`.
#[must_use]
pub fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date);
    }

    // Strip a trailing "(UTC)"-style comment before the lenient fallback.
    let without_comment = value
        .split_once('(')
        .map_or(value, |(head, _)| head.trim_end());
    if let Ok(date) = DateTime::parse_from_rfc2822(without_comment) {
        return Some(date);
    }

    mailparse::dateparse(value)
        .ok()
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        .map(|utc| utc.fixed_offset())
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
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_decode_plain_value() {
        assert_eq!(decode_encoded_words("Hello"), "Hello");
    }

    #[test]
    fn test_decode_base64_word() {
        assert_eq!(decode_encoded_words("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_decode_q_word() {
        assert_eq!(decode_encoded_words("=?utf-8?Q?H=C3=A9llo_world?="), "Héllo world");
    }

    #[test]
    fn test_decode_sender_with_address() {
        assert_eq!(
            decode_encoded_words("=?utf-8?B?5byg5LiJ?= <zhang@example.com>"),
            "张三 <zhang@example.com>"
        );
    }

    #[test]
    fn test_parse_date_keeps_offset() {
        let date = parse_date("Mon, 01 Jan 2024 10:30:00 +0800").unwrap();
        assert_eq!(date.offset().local_minus_utc(), 8 * 3600);
        assert_eq!(date.hour(), 10);
        assert_eq!(date.to_rfc3339(), "2024-01-01T10:30:00+08:00");
    }

    #[test]
    fn test_parse_date_with_comment() {
        let date = parse_date("Tue, 2 Jan 2024 08:00:00 +0000 (UTC)").unwrap();
        assert_eq!(date.day(), 2);
    }

    #[test]
    fn test_parse_date_missing_or_garbage() {
        assert!(parse_date("").is_none());
        assert!(parse_date("   ").is_none());
        assert!(parse_date("32 Jan 2024 10:00:00 +0000").is_none());
        assert!(parse_date("5 Smarch 2024 10:00:00 +0000").is_none());
    }

    #[test]
    fn test_envelope_from_headers() {
        let raw = b"Subject: =?utf-8?B?SMOpbGxv?=\r\nFrom: Alice <alice@example.com>\r\nDate: Mon, 01 Jan 2024 10:00:00 +0000\r\n\r\n";
        let (headers, _) = mailparse::parse_headers(raw).unwrap();
        let envelope = Envelope::from_headers(&headers);

        assert_eq!(envelope.subject, "Héllo");
        assert_eq!(envelope.sender, "Alice <alice@example.com>");
        assert_eq!(envelope.received.unwrap().year(), 2024);
    }

    #[test]
    fn test_envelope_decodes_subject_once() {
        // Decodes to the literal text "=?utf-8?B?SGk=?="
        let raw = b"Subject: =?utf-8?B?PT91dGYtOD9CP1NHaz0/PQ==?=\r\nFrom: a@b.c\r\n\r\n";
        let (headers, _) = mailparse::parse_headers(raw).unwrap();
        let envelope = Envelope::from_headers(&headers);

        assert_eq!(envelope.subject, "=?utf-8?B?SGk=?=");
    }

    #[test]
    fn test_envelope_decodes_sender_name() {
        let raw = b"From: =?utf-8?B?5byg5LiJ?= <zhang@example.com>\r\n\r\n";
        let (headers, _) = mailparse::parse_headers(raw).unwrap();
        let envelope = Envelope::from_headers(&headers);

        assert_eq!(envelope.sender, "张三 <zhang@example.com>");
    }

    #[test]
    fn test_envelope_missing_headers() {
        let (headers, _) = mailparse::parse_headers(b"X-Other: 1\r\n\r\n").unwrap();
        let envelope = Envelope::from_headers(&headers);

        assert_eq!(envelope.subject, "");
        assert_eq!(envelope.sender, "");
        assert!(envelope.received.is_none());
    }
}
