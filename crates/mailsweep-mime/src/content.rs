//! Rich content extraction.
//!
//! A message is flattened into a single body: every `text/html` part is
//! concatenated into one HTML buffer, every `text/plain` part into a text
//! buffer, and the HTML buffer wins whenever it holds anything besides
//! whitespace. Attachment filenames are listed in a footer whose markup
//! matches the chosen body.

use mailparse::body::Body;
use mailparse::{DispositionType, ParsedMail};
use tracing::debug;

use crate::encoding::decode_charset;
use crate::header::decode_encoded_words;

/// Label of the footer appended to HTML bodies.
pub const HTML_ATTACHMENT_LABEL: &str = "[Notice] Contains attachments:";

/// Label of the footer appended to plain-text bodies.
pub const PLAIN_ATTACHMENT_LABEL: &str = "[Attachments]";

/// Rule separating a plain-text body from its attachment footer.
const PLAIN_SEPARATOR: &str = "----------------";

/// Markup of the selected body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyFormat {
    /// The body came from `text/html` parts.
    Html,
    /// The body came from `text/plain` parts or a single-part payload.
    Plain,
}

/// Flattened body of a message plus the attachments it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RichContent {
    /// Selected body, without the attachment footer.
    pub body: String,
    /// Markup of `body`.
    pub format: BodyFormat,
    /// Decoded attachment filenames in message order.
    pub attachments: Vec<String>,
}

impl RichContent {
    /// Returns the attachment footer, formatted for the body's markup.
    #[must_use]
    pub fn attachment_footer(&self) -> Option<String> {
        if self.attachments.is_empty() {
            return None;
        }

        let names = self.attachments.join(", ");
        Some(match self.format {
            BodyFormat::Html => format!("<br><hr><b>{HTML_ATTACHMENT_LABEL}</b> {names}"),
            BodyFormat::Plain => {
                format!("\n\n{PLAIN_SEPARATOR}\n{PLAIN_ATTACHMENT_LABEL}: {names}")
            }
        })
    }

    /// Returns the body with the attachment footer appended.
    #[must_use]
    pub fn render(&self) -> String {
        match self.attachment_footer() {
            Some(footer) => format!("{}{footer}", self.body),
            None => self.body.clone(),
        }
    }
}

#[derive(Default)]
struct Buffers {
    html: String,
    text: String,
    attachments: Vec<String>,
}

/// Extracts the renderable content of a parsed message.
///
/// Never fails: parts that cannot be decoded are skipped, and a single-part
/// payload that cannot be decoded is returned as its raw text.
#[must_use]
pub fn extract_rich_content(mail: &ParsedMail<'_>) -> RichContent {
    let mut buffers = Buffers::default();

    if mail.subparts.is_empty() {
        buffers.text = decode_payload(mail).unwrap_or_else(|| raw_payload(mail));
    } else {
        walk(mail, &mut buffers);
    }

    let (body, format) = if buffers.html.trim().is_empty() {
        (buffers.text, BodyFormat::Plain)
    } else {
        (buffers.html, BodyFormat::Html)
    };

    RichContent {
        body,
        format,
        attachments: buffers.attachments,
    }
}

/// Visits `part` and all of its descendants, depth first.
fn walk(part: &ParsedMail<'_>, buffers: &mut Buffers) {
    visit(part, buffers);
    for subpart in &part.subparts {
        walk(subpart, buffers);
    }
}

fn visit(part: &ParsedMail<'_>, buffers: &mut Buffers) {
    let disposition = part.get_content_disposition();

    let filename = disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| decode_encoded_words(name.as_str()))
        .filter(|name| !name.is_empty());
    if let Some(name) = filename {
        buffers.attachments.push(name);
    }

    if matches!(disposition.disposition, DispositionType::Attachment) {
        return;
    }

    let target = match part.ctype.mimetype.as_str() {
        "text/html" => &mut buffers.html,
        "text/plain" => &mut buffers.text,
        _ => return,
    };
    if let Some(text) = decode_payload(part) {
        target.push_str(&text);
    }
}

/// Transfer-decodes and charset-decodes a part's payload.
fn decode_payload(part: &ParsedMail<'_>) -> Option<String> {
    let bytes = match part.get_body_raw() {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(mimetype = %part.ctype.mimetype, error = %e, "skipping undecodable payload");
            return None;
        }
    };

    let charset = part.ctype.params.get("charset").map(String::as_str);
    match decode_charset(&bytes, charset) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!(mimetype = %part.ctype.mimetype, error = %e, "skipping payload");
            None
        }
    }
}

/// Payload exactly as it appears in the message, before any decoding.
fn raw_payload(part: &ParsedMail<'_>) -> String {
    match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => {
            String::from_utf8_lossy(body.get_raw()).into_owned()
        }
        Body::SevenBit(body) | Body::EightBit(body) => {
            String::from_utf8_lossy(body.get_raw()).into_owned()
        }
        Body::Binary(body) => String::from_utf8_lossy(body.get_raw()).into_owned(),
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

    fn extract(raw: &str) -> RichContent {
        let mail = mailparse::parse_mail(raw.as_bytes()).unwrap();
        extract_rich_content(&mail)
    }

    const ALTERNATIVE: &str = concat!(
        "Subject: Both\r\n",
        "Content-Type: multipart/alternative; boundary=\"alt\"\r\n",
        "\r\n",
        "--alt\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "plain body\r\n",
        "--alt\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<p>html body</p>\r\n",
        "--alt--\r\n",
    );

    #[test]
    fn test_html_preferred_over_plain() {
        let content = extract(ALTERNATIVE);
        assert_eq!(content.format, BodyFormat::Html);
        assert!(content.body.contains("<p>html body</p>"));
        assert!(!content.body.contains("plain body"));
        assert_eq!(content.render(), content.body);
    }

    #[test]
    fn test_plain_with_attachment_footer() {
        let raw = concat!(
            "Subject: Report\r\n",
            "Content-Type: multipart/mixed; boundary=\"mix\"\r\n",
            "\r\n",
            "--mix\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "See attached.\r\n",
            "--mix\r\n",
            "Content-Type: application/pdf; name=\"report.pdf\"\r\n",
            "Content-Disposition: attachment; filename=\"report.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0xLjQK\r\n",
            "--mix--\r\n",
        );

        let content = extract(raw);
        assert_eq!(content.format, BodyFormat::Plain);
        assert_eq!(content.attachments, vec!["report.pdf".to_string()]);

        let rendered = content.render();
        assert!(rendered.starts_with("See attached."));
        assert!(rendered.ends_with("\n\n----------------\n[Attachments]: report.pdf"));
    }

    #[test]
    fn test_html_with_attachment_footer() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"outer\"\r\n",
            "\r\n",
            "--outer\r\n",
            "Content-Type: multipart/alternative; boundary=\"inner\"\r\n",
            "\r\n",
            "--inner\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "text\r\n",
            "--inner\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>rich</b>\r\n",
            "--inner--\r\n",
            "--outer\r\n",
            "Content-Type: text/csv\r\n",
            "Content-Disposition: attachment; filename=\"a.csv\"\r\n",
            "\r\n",
            "x,y\r\n",
            "--outer\r\n",
            "Content-Type: image/png\r\n",
            "Content-Disposition: attachment; filename=\"b.png\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "iVBORw0KGgo=\r\n",
            "--outer--\r\n",
        );

        let content = extract(raw);
        assert_eq!(content.format, BodyFormat::Html);
        assert!(content.body.contains("<b>rich</b>"));
        assert!(
            content
                .render()
                .ends_with("<br><hr><b>[Notice] Contains attachments:</b> a.csv, b.png")
        );
    }

    #[test]
    fn test_attachment_text_not_in_body() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"notes.txt\"\r\n",
            "\r\n",
            "secret notes\r\n",
            "--b--\r\n",
        );

        let content = extract(raw);
        assert!(content.body.contains("body"));
        assert!(!content.body.contains("secret notes"));
        assert_eq!(content.attachments, vec!["notes.txt".to_string()]);
    }

    #[test]
    fn test_inline_part_with_name_is_listed() {
        let raw = concat!(
            "Content-Type: multipart/related; boundary=\"rel\"\r\n",
            "\r\n",
            "--rel\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<img src=\"cid:logo\">\r\n",
            "--rel\r\n",
            "Content-Type: image/png; name=\"logo.png\"\r\n",
            "Content-Disposition: inline\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "iVBORw0KGgo=\r\n",
            "--rel--\r\n",
        );

        let content = extract(raw);
        assert_eq!(content.attachments, vec!["logo.png".to_string()]);
        assert_eq!(content.format, BodyFormat::Html);
    }

    #[test]
    fn test_encoded_filename() {
        let raw = concat!(
            "Content-Type: multipart/mixed; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "hi\r\n",
            "--b\r\n",
            "Content-Type: application/octet-stream\r\n",
            "Content-Disposition: attachment; filename=\"=?utf-8?B?5oql5ZGKLnBkZg==?=\"\r\n",
            "\r\n",
            "data\r\n",
            "--b--\r\n",
        );

        let content = extract(raw);
        assert_eq!(content.attachments, vec!["报告.pdf".to_string()]);
    }

    #[test]
    fn test_part_charset_and_transfer_encoding() {
        let raw = concat!(
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "H=E9llo\r\n",
            "--b--\r\n",
        );

        let content = extract(raw);
        assert!(content.body.starts_with("Héllo"));
    }

    #[test]
    fn test_whitespace_html_loses_to_plain() {
        let raw = concat!(
            "Content-Type: multipart/alternative; boundary=\"b\"\r\n",
            "\r\n",
            "--b\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "real text\r\n",
            "--b\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "   \r\n",
            "--b--\r\n",
        );

        let content = extract(raw);
        assert_eq!(content.format, BodyFormat::Plain);
        assert!(content.body.contains("real text"));
    }

    #[test]
    fn test_single_part_goes_to_plain_buffer() {
        let raw = concat!(
            "Subject: single\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>only part</p>",
        );

        let content = extract(raw);
        assert_eq!(content.format, BodyFormat::Plain);
        assert_eq!(content.body, "<p>only part</p>");
    }

    #[test]
    fn test_single_part_without_charset_is_utf8() {
        let raw = "Subject: x\r\nContent-Transfer-Encoding: 8bit\r\n\r\nCafé crème";
        let content = extract(raw);
        assert_eq!(content.body, "Café crème");
    }

    #[test]
    fn test_single_part_unknown_charset_falls_back_to_raw() {
        let raw = concat!(
            "Content-Type: text/plain; charset=x-klingon\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "SGVsbG8=",
        );

        let content = extract(raw);
        assert_eq!(content.body, "SGVsbG8=");
    }

    #[test]
    fn test_footer_absent_without_attachments() {
        let content = RichContent {
            body: "x".to_string(),
            format: BodyFormat::Plain,
            attachments: Vec::new(),
        };
        assert!(content.attachment_footer().is_none());
        assert_eq!(content.render(), "x");
    }
}
