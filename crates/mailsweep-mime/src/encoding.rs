//! Charset decoding for transfer-decoded payloads.
//!
//! Labels are resolved with the WHATWG Encoding Standard rules, so aliases
//! such as `utf8`, `latin1` or `gb2312` work. Undecodable byte sequences are
//! replaced with U+FFFD instead of failing.

use encoding_rs::{Encoding, UTF_8};
use tracing::debug;

use crate::error::{Error, Result};

/// Charset assumed when a part does not declare one.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// Looks up an encoding by its MIME charset label.
///
/// # Errors
///
/// Returns [`Error::UnknownCharset`] if the label is not recognised.
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| Error::UnknownCharset(label.to_string()))
}

/// Decodes `bytes` with the declared charset, or UTF-8 when none is declared.
///
/// # Errors
///
/// Returns [`Error::UnknownCharset`] if a charset is declared but unknown.
pub fn decode_charset(bytes: &[u8], charset: Option<&str>) -> Result<String> {
    let encoding = match charset.map(str::trim).filter(|c| !c.is_empty()) {
        Some(label) => encoding_for_label(label)?,
        None => UTF_8,
    };

    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        debug!(charset = encoding.name(), "replaced undecodable bytes");
    }
    Ok(text.into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_is_utf8() {
        let text = decode_charset("Héllo".as_bytes(), None).unwrap();
        assert_eq!(text, "Héllo");
    }

    #[test]
    fn test_declared_charset() {
        // "Héllo" in ISO-8859-1
        let text = decode_charset(&[0x48, 0xE9, 0x6C, 0x6C, 0x6F], Some("iso-8859-1")).unwrap();
        assert_eq!(text, "Héllo");

        // "中文" in GBK, declared with the common gb2312 label
        let text = decode_charset(&[0xD6, 0xD0, 0xCE, 0xC4], Some("gb2312")).unwrap();
        assert_eq!(text, "中文");
    }

    #[test]
    fn test_invalid_bytes_replaced() {
        let text = decode_charset(&[0x61, 0xFF, 0x62], Some("UTF-8")).unwrap();
        assert_eq!(text, "a\u{FFFD}b");
    }

    #[test]
    fn test_blank_label_falls_back() {
        let text = decode_charset(b"plain", Some("  ")).unwrap();
        assert_eq!(text, "plain");
    }

    #[test]
    fn test_unknown_charset() {
        assert!(matches!(
            decode_charset(b"x", Some("x-no-such-charset")),
            Err(Error::UnknownCharset(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_utf8_never_fails(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            prop_assert!(decode_charset(&bytes, None).is_ok());
        }

        #[test]
        fn prop_valid_utf8_is_preserved(text in "\\PC{0,64}") {
            prop_assert_eq!(decode_charset(text.as_bytes(), Some("utf-8")).unwrap(), text);
        }
    }
}
