//! SASL initial responses for bearer-token authentication.
//!
//! Only XOAUTH2 (Google/Microsoft proprietary) is provided. The payload is
//! returned unencoded; IMAP libraries base64-encode authenticator output
//! before putting it on the wire.

/// Builds the XOAUTH2 initial client response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01`
///
/// Neither the address nor the token is escaped. Servers validate this exact
/// grammar, so the output must not be reformatted.
///
/// # Example
///
/// ```
/// use mailsweep_oauth::sasl::xoauth2_payload;
///
/// let payload = xoauth2_payload("user@example.com", "EwBgA8l6");
/// assert_eq!(payload, "user=user@example.com\x01auth=Bearer EwBgA8l6\x01\x01");
/// ```
#[must_use]
pub fn xoauth2_payload(user: &str, token: &str) -> String {
    format!("user={user}\x01auth=Bearer {token}\x01\x01")
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
    use proptest::prelude::*;

    #[test]
    fn test_xoauth2_format() {
        let payload = xoauth2_payload("test@test.com", "abc");
        assert_eq!(payload.as_bytes(), b"user=test@test.com\x01auth=Bearer abc\x01\x01");
    }

    #[test]
    fn test_xoauth2_no_escaping() {
        let payload = xoauth2_payload("we\"ird user@example.com", "tok=en/+");
        assert_eq!(
            payload,
            "user=we\"ird user@example.com\x01auth=Bearer tok=en/+\x01\x01"
        );
    }

    proptest! {
        #[test]
        fn prop_xoauth2_layout(user in "[a-z0-9.@_-]{1,40}", token in "[A-Za-z0-9._~+/=-]{1,200}") {
            let payload = xoauth2_payload(&user, &token);
            let fields: Vec<&str> = payload.split('\x01').collect();
            prop_assert_eq!(fields.len(), 4);
            prop_assert_eq!(fields[0], format!("user={user}"));
            prop_assert_eq!(fields[1], format!("auth=Bearer {token}"));
            prop_assert_eq!(fields[2], "");
            prop_assert_eq!(fields[3], "");
        }
    }
}
