//! In-pass duplicate detection.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Composite key `subject|sender|received`.
///
/// The received part is the RFC 3339 rendering of the `Date` header with its
/// original offset, or `unknown` when the header was missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Builds the key for a message.
    #[must_use]
    pub fn new(subject: &str, sender: &str, received: Option<&DateTime<FixedOffset>>) -> Self {
        let received = received.map_or_else(|| "unknown".to_string(), DateTime::to_rfc3339);
        Self(format!("{subject}|{sender}|{received}"))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remembers the keys seen during one pass.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<IdentityKey>,
}

impl Deduplicator {
    /// Creates an empty deduplicator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key`; returns `false` if it was already seen.
    pub fn insert(&mut self, key: &IdentityKey) -> bool {
        if self.seen.contains(key) {
            return false;
        }
        self.seen.insert(key.clone())
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
    use proptest::prelude::*;

    #[test]
    fn test_key_format() {
        let date = DateTime::parse_from_rfc2822("Mon, 01 Jan 2024 10:00:00 +0800").unwrap();
        let key = IdentityKey::new("Hi", "a@b.c", Some(&date));
        assert_eq!(key.as_str(), "Hi|a@b.c|2024-01-01T10:00:00+08:00");

        let key = IdentityKey::new("Hi", "a@b.c", None);
        assert_eq!(key.to_string(), "Hi|a@b.c|unknown");
    }

    #[test]
    fn test_first_wins() {
        let mut dedup = Deduplicator::new();
        let key = IdentityKey::new("s", "f", None);
        assert!(dedup.insert(&key));
        assert!(!dedup.insert(&key));
        assert!(dedup.insert(&IdentityKey::new("s", "g", None)));
    }

    #[test]
    fn test_same_instant_different_offset_is_distinct() {
        let a = DateTime::parse_from_rfc2822("Mon, 01 Jan 2024 10:00:00 +0800").unwrap();
        let b = DateTime::parse_from_rfc2822("Mon, 01 Jan 2024 02:00:00 +0000").unwrap();
        assert_ne!(
            IdentityKey::new("s", "f", Some(&a)),
            IdentityKey::new("s", "f", Some(&b))
        );
    }

    proptest! {
        #[test]
        fn prop_insert_is_idempotent(keys in proptest::collection::vec("[a-c]{1,2}", 0..40)) {
            let mut dedup = Deduplicator::new();
            let mut kept = Vec::new();
            for k in &keys {
                let key = IdentityKey::new(k, "sender", None);
                if dedup.insert(&key) {
                    kept.push(k.clone());
                }
            }
            let distinct: HashSet<_> = keys.iter().collect();
            prop_assert_eq!(kept.len(), distinct.len());
        }
    }
}
