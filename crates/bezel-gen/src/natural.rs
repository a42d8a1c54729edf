//! Numeric-aware ordering for identifiers and device names
//!
//! Keys are ordered by their leading numeric component first, then
//! lexicographically, so that `iPhone9,1` sorts before `iPhone10,1`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Extract the first run of ASCII digits in `s` as a number.
///
/// Returns `None` when the string contains no digits. Runs too long for a
/// `u64` saturate rather than fail.
#[must_use]
pub fn leading_number(s: &str) -> Option<u64> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits = &s[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end].bytes().fold(0u64, |acc, b| {
        acc.saturating_mul(10).saturating_add(u64::from(b - b'0'))
    });
    Some(value)
}

/// Compare two keys by leading number, falling back to plain string order.
///
/// Keys without any digits sort before keys with digits.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    leading_number(a)
        .cmp(&leading_number(b))
        .then_with(|| a.cmp(b))
}

/// Sort a slice of strings in place with [`natural_cmp`].
pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

/// String key whose `Ord` is [`natural_cmp`].
///
/// Used as the key type of every map in the registry so that serialization
/// order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalKey(String);

impl NaturalKey {
    /// Create a key
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        natural_cmp(&self.0, &other.0)
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NaturalKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NaturalKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
