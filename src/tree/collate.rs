//! Key collation
//!
//! Every children map orders its keys numerically when both keys parse as
//! numbers, puts numeric keys ahead of textual ones, and falls back to plain
//! lexical order otherwise. Integer-keyed nodes therefore iterate as lists.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

/// Parse a key as a finite number.
///
/// Only keys that start like a number are considered, so words such as
/// "inf" or "NaN" stay textual.
pub fn numeric_value(key: &str) -> Option<f64> {
    let first = key.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '+' || first == '.') {
        return None;
    }
    match key.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Compare two keys under the collation rule.
///
/// Numerically equal keys with different spellings ("1" and "1.0") are
/// ordered lexically so the ordering stays total.
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    match (numeric_value(a), numeric_value(b)) {
        (Some(x), Some(y)) => match x.partial_cmp(&y) {
            Some(Ordering::Equal) | None => a.cmp(b),
            Some(ordering) => ordering,
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Map key that sorts under [`compare_keys`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CollatedKey(String);

impl CollatedKey {
    pub fn new(key: impl Into<String>) -> Self {
        CollatedKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Ord for CollatedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.0, &other.0)
    }
}

impl PartialOrd for CollatedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for CollatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for CollatedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CollatedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CollatedKey {
    fn from(key: &str) -> Self {
        CollatedKey(key.to_string())
    }
}

impl From<String> for CollatedKey {
    fn from(key: String) -> Self {
        CollatedKey(key)
    }
}

/// Sort a list of keys in place under the collation rule.
pub fn sort_keys(keys: &mut [String]) {
    keys.sort_by(|a, b| compare_keys(a, b));
}
