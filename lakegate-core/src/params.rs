//! Query-string parameters attached to a hook URL
//!
//! Dispatchers attach fixed parameters per configured hook, e.g.
//! `?allow=parquet&allow=orc&prefix=production/`.

use crate::error::{Result, ValidationError};

/// Decoded `key=value` pairs in their original order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Parse a raw query string (without the leading `?`).
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (urldecode(k), urldecode(v)),
                None => (urldecode(pair), String::new()),
            })
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            pairs: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Every value given for `key`.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Values for a repeatable key; each value may also be a comma-separated
    /// list. Blank items are dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get_all(key)
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The value of a non-repeatable key.
    pub fn get_single(&self, key: &str) -> Result<Option<&str>> {
        match self.get_all(key).as_slice() {
            [] => Ok(None),
            [value] => Ok(Some(*value)),
            values => Err(ValidationError::config(format!(
                "parameter '{}' given {} times, expected at most once",
                key,
                values.len()
            ))),
        }
    }

    /// Fail on any key outside `allowed`.
    pub fn expect_only(&self, allowed: &[&str]) -> Result<()> {
        match self.pairs.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((key, _)) => Err(ValidationError::config(format!(
                "unrecognized parameter '{}' (expected one of: {})",
                key,
                allowed.join(", ")
            ))),
            None => Ok(()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Percent-decoding for query components (`+` is a space).
fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
