//! Helpers for HTTP request string handling.

use log::trace;
use percent_encoding::percent_decode_str;

use crate::helpers::utf8::validate_utf8;

/// A percent-decoded string, checked to be valid UTF-8.
///
/// Holding the decoded value in its own type records that decoding already
/// happened where later code relies on it: route resolution matches against
/// decoded segments, and the file middleware inspects decoded paths.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PercentDecoded {
    val: String,
}

impl PercentDecoded {
    /// Decodes `raw`, returning `None` when the decoded bytes are not valid
    /// UTF-8.
    pub fn new(raw: &str) -> Option<Self> {
        let bytes: Vec<u8> = percent_decode_str(raw).collect();
        if !validate_utf8(&bytes) {
            trace!(" rejected non-UTF-8 percent-decoded value: {}", raw);
            return None;
        }
        let val = String::from_utf8(bytes).ok()?;
        Some(PercentDecoded { val })
    }

    /// Consumes the wrapper, returning the decoded string.
    pub fn into_inner(self) -> String {
        self.val
    }
}

impl AsRef<str> for PercentDecoded {
    fn as_ref(&self) -> &str {
        &self.val
    }
}

/// Decode form-urlencoded strings (e.g. query string, or request body with Content-Type:
/// application/x-www-form-urlencoded).
fn form_url_decode(raw: &str) -> Option<String> {
    let bytes: Vec<u8> = percent_decode_str(&raw.replace('+', " ")).collect();
    if !validate_utf8(&bytes) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Splits a query string into ordered key/value pairs.
///
/// Pairs whose key or value fail to decode as UTF-8 are dropped; a key with
/// no `=` maps to the empty string.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let mut halves = pair.splitn(2, '=');
            let key = form_url_decode(halves.next()?)?;
            let value = form_url_decode(halves.next().unwrap_or(""))?;
            Some((key, value))
        })
        .collect()
}
