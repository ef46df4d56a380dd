//! Case-insensitive, multi-value header container.
//!
//! # Responsibilities
//! - Group header values under their lowercase name
//! - Preserve the caller's original casing in each entry's `key`
//! - Merge handler output into pipeline state (replace per name)
//! - Convert to and from `http::HeaderMap`
//!
//! # Design Decisions
//! - The first entry of a sequence is the authoritative value for comparisons
//! - Merge replaces the whole sequence for a name; it never appends
//! - Hop-by-hop headers are never written back to the wire

use std::collections::btree_map;
use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Headers the HTTP layer manages itself; never copied onto a wire message.
const HOP_BY_HOP: &[&str] = &["connection", "keep-alive", "transfer-encoding", "upgrade"];

/// Case-insensitive string equality used for header names.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A single header value with the name as it was originally cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    #[serde(default)]
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Lowercase header name → ordered values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, Vec<HeaderEntry>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw name/value pairs. Names that differ only by case
    /// collapse into one entry, values kept in arrival order.
    pub fn parse<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut headers = Self::new();
        for (name, value) in pairs {
            headers.append(name, value);
        }
        headers
    }

    /// Build from an `http::HeaderMap`. Non-UTF-8 values are decoded lossily.
    pub fn from_http(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map.iter() {
            headers.append(name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
        }
        headers
    }

    /// Like [`Headers::from_http`], minus the hop-by-hop headers of the
    /// connection the message arrived on.
    pub fn end_to_end(map: &HeaderMap) -> Self {
        let mut headers = Self::from_http(map);
        headers.0.retain(|name, _| !HOP_BY_HOP.contains(&name.as_str()));
        headers
    }

    /// Append a value under `name`, keeping existing values.
    pub fn append(&mut self, name: &str, value: &str) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(HeaderEntry::new(name, value));
    }

    /// Every entry stored under `name`, in arrival order.
    pub fn get(&self, name: &str) -> Option<&[HeaderEntry]> {
        self.0.get(&name.to_ascii_lowercase()).map(Vec::as_slice)
    }

    /// The authoritative (first) value for `name`.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|entries| entries.first())
            .map(|entry| entry.value.as_str())
    }

    /// Overwrite every name present in `source`. `None` leaves `self` untouched.
    pub fn merge(&mut self, source: Option<&Headers>) {
        let Some(source) = source else {
            return;
        };
        for (key, entries) in source.iter() {
            self.0.insert(key.clone(), entries.clone());
        }
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<HeaderEntry>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase map keys coming from handler output and fill blank entry
    /// keys with the name they are stored under.
    pub(crate) fn normalize(&mut self) {
        let raw = std::mem::take(&mut self.0);
        for (name, mut entries) in raw {
            for entry in entries.iter_mut().filter(|entry| entry.key.is_empty()) {
                entry.key = name.clone();
            }
            self.0
                .entry(name.to_ascii_lowercase())
                .or_default()
                .extend(entries);
        }
    }

    /// Render every value onto an `http::HeaderMap`.
    pub fn to_http(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, entries) in self.iter() {
            if HOP_BY_HOP.contains(&name.as_str()) {
                continue;
            }
            for entry in entries {
                let key = if entry.key.is_empty() { name } else { &entry.key };
                match (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(&entry.value),
                ) {
                    (Ok(name), Ok(value)) => {
                        map.append(name, value);
                    }
                    _ => {
                        tracing::warn!(header = %key, "Dropping header that is not valid on the wire");
                    }
                }
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_collapses_names_case_insensitively() {
        let headers = Headers::parse([("X-Test", "one"), ("x-test", "two")]);

        assert_eq!(headers.len(), 1);
        let entries = headers.get("X-TEST").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], HeaderEntry::new("X-Test", "one"));
        assert_eq!(entries[1], HeaderEntry::new("x-test", "two"));
        assert_eq!(headers.first_value("x-test"), Some("one"));
    }

    #[test]
    fn merge_replaces_sequences_by_name() {
        let mut target = Headers::parse([("accept", "a"), ("accept", "b"), ("host", "h")]);
        let source = Headers::parse([("Accept", "c")]);

        target.merge(Some(&source));

        assert_eq!(target.get("accept").unwrap(), &[HeaderEntry::new("Accept", "c")]);
        assert_eq!(target.first_value("host"), Some("h"));
    }

    #[test]
    fn merge_with_none_is_noop() {
        let mut target = Headers::parse([("host", "h")]);
        let before = target.clone();
        target.merge(None);
        assert_eq!(target, before);
    }

    #[test]
    fn end_to_end_drops_connection_headers() {
        let mut map = HeaderMap::new();
        map.insert("connection", HeaderValue::from_static("close"));
        map.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        map.insert("content-type", HeaderValue::from_static("text/plain"));

        let headers = Headers::end_to_end(&map);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.first_value("content-type"), Some("text/plain"));
        assert_eq!(Headers::from_http(&map).first_value("connection"), Some("close"));
    }

    #[test]
    fn serializes_in_platform_shape() {
        let headers = Headers::parse([("Host", "example.com")]);
        let json = serde_json::to_value(&headers).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "host": [{ "key": "Host", "value": "example.com" }] })
        );
    }

    #[test]
    fn to_http_writes_all_values_and_skips_hop_by_hop() {
        let headers = Headers::parse([
            ("set-cookie", "a=1"),
            ("set-cookie", "b=2"),
            ("Connection", "keep-alive"),
            ("bad header", "x"),
        ]);
        let map = headers.to_http();

        assert_eq!(map.get_all("set-cookie").iter().count(), 2);
        assert!(map.get("connection").is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn normalize_lowercases_map_keys() {
        let mut headers: Headers =
            serde_json::from_value(serde_json::json!({ "X-Blocked": [{ "value": "1" }] })).unwrap();
        headers.normalize();

        assert_eq!(headers.get("x-blocked").unwrap(), &[HeaderEntry::new("X-Blocked", "1")]);
        assert_eq!(headers.iter().next().unwrap().0, "x-blocked");
    }

    #[test]
    fn eq_ignore_case_matches_mixed_case() {
        assert!(eq_ignore_case("Content-Length", "content-length"));
        assert!(!eq_ignore_case("content-length", "content-type"));
    }
}
