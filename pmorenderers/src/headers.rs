//! HTTP header sets and the header matcher of a profile.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use tracing::trace;

/// Cap on the joined header string presented to a matcher.
pub const MAX_HEADER_INPUT: usize = 8 * 1024;

/// Upper bound for the compiled size of a header pattern.
pub const HEADER_PATTERN_SIZE_LIMIT: usize = 1 << 20;

pub const USER_AGENT: &str = "User-Agent";

/// Standard HTTP/UPnP headers, never considered as identifying a device.
const STANDARD_HEADERS: [&str; 13] = [
    "accept",
    "accept-language",
    "accept-encoding",
    "callback",
    "connection",
    "content-length",
    "content-type",
    "date",
    "host",
    "nt",
    "sid",
    "timeout",
    "user-agent",
];

/// Header set ordered case-insensitively by name.
///
/// Blank names and blank values are ignored. Inserting a name twice keeps
/// the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedHeaders {
    entries: BTreeMap<String, (String, String)>,
}

impl SortedHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            return;
        }
        self.entries
            .insert(name.to_lowercase(), (name.to_string(), value.to_string()));
    }

    /// Parses a raw `Name: value` line.
    pub fn insert_line(&mut self, line: &str) {
        if let Some((name, value)) = line.split_once(':') {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.trim().to_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `(name, value)` pairs in case-insensitive name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values joined by a space, in name order.
    pub fn joined(&self) -> String {
        self.entries
            .values()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Headers that are not part of the standard set, as `Name: value`.
    ///
    /// Those are the ones worth copying into a new profile for a device that
    /// was not recognized.
    pub fn unknown_headers(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(lower, _)| !STANDARD_HEADERS.iter().any(|std| lower.starts_with(std)))
            .map(|(_, (k, v))| format!("{k}: {v}"))
            .collect()
    }

    /// `User-Agent: value` followed by the unknown headers.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers = Vec::new();
        if let Some(ua) = self.get(USER_AGENT) {
            identifiers.push(format!("{USER_AGENT}: {ua}"));
        }
        identifiers.extend(self.unknown_headers());
        identifiers
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for SortedHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = SortedHeaders::new();
        for (k, v) in iter {
            headers.insert(k.as_ref(), v.as_ref());
        }
        headers
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Header criteria of a profile compiled into one case-insensitive regex.
///
/// The criteria are keyed by header name and concatenated in the same
/// case-insensitive order as [`SortedHeaders::joined`]: a single criterion
/// gives `pattern`, two give `(first).*(second)`.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    regex: Regex,
}

impl HeaderMatcher {
    /// Compiles the criteria. Returns `Ok(None)` when every pattern is blank.
    pub fn compile<'a, I>(criteria: I) -> Result<Option<Self>, regex::Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let search: SortedHeaders = criteria.into_iter().collect();
        let patterns: Vec<&str> = search.iter().map(|(_, pattern)| pattern).collect();
        let combined = match patterns.as_slice() {
            [] => return Ok(None),
            [single] => single.to_string(),
            many => many
                .iter()
                .map(|p| format!("({p})"))
                .collect::<Vec<_>>()
                .join(".*"),
        };
        let regex = RegexBuilder::new(&combined)
            .case_insensitive(true)
            .size_limit(HEADER_PATTERN_SIZE_LIMIT)
            .build()?;
        Ok(Some(Self { regex }))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Substring search over the joined header values.
    pub fn is_match(&self, headers: &SortedHeaders) -> bool {
        if headers.is_empty() {
            return false;
        }
        let joined = headers.joined();
        let matched = self.regex.is_match(truncate(&joined, MAX_HEADER_INPUT));
        trace!(pattern = %self.regex.as_str(), headers = %joined, matched, "header match");
        matched
    }
}
