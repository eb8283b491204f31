//! UPnP device details and the `UpnpDetailsSearch` matcher.

use std::net::IpAddr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::headers::{HEADER_PATTERN_SIZE_LIMIT, MAX_HEADER_INPUT};

/// Details read from a UPnP device description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpnpDetails {
    pub friendly_name: Option<String>,
    pub address: Option<IpAddr>,
    pub udn: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub model_number: Option<String>,
    pub model_description: Option<String>,
    pub manufacturer_url: Option<String>,
    pub model_url: Option<String>,
}

/// Normalizes a UDN: strips the `uuid:` prefix and lower-cases valid UUIDs.
pub fn normalize_udn(udn: &str) -> String {
    let trimmed = udn.trim();
    let raw = trimmed
        .strip_prefix("uuid:")
        .or_else(|| trimmed.strip_prefix("UUID:"))
        .unwrap_or(trimmed);
    match uuid::Uuid::parse_str(raw) {
        Ok(parsed) => parsed.hyphenated().to_string(),
        Err(_) => raw.to_string(),
    }
}

impl UpnpDetails {
    pub fn new(manufacturer: &str, model_name: &str) -> Self {
        Self {
            manufacturer: Some(manufacturer.to_string()),
            model_name: Some(model_name.to_string()),
            ..Self::default()
        }
    }

    pub fn with_friendly_name(mut self, name: &str) -> Self {
        self.friendly_name = Some(name.to_string());
        self
    }

    pub fn with_udn(mut self, udn: &str) -> Self {
        self.udn = Some(udn.to_string());
        self
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn uuid(&self) -> Option<String> {
        self.udn
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(normalize_udn)
    }

    /// `(name, value)` pairs in description order, absent values skipped.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let address = self.address.map(|a| a.to_string());
        [
            ("friendlyName", self.friendly_name.clone()),
            ("address", address),
            ("udn", self.udn.clone()),
            ("manufacturer", self.manufacturer.clone()),
            ("modelName", self.model_name.clone()),
            ("modelNumber", self.model_number.clone()),
            ("modelDescription", self.model_description.clone()),
            ("manufacturerURL", self.manufacturer_url.clone()),
            ("modelURL", self.model_url.clone()),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.filter(|v| !v.trim().is_empty()).map(|v| (k, v)))
        .collect()
    }

    /// All detail values joined by a space, the string profiles match against.
    pub fn details_string(&self) -> String {
        self.entries()
            .into_iter()
            .map(|(_, v)| v.replace('\n', " "))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Short display name: friendly name, else manufacturer and model.
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.friendly_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        let parts: Vec<&str> = [self.manufacturer.as_deref(), self.model_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|p| !p.trim().is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// `UpnpDetailsSearch` compiled into a case-insensitive regex: the
/// ` , `-separated fragments must appear in order.
#[derive(Debug, Clone)]
pub struct UpnpMatcher {
    regex: Regex,
}

impl UpnpMatcher {
    pub fn compile(search: &str) -> Result<Option<Self>, regex::Error> {
        let search = search.trim();
        if search.is_empty() {
            return Ok(None);
        }
        let pattern = search.split(" , ").collect::<Vec<_>>().join(".*");
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .size_limit(HEADER_PATTERN_SIZE_LIMIT)
            .build()?;
        Ok(Some(Self { regex }))
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match_str(&self, details: &str) -> bool {
        let details = details.replace('\n', " ");
        let input = if details.len() > MAX_HEADER_INPUT {
            let mut end = MAX_HEADER_INPUT;
            while !details.is_char_boundary(end) {
                end -= 1;
            }
            &details[..end]
        } else {
            details.as_str()
        };
        let matched = self.regex.is_match(input);
        trace!(pattern = %self.regex.as_str(), details = %input, matched, "UPnP details match");
        matched
    }

    pub fn is_match(&self, details: &UpnpDetails) -> bool {
        self.is_match_str(&details.details_string())
    }
}
