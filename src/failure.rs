use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde::Serialize;

use crate::domain::{ContentReference, FailureDetail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    IpBlocked,
    AuthRequired,
    NotAvailable,
    NetworkTimeout,
    Other,
}

const IP_BLOCKED_PHRASES: &[&str] = &["ip address is blocked"];
const AUTH_REQUIRED_PHRASES: &[&str] = &["log in for access", "not comfortable for some audiences"];
const NOT_AVAILABLE_PHRASES: &[&str] = &["not available", "private video"];
const NETWORK_TIMEOUT_PHRASES: &[&str] = &["timeout", "connection refused"];

impl FailureCategory {
    /// Report order. Also the order categories are matched in.
    pub const ALL: [FailureCategory; 5] = [
        FailureCategory::IpBlocked,
        FailureCategory::AuthRequired,
        FailureCategory::NotAvailable,
        FailureCategory::NetworkTimeout,
        FailureCategory::Other,
    ];

    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |phrases: &[&str]| phrases.iter().any(|phrase| lower.contains(phrase));

        if matches(IP_BLOCKED_PHRASES) {
            FailureCategory::IpBlocked
        } else if matches(AUTH_REQUIRED_PHRASES) {
            FailureCategory::AuthRequired
        } else if matches(NOT_AVAILABLE_PHRASES) {
            FailureCategory::NotAvailable
        } else if matches(NETWORK_TIMEOUT_PHRASES) {
            FailureCategory::NetworkTimeout
        } else {
            FailureCategory::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FailureCategory::IpBlocked => "IP Blocked",
            FailureCategory::AuthRequired => "Authentication Required",
            FailureCategory::NotAvailable => "Not Available",
            FailureCategory::NetworkTimeout => "Network Timeout",
            FailureCategory::Other => "Other Error",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scans captured downloader output for `ERROR: [TikTok] <id>: <message>`
/// lines and turns each into a classified failure.
#[derive(Debug, Clone)]
pub struct FailureExtractor {
    pattern: Regex,
}

impl FailureExtractor {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"ERROR:\s*\[TikTok\]\s*(\d+):\s*(.+)").unwrap(),
        }
    }

    pub fn extract<'a, I>(&self, lines: I, batch: &[ContentReference]) -> Vec<FailureDetail>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let urls: HashMap<&str, &str> = batch
            .iter()
            .filter(|entry| entry.has_id())
            .map(|entry| (entry.video_id.as_str(), entry.link.as_str()))
            .collect();

        lines
            .into_iter()
            .filter_map(|line| self.pattern.captures(line))
            .map(|caps| {
                let video_id = caps[1].to_string();
                let message = caps[2].trim().to_string();
                FailureDetail {
                    video_url: urls
                        .get(video_id.as_str())
                        .map(|url| url.to_string())
                        .unwrap_or_default(),
                    category: FailureCategory::classify(&message),
                    video_id,
                    message,
                }
            })
            .collect()
    }
}

impl Default for FailureExtractor {
    fn default() -> Self {
        Self::new()
    }
}
