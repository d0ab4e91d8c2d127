use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::failure::FailureCategory;

/// Pulls the numeric video id out of the various TikTok link shapes.
///
/// Supported forms include:
///   - `https://www.tiktokv.com/share/video/7600559584901647646/`
///   - `https://www.tiktok.com/@user/video/7600559584901647646`
///   - `https://m.tiktok.com/v/7600559584901647646.html`
///
/// Patterns are tried in order and the first match wins. A link that matches
/// none of them yields an empty id.
#[derive(Debug, Clone)]
pub struct IdExtractor {
    patterns: Vec<Regex>,
}

impl IdExtractor {
    pub fn new() -> Self {
        Self {
            patterns: vec![
                Regex::new(r"/video/(\d+)").unwrap(),
                Regex::new(r"/v/(\d+)").unwrap(),
            ],
        }
    }

    pub fn extract(&self, url: &str) -> String {
        self.patterns
            .iter()
            .find_map(|re| re.captures(url))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}

impl Default for IdExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// One link from the export, tagged with the collection it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentReference {
    pub link: String,
    #[serde(rename = "favorited_date", default)]
    pub date: Option<String>,
    pub collection: String,
    pub video_id: String,
}

impl ContentReference {
    pub fn new(
        link: impl Into<String>,
        date: Option<String>,
        collection: impl Into<String>,
        extractor: &IdExtractor,
    ) -> Self {
        let link = link.into();
        let video_id = extractor.extract(&link);
        Self {
            link,
            date: date.filter(|value| !value.trim().is_empty()),
            collection: collection.into(),
            video_id,
        }
    }

    pub fn has_id(&self) -> bool {
        !self.video_id.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub video_id: String,
    pub video_url: String,
    pub message: String,
    pub category: FailureCategory,
}

/// Result of one collection run. Built once after the downloader exits and
/// never touched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub name: String,
    pub attempted: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: bool,
    pub failures: Vec<FailureDetail>,
}

impl BatchOutcome {
    pub fn from_failures(
        name: impl Into<String>,
        requested: usize,
        failures: Vec<FailureDetail>,
    ) -> Self {
        let failed = failures.len();
        // The downloader can report errors for links we did not count
        // (playlists, redirects); keep attempted = success + failed.
        let attempted = requested.max(failed);
        Self {
            name: name.into(),
            attempted,
            success: attempted - failed,
            failed,
            skipped: false,
            failures,
        }
    }

    pub fn skipped(name: impl Into<String>, requested: usize) -> Self {
        Self {
            name: name.into(),
            attempted: requested,
            success: requested,
            failed: 0,
            skipped: true,
            failures: Vec::new(),
        }
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} attempted, {} ok, {} failed",
            self.name, self.attempted, self.success, self.failed
        )
    }
}
