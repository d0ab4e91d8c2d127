use std::path::Path;

use crate::domain::ContentReference;
use crate::error::ArchiveError;
use crate::ledger::Ledger;

/// Whether a collection can bypass yt-dlp entirely.
///
/// `warning` is only set when the ledger could not be read; in that case
/// `skip` is always false and the caller should log the warning and run the
/// downloader anyway.
#[derive(Debug)]
pub struct SkipDecision {
    pub skip: bool,
    pub reason: String,
    pub warning: Option<ArchiveError>,
}

impl SkipDecision {
    fn skip(reason: impl Into<String>) -> Self {
        Self {
            skip: true,
            reason: reason.into(),
            warning: None,
        }
    }

    fn run(reason: impl Into<String>) -> Self {
        Self {
            skip: false,
            reason: reason.into(),
            warning: None,
        }
    }
}

/// Reads the ledger at `ledger_path` and decides.
pub fn evaluate(batch: &[ContentReference], ledger_path: &Path) -> SkipDecision {
    if batch.is_empty() {
        return SkipDecision::skip("Empty collection");
    }
    match Ledger::read(ledger_path) {
        Ok(ledger) => decide(batch, &ledger),
        Err(err) => SkipDecision {
            skip: false,
            reason: "Could not read download archive".to_string(),
            warning: Some(err),
        },
    }
}

pub fn decide(batch: &[ContentReference], ledger: &Ledger) -> SkipDecision {
    if batch.is_empty() {
        return SkipDecision::skip("Empty collection");
    }
    if ledger.is_empty() {
        return SkipDecision::run(format!(
            "No videos in archive, {} videos need download",
            batch.len()
        ));
    }

    let mut missing = 0usize;
    for entry in batch {
        if !entry.has_id() {
            return SkipDecision::run(format!(
                "Could not parse video ID from URL: {}",
                entry.link
            ));
        }
        if !ledger.contains(&entry.video_id) {
            missing += 1;
        }
    }

    if missing == 0 {
        SkipDecision::skip(format!("All {} videos already downloaded", batch.len()))
    } else {
        SkipDecision::run(format!(
            "{missing} new videos need download (out of {} total)",
            batch.len()
        ))
    }
}
