use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use crate::error::ArchiveError;
use crate::failure::FailureCategory;
use crate::session::SessionOutcome;

const RULE_WIDTH: usize = 80;

/// `45s`, `3m 10s`, `1h 2m 5s`.
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let (minutes, secs) = (seconds / 60, seconds % 60);
    if minutes < 60 {
        return format!("{minutes}m {secs}s");
    }
    format!("{}h {}m {secs}s", minutes / 60, minutes % 60)
}

/// End-of-run console block. Always shown, failures or not.
pub fn print_summary<W: Write>(
    session: &SessionOutcome,
    report_path: &Path,
    out: &mut W,
) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "                        DOWNLOAD SESSION SUMMARY")?;
    writeln!(out, "{rule}")?;
    writeln!(out, "Duration: {}", format_duration(session.duration_secs()))?;
    writeln!(out, "Total Videos Attempted: {}", session.totals.attempted)?;
    writeln!(out, "  ✓ Successfully Downloaded: {}", session.totals.success)?;
    writeln!(out, "  ✗ Failed: {}", session.totals.failed)?;
    writeln!(out)?;

    if session.batches.len() > 1 {
        writeln!(out, "Collection Breakdown:")?;
        for batch in &session.batches {
            writeln!(out, "  {}:", batch.name)?;
            writeln!(
                out,
                "    Attempted: {:<4} | Success: {:<4} | Failed: {}",
                batch.attempted, batch.success, batch.failed
            )?;
        }
        writeln!(out)?;
    }

    if session.has_failures() {
        writeln!(
            out,
            "For detailed failure information, see {}",
            report_path.display()
        )?;
    }
    writeln!(out, "{rule}")
}

/// One self-contained report section for `session`.
pub fn render_report(session: &SessionOutcome) -> String {
    let mut text = String::new();
    // Formatting into a String cannot fail.
    let _ = write_section(&mut text, session);
    text
}

fn write_section<W: fmt::Write>(out: &mut W, session: &SessionOutcome) -> fmt::Result {
    let rule = "=".repeat(RULE_WIDTH);
    writeln!(out)?;
    writeln!(out, "{rule}")?;
    writeln!(out, "TikTok Video Downloader - Session Results")?;
    writeln!(
        out,
        "Generated: {}",
        session.finished_at.format("%Y-%m-%d %H:%M:%S")
    )?;
    writeln!(out, "Duration: {}", format_duration(session.duration_secs()))?;
    writeln!(out, "{rule}")?;
    writeln!(out)?;

    writeln!(out, "SUMMARY")?;
    writeln!(out, "=======")?;
    writeln!(out, "Total Videos Attempted: {}", session.totals.attempted)?;
    writeln!(out, "Successfully Downloaded: {}", session.totals.success)?;
    writeln!(out, "Failed: {}", session.totals.failed)?;
    writeln!(out)?;

    if !session.has_failures() {
        return writeln!(out, "All videos downloaded successfully!");
    }

    writeln!(out, "FAILED DOWNLOADS")?;
    writeln!(out, "================")?;
    writeln!(out)?;
    for batch in session.batches.iter().filter(|batch| !batch.failures.is_empty()) {
        writeln!(
            out,
            "Collection: {} ({} failures)",
            batch.name,
            batch.failures.len()
        )?;
        writeln!(out, "{}", "-".repeat(50))?;
        writeln!(out)?;
        for (index, failure) in batch.failures.iter().enumerate() {
            writeln!(out, "{}. Video ID: {}", index + 1, failure.video_id)?;
            writeln!(out, "   URL: {}", failure.video_url)?;
            writeln!(out, "   Error Type: {}", failure.category)?;
            writeln!(out, "   Error: {}", failure.message)?;
            writeln!(out)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "TROUBLESHOOTING TIPS")?;
    writeln!(out, "====================")?;
    write_tips(out, session)
}

fn write_tips<W: fmt::Write>(out: &mut W, session: &SessionOutcome) -> fmt::Result {
    let mut counts = HashMap::<FailureCategory, usize>::new();
    for failure in session.batches.iter().flat_map(|batch| &batch.failures) {
        *counts.entry(failure.category).or_default() += 1;
    }

    for category in FailureCategory::ALL {
        let count = counts.get(&category).copied().unwrap_or(0);
        let tips = tips_for(category);
        if count == 0 || tips.is_empty() {
            continue;
        }
        writeln!(out, "{} ({count} videos):", category.label())?;
        for tip in tips {
            writeln!(out, "{tip}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn tips_for(category: FailureCategory) -> &'static [&'static str] {
    match category {
        FailureCategory::IpBlocked => &[
            "  - Your IP may be rate-limited by TikTok",
            "  - Try again after waiting 30-60 minutes",
            "  - Consider using a VPN or different network",
        ],
        FailureCategory::AuthRequired => &[
            "  - These videos require login to view (age-restricted content)",
            "  - Retry with cookies to download these videos:",
            "    * Use --cookies cookies.txt (Netscape format)",
            "    * OR use --cookies-from-browser firefox",
            "  - See: https://github.com/yt-dlp/yt-dlp/wiki/FAQ#how-do-i-pass-cookies-to-yt-dlp",
            "    NB: cookies-from-browser may not work with Chromium-based browsers, refer to yt-dlp issue 7271 https://github.com/yt-dlp/yt-dlp/issues/7271",
        ],
        FailureCategory::NotAvailable => &[
            "  - Videos may be deleted, private, or region-locked",
            "  - Check if the video still exists by opening the URL",
        ],
        FailureCategory::NetworkTimeout => &[
            "  - Check your internet connection",
            "  - Retry the download session",
        ],
        FailureCategory::Other => &[],
    }
}

/// Appends this run's section to the cumulative report file.
pub fn write_report(session: &SessionOutcome, path: &Path) -> Result<(), ArchiveError> {
    let to_error = |err: io::Error| ArchiveError::ReportWrite {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_error)?;
    file.write_all(render_report(session).as_bytes())
        .map_err(to_error)?;
    file.flush().map_err(to_error)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local};

    use super::*;
    use crate::domain::{BatchOutcome, FailureDetail};
    use crate::session::SessionRecorder;

    fn failure(id: &str, message: &str) -> FailureDetail {
        FailureDetail {
            video_id: id.to_string(),
            video_url: format!("https://www.tiktokv.com/share/video/{id}/"),
            message: message.to_string(),
            category: FailureCategory::classify(message),
        }
    }

    fn session(batches: Vec<BatchOutcome>) -> SessionOutcome {
        let start = Local::now();
        let mut recorder = SessionRecorder::started_at(start);
        for batch in batches {
            recorder.record(batch);
        }
        recorder.finish_at(start + Duration::seconds(190))
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(190), "3m 10s");
        assert_eq!(format_duration(3600), "1h 0m 0s");
        assert_eq!(format_duration(3725), "1h 2m 5s");
    }

    #[test]
    fn summary_single_batch_has_no_breakdown() {
        let session = session(vec![BatchOutcome::from_failures("favorites", 3, vec![])]);
        let mut out = Vec::new();
        print_summary(&session, Path::new("results.txt"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Duration: 3m 10s\n"));
        assert!(text.contains("Total Videos Attempted: 3\n"));
        assert!(text.contains("  ✓ Successfully Downloaded: 3\n"));
        assert!(!text.contains("Collection Breakdown"));
        assert!(!text.contains("see results.txt"));
    }

    #[test]
    fn summary_breakdown_and_pointer() {
        let session = session(vec![
            BatchOutcome::from_failures("favorites", 5, vec![failure("1", "boom")]),
            BatchOutcome::skipped("liked", 3),
        ]);
        let mut out = Vec::new();
        print_summary(&session, Path::new("results.txt"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Collection Breakdown:\n  favorites:\n"));
        assert!(text.contains("    Attempted: 5    | Success: 4    | Failed: 1\n"));
        assert!(text.contains("    Attempted: 3    | Success: 3    | Failed: 0\n"));
        assert!(text.contains("For detailed failure information, see results.txt\n"));
    }

    #[test]
    fn report_without_failures() {
        let text = render_report(&session(vec![BatchOutcome::skipped("favorites", 2)]));
        assert!(text.starts_with(&format!("\n{}\n", "=".repeat(80))));
        assert!(text.contains("SUMMARY\n=======\nTotal Videos Attempted: 2\n"));
        assert!(text.ends_with("All videos downloaded successfully!\n"));
        assert!(!text.contains("TROUBLESHOOTING"));
    }

    #[test]
    fn report_lists_failures_and_matching_tips_only() {
        let text = render_report(&session(vec![BatchOutcome::from_failures(
            "favorites",
            4,
            vec![
                failure("1", "Your IP address is blocked from accessing this post"),
                failure("2", "Your IP address is blocked from accessing this post"),
                failure("3", "something odd"),
            ],
        )]));
        assert!(text.contains("Collection: favorites (3 failures)\n"));
        assert!(text.contains("1. Video ID: 1\n   URL: https://www.tiktokv.com/share/video/1/\n"));
        assert!(text.contains("   Error Type: IP Blocked\n"));
        assert!(text.contains("3. Video ID: 3\n"));
        assert!(text.contains("   Error Type: Other Error\n"));
        assert!(text.contains("IP Blocked (2 videos):\n  - Your IP may be rate-limited by TikTok\n"));
        assert!(!text.contains("Authentication Required ("));
        assert!(!text.contains("Network Timeout ("));
    }
}
