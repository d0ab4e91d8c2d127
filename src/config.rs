use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::error::ArchiveError;

pub const DEFAULT_EXPORT_FILE: &str = "user_data_tiktok.json";
pub const DEFAULT_REPORT_FILE: &str = "results.txt";
pub const DEFAULT_LIST_FILE: &str = "fav_videos.txt";

/// File name of the yt-dlp binary fetched into the working directory.
#[cfg(windows)]
pub const DEFAULT_TOOL_PATH: &str = "yt-dlp.exe";
#[cfg(not(windows))]
pub const DEFAULT_TOOL_PATH: &str = "yt-dlp";

pub const SUPPORTED_BROWSERS: &[&str] = &[
    "chrome", "firefox", "edge", "safari", "opera", "brave", "chromium", "vivaldi",
];

const NETSCAPE_HEADER: &str = "Netscape HTTP Cookie File";

/// Where yt-dlp gets its login cookies from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieSource {
    File(PathBuf),
    Browser(String),
}

impl CookieSource {
    /// Builds the source from the two CLI flags, validating whichever is set.
    pub fn from_flags(
        file: Option<PathBuf>,
        browser: Option<String>,
    ) -> Result<Option<Self>, ArchiveError> {
        match (file, browser) {
            (Some(_), Some(_)) => Err(ArchiveError::ConflictingCookies),
            (Some(path), None) => {
                validate_cookie_file(&path)?;
                Ok(Some(Self::File(path)))
            }
            (None, Some(name)) => Ok(Some(Self::Browser(validate_browser(&name)?))),
            (None, None) => Ok(None),
        }
    }
}

/// Where the fetched yt-dlp lives. The result always has a directory
/// component, so it is spawned from `work_dir` and never looked up on `PATH`.
pub fn provisioned_tool_path(work_dir: &Utf8Path) -> Utf8PathBuf {
    work_dir.join(DEFAULT_TOOL_PATH)
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub export_file: PathBuf,
    pub organize_by_collection: bool,
    pub include_liked: bool,
    pub skip_thumbnails: bool,
    pub index_only: bool,
    pub disable_resume: bool,
    pub disable_progress_bar: bool,
    pub cookies: Option<CookieSource>,
    pub flat_list_name: String,
    pub tool_path: Utf8PathBuf,
    pub report_path: PathBuf,
    pub work_dir: Utf8PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            export_file: PathBuf::from(DEFAULT_EXPORT_FILE),
            organize_by_collection: true,
            include_liked: false,
            skip_thumbnails: false,
            index_only: false,
            disable_resume: false,
            disable_progress_bar: false,
            cookies: None,
            flat_list_name: DEFAULT_LIST_FILE.to_string(),
            tool_path: provisioned_tool_path(Utf8Path::new(".")),
            report_path: PathBuf::from(DEFAULT_REPORT_FILE),
            work_dir: Utf8PathBuf::from("."),
        }
    }
}

pub fn validate_cookie_file(path: &Path) -> Result<(), ArchiveError> {
    if path.as_os_str().is_empty() {
        return Err(ArchiveError::InvalidCookieFile(
            "cookie file path is empty".to_string(),
        ));
    }
    let metadata = path.metadata().map_err(|_| {
        ArchiveError::InvalidCookieFile(format!("file not found: {}", path.display()))
    })?;
    if metadata.is_dir() {
        return Err(ArchiveError::InvalidCookieFile(format!(
            "path is a directory, not a file: {}",
            path.display()
        )));
    }
    let file = File::open(path).map_err(|err| {
        ArchiveError::InvalidCookieFile(format!("cannot read {}: {err}", path.display()))
    })?;

    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .map_err(|err| {
            ArchiveError::InvalidCookieFile(format!("cannot read {}: {err}", path.display()))
        })?;
    if !first_line.contains(NETSCAPE_HEADER) {
        warn!(
            path = %path.display(),
            "cookie file may not be in Netscape format; yt-dlp may reject it"
        );
    }
    Ok(())
}

/// Returns the lower-cased browser name yt-dlp expects.
pub fn validate_browser(name: &str) -> Result<String, ArchiveError> {
    let lower = name.trim().to_lowercase();
    if SUPPORTED_BROWSERS.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(ArchiveError::UnsupportedBrowser(name.to_string()))
    }
}
