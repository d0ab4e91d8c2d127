use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ArchiveError {
    #[error("export file not found or unreadable: {0}")]
    ExportRead(PathBuf),

    #[error("failed to parse export JSON: {0}")]
    ExportParse(String),

    #[error("failed to read download archive {path}: {message}")]
    LedgerRead { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to start {program}: {message}")]
    ProcessSpawn { program: String, message: String },

    #[error("{program} exited with {status}")]
    ProcessExit { program: String, status: String },

    #[error("error while reading downloader output: {0}")]
    ProcessIo(String),

    #[error("yt-dlp release request failed: {0}")]
    ToolHttp(String),

    #[error("yt-dlp release endpoint returned status {status}: {message}")]
    ToolStatus { status: u16, message: String },

    #[error("could not find {0} in the latest release assets")]
    ToolAssetMissing(String),

    #[error("invalid cookie file: {0}")]
    InvalidCookieFile(String),

    #[error("unsupported browser: {0} (valid options: chrome, firefox, edge, safari, opera, brave, chromium, vivaldi)")]
    UnsupportedBrowser(String),

    #[error("cannot use both --cookies and --cookies-from-browser")]
    ConflictingCookies,

    #[error("failed to write report {path}: {message}")]
    ReportWrite { path: PathBuf, message: String },

    #[error("failed to write index: {0}")]
    IndexWrite(String),
}
