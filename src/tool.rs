use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::ArchiveError;

pub const LATEST_RELEASE_URL: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";
pub const MAX_TOOL_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Finds and downloads yt-dlp release assets.
pub trait ToolFetcher {
    fn latest_asset_url(&self, asset_name: &str) -> Result<String, ArchiveError>;
    fn download(&self, url: &str, destination: &Path) -> Result<(), ArchiveError>;
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Clone)]
pub struct GithubToolFetcher {
    client: Client,
    release_url: String,
}

impl GithubToolFetcher {
    pub fn new() -> Result<Self, ArchiveError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!(
                "tiktok-favvideo-downloader/{}",
                env!("CARGO_PKG_VERSION")
            ))
            .map_err(|err| ArchiveError::ToolHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|err| ArchiveError::ToolHttp(err.to_string()))?;

        Ok(Self {
            client,
            release_url: LATEST_RELEASE_URL.to_string(),
        })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, ArchiveError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    if !resp.status().is_success() {
                        let message = resp
                            .text()
                            .unwrap_or_else(|_| "request failed".to_string());
                        return Err(ArchiveError::ToolStatus { status, message });
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && (err.is_timeout() || err.is_connect()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(ArchiveError::ToolHttp(err.to_string()));
                }
            }
        }
    }
}

impl ToolFetcher for GithubToolFetcher {
    fn latest_asset_url(&self, asset_name: &str) -> Result<String, ArchiveError> {
        let release: Release = self
            .send_with_retries(&self.release_url)?
            .json()
            .map_err(|err| ArchiveError::ToolHttp(err.to_string()))?;
        release
            .assets
            .into_iter()
            .find(|asset| asset.name.eq_ignore_ascii_case(asset_name))
            .map(|asset| asset.browser_download_url)
            .ok_or_else(|| ArchiveError::ToolAssetMissing(asset_name.to_string()))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), ArchiveError> {
        let mut response = self.send_with_retries(url)?;
        let parent = parent_dir(destination);
        let mut temp = tempfile::Builder::new()
            .prefix(".yt-dlp-download")
            .tempfile_in(parent)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        io::copy(&mut response, &mut temp)
            .map_err(|err| ArchiveError::ToolHttp(err.to_string()))?;
        temp.persist(destination)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        make_executable(destination)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|err| ArchiveError::Filesystem(err.to_string()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<(), ArchiveError> {
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Downloaded,
    Current,
    Updated,
    KeptStale,
    Restored,
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

pub fn is_stale(path: &Path, max_age: Duration) -> io::Result<bool> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age > max_age))
}

/// Makes sure a usable yt-dlp sits at `path`.
///
/// Missing: download it. Older than [`MAX_TOOL_AGE`]: ask `confirm_update`,
/// and on yes move the current binary to `<path>.old` before downloading.
/// A failed update puts the backup back.
pub fn ensure_tool<F>(
    fetcher: &F,
    path: &Path,
    confirm_update: &mut dyn FnMut() -> bool,
    sink: &dyn ProgressSink,
) -> Result<ToolStatus, ArchiveError>
where
    F: ToolFetcher + ?Sized,
{
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ArchiveError::Filesystem(format!("invalid tool path {}", path.display())))?;

    match fs::metadata(path) {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            notice(sink, format!("{name} not found. Downloading the latest release from GitHub..."));
            fetch_latest(fetcher, &name, path, sink)?;
            return Ok(ToolStatus::Downloaded);
        }
        Err(err) => {
            return Err(ArchiveError::Filesystem(format!(
                "error checking for existing {name}: {err}"
            )));
        }
    }

    let stale = match is_stale(path, MAX_TOOL_AGE) {
        Ok(stale) => stale,
        Err(err) => {
            warn!("could not check age of {name}: {err}");
            false
        }
    };
    if !stale {
        notice(sink, format!("Found {name}. Skipping download."));
        return Ok(ToolStatus::Current);
    }
    if !confirm_update() {
        notice(sink, format!("Continuing with existing {name}."));
        return Ok(ToolStatus::KeptStale);
    }

    let backup = backup_path(path);
    if backup.exists() {
        notice(sink, format!("Removing old backup file: {}", backup.display()));
        fs::remove_file(&backup).map_err(|err| {
            ArchiveError::Filesystem(format!("failed to delete {}: {err}", backup.display()))
        })?;
    }
    notice(sink, format!("Backing up current {name} to {}", backup.display()));
    fs::rename(path, &backup).map_err(|err| {
        ArchiveError::Filesystem(format!("failed to back up {name}: {err}"))
    })?;

    match fetch_latest(fetcher, &name, path, sink) {
        Ok(()) => Ok(ToolStatus::Updated),
        Err(err) => {
            warn!("download failed: {err}");
            fs::rename(&backup, path).map_err(|restore| {
                ArchiveError::Filesystem(format!(
                    "download failed and could not restore backup: {err} (restore error: {restore})"
                ))
            })?;
            notice(sink, "Backup restored. Continuing with existing version.".to_string());
            Ok(ToolStatus::Restored)
        }
    }
}

fn fetch_latest<F>(
    fetcher: &F,
    asset_name: &str,
    path: &Path,
    sink: &dyn ProgressSink,
) -> Result<(), ArchiveError>
where
    F: ToolFetcher + ?Sized,
{
    let url = fetcher.latest_asset_url(asset_name)?;
    debug!(%url, "resolved release asset");
    notice(sink, format!("Downloading {url}..."));
    fetcher.download(&url, path)?;
    notice(sink, "Successfully downloaded yt-dlp".to_string());
    Ok(())
}

fn notice(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}
