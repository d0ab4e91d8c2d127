use std::collections::HashMap;
use std::fmt;
use std::fs;

use camino::Utf8Path;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{ContentReference, FailureDetail};
use crate::error::ArchiveError;

pub const INDEX_JSON: &str = "index.json";
pub const INDEX_HTML: &str = "index.html";

const THUMBNAIL_EXTENSIONS: &[&str] = &[".jpg", ".webp", ".png", ".JPG", ".WEBP", ".PNG"];

/// The subset of a yt-dlp `.info.json` sidecar the index uses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub uploader_id: String,
    pub upload_date: String,
    pub description: String,
    pub duration: Option<f64>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub thumbnail: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexEntry {
    #[serde(flatten)]
    pub reference: ContentReference,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub creator: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub creator_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub upload_date: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumbnail_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_file: Option<String>,
    pub downloaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_error: Option<String>,
}

impl IndexEntry {
    fn bare(reference: &ContentReference) -> Self {
        Self {
            reference: reference.clone(),
            title: String::new(),
            creator: String::new(),
            creator_id: String::new(),
            upload_date: String::new(),
            description: String::new(),
            duration: None,
            view_count: None,
            like_count: None,
            thumbnail_url: String::new(),
            thumbnail_file: None,
            downloaded: false,
            local_filename: None,
            download_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionIndex {
    pub name: String,
    pub generated_at: String,
    pub total_videos: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub videos: Vec<IndexEntry>,
}

/// Reads every `*.info.json` in `dir`, keyed by video id. Unparseable
/// sidecars are logged and ignored.
pub fn scan_metadata(dir: &Utf8Path) -> Result<HashMap<String, VideoInfo>, ArchiveError> {
    let mut infos = HashMap::new();
    let entries = match fs::read_dir(dir.as_std_path()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(infos),
        Err(err) => return Err(ArchiveError::IndexWrite(format!("{dir}: {err}"))),
    };
    for entry in entries {
        let entry = entry.map_err(|err| ArchiveError::IndexWrite(err.to_string()))?;
        let path = entry.path();
        let is_info = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(".info.json"));
        if !is_info {
            continue;
        }
        let parsed = fs::read_to_string(&path)
            .map_err(|err| err.to_string())
            .and_then(|text| {
                serde_json::from_str::<VideoInfo>(&text).map_err(|err| err.to_string())
            });
        match parsed {
            Ok(info) if !info.id.is_empty() => {
                infos.insert(info.id.clone(), info);
            }
            Ok(_) => warn!(path = %path.display(), "metadata without an id"),
            Err(err) => warn!(path = %path.display(), "failed to parse metadata: {err}"),
        }
    }
    Ok(infos)
}

/// Joins references with downloaded metadata and failure messages.
pub fn build_index(
    dir: &Utf8Path,
    name: &str,
    refs: &[ContentReference],
    failures: &[FailureDetail],
    generated_at: DateTime<Local>,
) -> Result<CollectionIndex, ArchiveError> {
    let infos = scan_metadata(dir)?;
    info!(collection = name, metadata = infos.len(), "building index");
    let failure_messages: HashMap<&str, &str> = failures
        .iter()
        .filter(|failure| !failure.video_id.is_empty())
        .map(|failure| (failure.video_id.as_str(), failure.message.as_str()))
        .collect();

    let videos = refs
        .iter()
        .map(|reference| enrich(dir, reference, &infos, &failure_messages))
        .collect::<Vec<_>>();
    let downloaded = videos.iter().filter(|video| video.downloaded).count();

    Ok(CollectionIndex {
        name: name.to_string(),
        generated_at: generated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        total_videos: videos.len(),
        downloaded,
        failed: videos.len() - downloaded,
        videos,
    })
}

fn enrich(
    dir: &Utf8Path,
    reference: &ContentReference,
    infos: &HashMap<String, VideoInfo>,
    failure_messages: &HashMap<&str, &str>,
) -> IndexEntry {
    let mut entry = IndexEntry::bare(reference);
    if !reference.has_id() {
        warn!(link = %reference.link, "could not extract video id");
        entry.download_error = Some("Invalid URL format - could not extract video ID".to_string());
        return entry;
    }

    let Some(info) = infos.get(&reference.video_id) else {
        let message = failure_messages
            .get(reference.video_id.as_str())
            .copied()
            .unwrap_or("Video not downloaded or metadata unavailable");
        entry.download_error = Some(message.to_string());
        return entry;
    };

    entry.title = info.title.clone();
    entry.creator = info.uploader.clone();
    entry.creator_id = info.uploader_id.clone();
    entry.upload_date = info.upload_date.clone();
    entry.description = info.description.clone();
    entry.duration = info.duration.map(|secs| secs.max(0.0).round() as u64);
    entry.view_count = info.view_count;
    entry.like_count = info.like_count;
    entry.thumbnail_url = info.thumbnail.clone();

    let file_name = Utf8Path::new(&info.filename)
        .file_name()
        .map(str::to_string)
        .unwrap_or_default();
    if file_name.is_empty() {
        entry.download_error = Some("Metadata incomplete (missing filename)".to_string());
        return entry;
    }

    let video_path = dir.join(&file_name);
    if dir.join(format!("{file_name}.part")).exists() {
        entry.download_error = Some("Download incomplete (found .part file)".to_string());
    } else if video_path.exists() {
        entry.downloaded = true;
    } else {
        entry.download_error = Some("Video file missing (metadata only)".to_string());
    }

    let stem = Utf8Path::new(&file_name)
        .file_stem()
        .unwrap_or(file_name.as_str())
        .to_string();
    entry.thumbnail_file = THUMBNAIL_EXTENSIONS
        .iter()
        .map(|ext| format!("{stem}{ext}"))
        .find(|candidate| dir.join(candidate).exists());
    entry.local_filename = Some(file_name);
    entry
}

pub fn write_index(dir: &Utf8Path, index: &CollectionIndex) -> Result<(), ArchiveError> {
    fs::create_dir_all(dir.as_std_path())
        .map_err(|err| ArchiveError::IndexWrite(format!("{dir}: {err}")))?;
    let json = serde_json::to_vec_pretty(index)
        .map_err(|err| ArchiveError::IndexWrite(err.to_string()))?;
    fs::write(dir.join(INDEX_JSON).as_std_path(), json)
        .map_err(|err| ArchiveError::IndexWrite(format!("{INDEX_JSON}: {err}")))?;
    fs::write(dir.join(INDEX_HTML).as_std_path(), render_html(index))
        .map_err(|err| ArchiveError::IndexWrite(format!("{INDEX_HTML}: {err}")))
}

pub fn render_html(index: &CollectionIndex) -> String {
    let mut html = String::new();
    // Formatting into a String cannot fail.
    let _ = write_html(&mut html, index);
    html
}

fn write_html<W: fmt::Write>(out: &mut W, index: &CollectionIndex) -> fmt::Result {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(out, "<head>")?;
    writeln!(out, "<meta charset=\"utf-8\">")?;
    writeln!(out, "<title>{}</title>", escape_html(&index.name))?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>{}</h1>", escape_html(&index.name))?;
    writeln!(
        out,
        "<p>Generated {} &middot; {} videos &middot; {} downloaded &middot; {} failed</p>",
        escape_html(&index.generated_at),
        index.total_videos,
        index.downloaded,
        index.failed
    )?;
    writeln!(out, "<table>")?;
    writeln!(
        out,
        "<tr><th>Thumbnail</th><th>Title</th><th>Creator</th><th>Duration</th><th>Views</th><th>Likes</th><th>Status</th></tr>"
    )?;
    for video in &index.videos {
        write_row(out, video)?;
    }
    writeln!(out, "</table>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

fn write_row<W: fmt::Write>(out: &mut W, video: &IndexEntry) -> fmt::Result {
    let thumbnail = video
        .thumbnail_file
        .as_deref()
        .map(|file| format!("<img src=\"{}\" width=\"120\" alt=\"\">", escape_html(file)))
        .unwrap_or_default();
    let title = if video.title.is_empty() {
        video.reference.link.as_str()
    } else {
        video.title.as_str()
    };
    let target = video
        .local_filename
        .as_deref()
        .filter(|_| video.downloaded)
        .unwrap_or(video.reference.link.as_str());
    let status = match &video.download_error {
        Some(error) => escape_html(error),
        None if video.downloaded => "downloaded".to_string(),
        None => String::new(),
    };
    writeln!(
        out,
        "<tr><td>{thumbnail}</td><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{status}</td></tr>",
        escape_html(target),
        escape_html(title),
        escape_html(&video.creator),
        video.duration.map(format_clock).unwrap_or_default(),
        video.view_count.map(format_count).unwrap_or_default(),
        video.like_count.map(format_count).unwrap_or_default(),
    )
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// `m:ss`
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// `950`, `1.5K`, `2.3M`
pub fn format_count(count: i64) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
