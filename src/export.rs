use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::domain::{ContentReference, IdExtractor};
use crate::error::ArchiveError;

pub const FAVORITES: &str = "favorites";
pub const LIKED: &str = "liked";

#[derive(Debug, Default, Deserialize)]
pub struct ExportData {
    #[serde(rename = "Likes and Favorites", default)]
    pub activity: Activity,
}

#[derive(Debug, Default, Deserialize)]
pub struct Activity {
    #[serde(rename = "Favorite Videos", default)]
    pub favorite_videos: FavoriteVideos,
    #[serde(rename = "Like List", default)]
    pub like_list: LikeList,
}

#[derive(Debug, Default, Deserialize)]
pub struct FavoriteVideos {
    #[serde(rename = "FavoriteVideoList", default)]
    pub items: Vec<FavoriteItem>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteItem {
    #[serde(rename = "Link", default)]
    pub link: String,
    #[serde(rename = "Date", default)]
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LikeList {
    #[serde(rename = "ItemFavoriteList", default)]
    pub items: Vec<LikedItem>,
}

#[derive(Debug, Deserialize)]
pub struct LikedItem {
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub date: Option<String>,
}

pub fn read_export(
    path: &Path,
    include_liked: bool,
    ids: &IdExtractor,
) -> Result<Vec<ContentReference>, ArchiveError> {
    let content =
        fs::read_to_string(path).map_err(|_| ArchiveError::ExportRead(path.to_path_buf()))?;
    parse_export(&content, include_liked, ids)
}

/// Favorites always, liked videos only on request. Items without a link
/// are dropped.
pub fn parse_export(
    content: &str,
    include_liked: bool,
    ids: &IdExtractor,
) -> Result<Vec<ContentReference>, ArchiveError> {
    let data: ExportData =
        serde_json::from_str(content).map_err(|err| ArchiveError::ExportParse(err.to_string()))?;

    let favorites = data
        .activity
        .favorite_videos
        .items
        .into_iter()
        .map(|item| (item.link, item.date, FAVORITES));
    let liked = data
        .activity
        .like_list
        .items
        .into_iter()
        .filter(|_| include_liked)
        .map(|item| (item.link, item.date, LIKED));

    let mut refs = Vec::new();
    for (link, date, collection) in favorites.chain(liked) {
        let link = link.trim();
        if link.is_empty() {
            debug!(collection, "skipping export item without a link");
            continue;
        }
        refs.push(ContentReference::new(link, date, collection, ids));
    }
    Ok(refs)
}

pub fn sanitize_collection_name(name: &str) -> String {
    let replaced = name
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect::<String>();
    let trimmed = replaced.trim_matches([' ', '.']);
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Groups references by sanitized collection name, in first-seen order.
pub fn group_by_collection(refs: &[ContentReference]) -> Vec<(String, Vec<ContentReference>)> {
    let mut groups: Vec<(String, Vec<ContentReference>)> = Vec::new();
    for entry in refs {
        let name = sanitize_collection_name(&entry.collection);
        match groups.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, members)) => members.push(entry.clone()),
            None => groups.push((name, vec![entry.clone()])),
        }
    }
    groups
}

pub fn url_list_file_name(collection: &str) -> &'static str {
    if collection == LIKED {
        "liked_videos.txt"
    } else {
        "fav_videos.txt"
    }
}

pub fn write_url_list(path: &Path, refs: &[ContentReference]) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
    }
    let file = File::create(path)
        .map_err(|err| ArchiveError::Filesystem(format!("{}: {err}", path.display())))?;
    let mut writer = BufWriter::new(file);
    for entry in refs {
        writeln!(writer, "{}", entry.link)
            .map_err(|err| ArchiveError::Filesystem(format!("{}: {err}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|err| ArchiveError::Filesystem(format!("{}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_reserved_characters() {
        assert_eq!(sanitize_collection_name("a<b>c:d\"e/f\\g|h?i*j"), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_collection_name("  .hidden. "), "hidden");
        assert_eq!(sanitize_collection_name(" .. "), "unknown");
        assert_eq!(sanitize_collection_name("favorites"), "favorites");
    }

    #[test]
    fn list_file_names() {
        assert_eq!(url_list_file_name("liked"), "liked_videos.txt");
        assert_eq!(url_list_file_name("favorites"), "fav_videos.txt");
        assert_eq!(url_list_file_name("anything"), "fav_videos.txt");
    }
}
