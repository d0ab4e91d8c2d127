use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, TimeZone};
use serde_json::Value;

use tiktok_favvideo_downloader::domain::{ContentReference, FailureDetail, IdExtractor};
use tiktok_favvideo_downloader::failure::FailureCategory;
use tiktok_favvideo_downloader::index::{INDEX_HTML, INDEX_JSON, build_index, scan_metadata, write_index};

fn reference(link: &str) -> ContentReference {
    ContentReference::new(link, Some("2024-05-01".to_string()), "favorites", &IdExtractor::new())
}

fn write_info(dir: &Utf8Path, id: &str, filename: &str) {
    let info = serde_json::json!({
        "id": id,
        "title": format!("Video {id} <3"),
        "uploader": "Someone",
        "uploader_id": "someone",
        "upload_date": "20240501",
        "duration": 64.6,
        "view_count": 1500,
        "like_count": 12,
        "thumbnail": "https://p16.example/thumb.jpg",
        "filename": filename,
    });
    fs::write(
        dir.join(format!("20240501_{id}.info.json")),
        serde_json::to_string(&info).unwrap(),
    )
    .unwrap();
}

fn utf8_dir(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap()
}

#[test]
fn missing_directory_has_no_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp).join("nothing-here");
    assert!(scan_metadata(&dir).unwrap().is_empty());
}

#[test]
fn index_reflects_what_is_on_disk() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp);

    // 1: complete with thumbnail. 2: partial. 3: metadata only.
    // 4: failed. 5: never attempted. 6: bad link. 7: metadata without filename.
    write_info(&dir, "1", "20240501_1_Video.mp4");
    fs::write(dir.join("20240501_1_Video.mp4"), b"video").unwrap();
    fs::write(dir.join("20240501_1_Video.webp"), b"thumb").unwrap();
    write_info(&dir, "2", "20240501_2_Video.mp4");
    fs::write(dir.join("20240501_2_Video.mp4.part"), b"half").unwrap();
    write_info(&dir, "3", "20240501_3_Video.mp4");
    write_info(&dir, "7", "");
    fs::write(dir.join("broken.info.json"), "{not json").unwrap();

    let refs = vec![
        reference("https://www.tiktokv.com/share/video/1/"),
        reference("https://www.tiktokv.com/share/video/2/"),
        reference("https://www.tiktokv.com/share/video/3/"),
        reference("https://www.tiktokv.com/share/video/4/"),
        reference("https://www.tiktokv.com/share/video/5/"),
        reference("https://www.tiktok.com/@someone"),
        reference("https://www.tiktokv.com/share/video/7/"),
    ];
    let failures = vec![FailureDetail {
        video_id: "4".to_string(),
        video_url: refs[3].link.clone(),
        message: "Video not available, status code 10204".to_string(),
        category: FailureCategory::NotAvailable,
    }];
    let generated = Local.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

    let index = build_index(&dir, "favorites", &refs, &failures, generated).unwrap();
    assert_eq!(index.generated_at, "2025-01-02 03:04:05");
    assert_eq!((index.total_videos, index.downloaded, index.failed), (7, 1, 6));

    let first = &index.videos[0];
    assert!(first.downloaded);
    assert_eq!(first.title, "Video 1 <3");
    assert_eq!(first.duration, Some(65));
    assert_eq!(first.local_filename.as_deref(), Some("20240501_1_Video.mp4"));
    assert_eq!(first.thumbnail_file.as_deref(), Some("20240501_1_Video.webp"));
    assert_eq!(first.download_error, None);

    let errors = index
        .videos
        .iter()
        .skip(1)
        .map(|video| video.download_error.as_deref().unwrap_or(""))
        .collect::<Vec<_>>();
    assert_eq!(
        errors,
        vec![
            "Download incomplete (found .part file)",
            "Video file missing (metadata only)",
            "Video not available, status code 10204",
            "Video not downloaded or metadata unavailable",
            "Invalid URL format - could not extract video ID",
            "Metadata incomplete (missing filename)",
        ]
    );
}

#[test]
fn index_files_are_written() {
    let temp = tempfile::tempdir().unwrap();
    let dir = utf8_dir(&temp).join("liked");
    let refs = vec![reference("https://www.tiktokv.com/share/video/9/")];
    let index = build_index(&dir, "liked & more", &refs, &[], Local::now()).unwrap();

    write_index(&dir, &index).unwrap();

    let json: Value =
        serde_json::from_str(&fs::read_to_string(dir.join(INDEX_JSON)).unwrap()).unwrap();
    assert_eq!(json["name"], "liked & more");
    assert_eq!(json["total_videos"], 1);
    assert_eq!(json["videos"][0]["video_id"], "9");
    assert_eq!(json["videos"][0]["favorited_date"], "2024-05-01");
    assert_eq!(json["videos"][0]["downloaded"], false);
    assert!(json["videos"][0].get("title").is_none());

    let html = fs::read_to_string(dir.join(INDEX_HTML)).unwrap();
    assert!(html.contains("<title>liked &amp; more</title>"));
    assert!(html.contains("Video not downloaded or metadata unavailable"));
}
