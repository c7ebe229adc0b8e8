//! YouTube URL helpers for trailer thumbnails.

use once_cell::sync::Lazy;
use regex_lite::Regex;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const THUMBNAIL_URL: &str = "https://img.youtube.com/vi";

static VIDEO_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[?&]v=|youtu\.be/|/embed/)([A-Za-z0-9_-]{6,})")
        .expect("video id pattern is valid")
});

/// Watch URL for a YouTube video key.
pub fn watch_url(key: &str) -> String {
    format!("{}{}", WATCH_URL, key)
}

/// Extract the video id from a watch, short or embed URL.
pub fn youtube_video_id(url: &str) -> Option<&str> {
    VIDEO_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Thumbnail URL for a trailer, if its video id can be found.
pub fn thumbnail_url(trailer_url: &str) -> Option<String> {
    youtube_video_id(trailer_url).map(|id| format!("{}/{}/0.jpg", THUMBNAIL_URL, id))
}
