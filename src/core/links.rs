//! YouTube link extraction from free-form text (pasted chat logs, notes, HTML)

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static YOUTUBE_URL: OnceLock<Option<Regex>> = OnceLock::new();

fn youtube_url_regex() -> Option<&'static Regex> {
    YOUTUBE_URL
        .get_or_init(|| {
            let patterns = [
                r#"https?://(?:www\.)?youtube\.com/watch\?[^\s<>"']+"#,
                r#"https?://youtu\.be/[a-zA-Z0-9_-]+(?:\?[^\s<>"']*)?"#,
                r#"https?://(?:www\.)?youtube\.com/playlist\?[^\s<>"']+"#,
                r#"https?://(?:www\.)?youtube\.com/shorts/[a-zA-Z0-9_-]+"#,
                r#"https?://(?:www\.)?youtube\.com/@[^\s<>"'/]+"#,
                r#"https?://(?:www\.)?youtube\.com/channel/[^\s<>"']+"#,
                r#"https?://(?:www\.)?youtube\.com/c/[^\s<>"']+"#,
                r#"https?://music\.youtube\.com/watch\?[^\s<>"']+"#,
            ];
            Regex::new(&format!("(?i)(?:{})", patterns.join("|"))).ok()
        })
        .as_ref()
}

/// Every YouTube video, playlist, shorts, channel and music link in `text`,
/// in order of appearance, trailing punctuation removed, duplicates dropped.
pub fn extract_youtube_urls(text: &str) -> Vec<String> {
    let Some(re) = youtube_url_regex() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    re.find_iter(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
