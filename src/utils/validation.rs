//! URL and input validation utilities

use anyhow::{anyhow, Result};
use url::Url;

/// Validate URL syntax
pub fn validate_url(url: &str) -> Result<Url> {
    Url::parse(url.trim()).map_err(|e| anyhow!("Invalid URL format: {}", e))
}

/// Check if URL is a valid http(s) link the fetch tool can be pointed at
pub fn is_valid_video_url(url: &str) -> bool {
    match validate_url(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            (scheme == "http" || scheme == "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_url_validation() {
        assert!(is_valid_video_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_valid_video_url("  http://youtu.be/dQw4w9WgXcQ "));
        assert!(!is_valid_video_url("ftp://example.com/video"));
        assert!(!is_valid_video_url("not a url"));
        assert!(!is_valid_video_url(""));
    }
}
