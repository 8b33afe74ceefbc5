//! Progress computation and human-readable status text

use crate::core::fetcher::FetchProgress;

impl FetchProgress {
    /// `downloaded / total * 100`, using the size estimate when the exact total
    /// is unknown. `None` when no positive total is available.
    pub fn percent(&self) -> Option<f64> {
        let total = self
            .total_bytes
            .filter(|t| *t > 0)
            .or(self.total_bytes_estimate.filter(|t| *t > 0))?;
        let percent = self.downloaded_bytes as f64 / total as f64 * 100.0;
        Some(percent.clamp(0.0, 100.0))
    }
}

/// `"42.0% | 512.0 KB/s ETA: 12s"`
pub fn status_text(percent: f64, speed: Option<f64>, eta: Option<u64>) -> String {
    let speed = match speed {
        Some(bps) if bps > 0.0 => format!("{:.1} KB/s", bps / 1024.0),
        _ => "-- KB/s".to_string(),
    };
    let eta = match eta {
        Some(secs) if secs > 0 => format!(" ETA: {}s", secs),
        _ => String::new(),
    };
    format!("{:.1}% | {}{}", percent, speed, eta)
}

pub const PROCESSING_TEXT: &str = "Processing...";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_prefers_exact_total() {
        let mut progress = FetchProgress::downloading(250, Some(1000));
        progress.total_bytes_estimate = Some(500);
        assert_eq!(progress.percent(), Some(25.0));
    }

    #[test]
    fn test_percent_falls_back_to_estimate() {
        let mut progress = FetchProgress::downloading(250, None);
        progress.total_bytes_estimate = Some(500);
        assert_eq!(progress.percent(), Some(50.0));
    }

    #[test]
    fn test_percent_unknown_without_total() {
        assert_eq!(FetchProgress::downloading(250, None).percent(), None);
        assert_eq!(FetchProgress::downloading(250, Some(0)).percent(), None);
    }

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(FetchProgress::downloading(1500, Some(1000)).percent(), Some(100.0));
    }

    #[test]
    fn test_status_text_formats() {
        assert_eq!(
            status_text(42.0, Some(512.0 * 1024.0), Some(12)),
            "42.0% | 512.0 KB/s ETA: 12s"
        );
        assert_eq!(status_text(7.24, None, None), "7.2% | -- KB/s");
    }
}
