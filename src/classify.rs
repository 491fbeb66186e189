//! Content-image classification for candidate URLs.
//!
//! The reader pages mix real page images with UI chrome, ad slots and
//! tracking pixels. Classification is a best-effort filter, not a validation
//! gate: rejects are dropped silently and never surface as errors.

/// Raster extensions a page image is allowed to end with (query ignored).
pub const CONTENT_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Substrings that mark a URL as a non-content asset.
const ASSET_DENYLIST: [&str; 4] = ["sprite", "logo", "favicon", "ads"];

/// Returns true when `url` plausibly serves one page of sequential content.
///
/// Total over arbitrary input: empty strings, malformed URLs and non-URL
/// garbage all classify as false rather than erroring.
pub fn is_content_image(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    let lower = url.to_lowercase();
    if ASSET_DENYLIST.iter().any(|marker| lower.contains(marker)) {
        return false;
    }

    let path = match lower.split_once('?') {
        Some((path, _query)) => path,
        None => lower.as_str(),
    };
    if CONTENT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }

    // Extension-free delivery happens on CDN and data-storage paths.
    lower.contains("/cdn/") || lower.contains("/data/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_raster_extensions_ignoring_query() {
        assert!(is_content_image("https://x.example/media/001.jpg"));
        assert!(is_content_image("https://x.example/media/001.webp?width=1920"));
        assert!(is_content_image("/relative/002.PNG"));
    }

    #[test]
    fn rejects_denylisted_assets() {
        assert!(!is_content_image("https://x.example/img/site-logo.png"));
        assert!(!is_content_image("https://x.example/favicon.ico"));
        assert!(!is_content_image("https://ads.example/banner.jpg"));
        assert!(!is_content_image("https://x.example/css/sprite.png"));
    }

    #[test]
    fn accepts_extensionless_cdn_and_data_paths() {
        assert!(is_content_image("https://x.example/cdn/87981023"));
        assert!(is_content_image("https://x.example/data/pages/12"));
        assert!(!is_content_image("https://x.example/pages/12"));
    }

    #[test]
    fn total_over_arbitrary_input() {
        assert!(!is_content_image(""));
        assert!(!is_content_image("not a url at all"));
        assert!(!is_content_image("https://"));
        assert!(!is_content_image("ht!tp://\u{fffd}??.jpg?"));
        // still a .jpg path even though the rest is garbage
        assert!(is_content_image("::::/x.jpg"));
    }
}
