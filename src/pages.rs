//! One-per-page selection: collapses mirror URLs of the same logical page
//! and orders real pages ahead of lower-confidence stragglers.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Marker for UI chrome that slips past the classifier on extension alone.
const STATIC_ASSET_MARKER: &str = "/static-assets/";

/// Final path segment of a URL with any query stripped. Mirrors of the same
/// page share this key even when they sit on different CDN hosts.
pub fn basename_key(url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_owned(),
        // Not absolute; take everything before query/fragment.
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_owned(),
    };
    path.rsplit('/').next().unwrap_or("").to_owned()
}

/// Picks one URL per distinct basename, first observed wins, and returns
/// page-shaped representatives first.
///
/// First-seen document order is kept throughout. The numeric id embedded in
/// a page basename is not monotonic with true page order, so it is never
/// used for sorting.
pub fn select_one_per_page(urls: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut representatives: Vec<(String, &String)> = Vec::new();
    for url in urls {
        let basename = basename_key(url);
        if basename.is_empty() {
            continue;
        }
        if seen.insert(basename.clone()) {
            representatives.push((basename, url));
        }
    }

    let mut pages: Vec<String> = Vec::new();
    let mut others: Vec<String> = Vec::new();
    for (basename, url) in representatives {
        if url.contains(STATIC_ASSET_MARKER) {
            continue;
        }
        if page_basename_regex().is_match(&basename) {
            pages.push(url.clone());
        } else {
            others.push(url.clone());
        }
    }

    pages.extend(others);
    pages
}

/// Page images carry an id/width/height/size basename, e.g.
/// `87981023_1920_2735_569558.webp`.
fn page_basename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\d{7,9}_\d+_\d+_\d+\.(?:jpg|jpeg|png|webp)")
            .expect("page basename pattern")
    })
}
