//! Candidate extraction: finds the ordered content-image URLs on a chapter
//! page.
//!
//! The primary pass walks `<img>` elements in document order and collects
//! every attribute that may carry the real source. Lazy-loading themes put a
//! placeholder in `src` and the image in a `data-*` attribute, so all
//! attribute values are considered, not the first match. A secondary pass
//! appends `<source>` alternates, and a text fallback scans script/JSON blobs
//! when the structural passes come up short.

use std::collections::HashSet;
use std::sync::OnceLock;

use anyhow::Context as _;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::cli::ImagesArgs;
use crate::{Error, Result, chapters, classify, fetch, pages};

/// Attributes checked on every `<img>`, lazy-load placeholders first.
const IMG_SRC_ATTRS: [&str; 6] = [
    "data-src",
    "data-lazy-src",
    "data-original",
    "data-srcset",
    "srcset",
    "src",
];

/// Attributes that occasionally hold the image on zoom-enabled readers.
const IMG_EXTRA_ATTRS: [&str; 2] = ["data-src-zoom", "data-image"];

/// Below this many structural candidates the text fallback kicks in.
const MIN_STRUCTURAL_CANDIDATES: usize = 5;

/// Path marker of the host's media storage; fallback candidates outside it
/// are only trusted when nothing else was found.
const MEDIA_PATH_MARKER: &str = "/media/";

/// Parses markup and returns ordered, distinct content-image URLs.
///
/// Relative candidates are resolved against `base_url` when given. Rejected
/// candidates are dropped silently; first occurrence wins order.
pub fn image_urls_from_html(html: &str, base_url: Option<&Url>) -> Vec<String> {
    let document = Html::parse_document(html);
    let img_selector = Selector::parse("img").expect("img selector");
    let source_selector = Selector::parse("source").expect("source selector");

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<String> = Vec::new();

    for img in document.select(&img_selector) {
        let mut raw_candidates: Vec<String> = Vec::new();

        for attr in IMG_SRC_ATTRS {
            let Some(value) = img.value().attr(attr) else {
                continue;
            };
            if attr.contains("srcset") || value.contains(',') {
                if let Some(first) = first_srcset_url(value) {
                    raw_candidates.push(first);
                }
            } else {
                raw_candidates.push(value.to_owned());
            }
        }
        for attr in IMG_EXTRA_ATTRS {
            if let Some(value) = img.value().attr(attr) {
                raw_candidates.push(value.to_owned());
            }
        }

        for raw in raw_candidates {
            push_candidate(&raw, base_url, &mut seen, &mut out);
        }
    }

    // <source> alternates inside <picture> containers. Appended after the
    // img pass: primary elements are trusted for page order, alternates are
    // a supplementary signal.
    for source in document.select(&source_selector) {
        let value = source
            .value()
            .attr("srcset")
            .or_else(|| source.value().attr("src"));
        let Some(value) = value else {
            continue;
        };
        let raw = if value.contains(',') {
            match first_srcset_url(value) {
                Some(first) => first,
                None => continue,
            }
        } else {
            value.to_owned()
        };
        push_candidate(&raw, base_url, &mut seen, &mut out);
    }

    out
}

/// Scans raw page text for URL-shaped image references inside scripts or
/// JSON blobs. Greedy matches pick up trailing punctuation, which is
/// stripped before normalization. Distinct, discovery order.
pub fn scan_text_for_image_urls(text: &str, base_url: Option<&Url>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for found in fallback_url_regex().find_iter(text) {
        let raw = found
            .as_str()
            .trim()
            .trim_end_matches([',', ';', '"', ')', '\'', ']']);
        let resolved = resolve_against_base(raw, base_url);
        if cleaned.iter().any(|c| c == &resolved) {
            continue;
        }
        cleaned.push(resolved);
    }
    cleaned
}

/// Merges fallback candidates into `urls`. A candidate is appended only when
/// it is new, classifies as content, and either sits on the media host or
/// the result set is still empty. Inline scripts reference plenty of
/// unrelated sprites; once any primary candidate exists the merge stays
/// conservative.
pub fn merge_fallback_candidates(urls: &mut Vec<String>, candidates: Vec<String>) {
    for candidate in candidates {
        if urls.iter().any(|u| u == &candidate) {
            continue;
        }
        if !classify::is_content_image(&candidate) {
            continue;
        }
        if candidate.contains(MEDIA_PATH_MARKER) || urls.is_empty() {
            urls.push(candidate);
        }
    }
}

/// Fetches a chapter page and returns its ordered image URLs, resolved
/// against the post-redirect page URL.
pub fn chapter_image_urls(client: &reqwest::blocking::Client, chapter_url: &str) -> Result<Vec<String>> {
    let page = fetch::fetch_page(client, chapter_url)?;
    let mut urls = image_urls_from_html(&page.body, Some(&page.final_url));

    if urls.len() < MIN_STRUCTURAL_CANDIDATES {
        tracing::debug!(
            count = urls.len(),
            url = chapter_url,
            "few structural candidates; scanning page text"
        );
        let candidates = scan_text_for_image_urls(&page.body, Some(&page.final_url));
        merge_fallback_candidates(&mut urls, candidates);
    }

    Ok(urls)
}

/// `images` subcommand: resolve a chapter page and print one URL per page.
pub fn run(args: ImagesArgs) -> anyhow::Result<()> {
    let client = fetch::client().context("build http client")?;
    let site = chapters::SiteConfig::with_base_url(args.base_url.as_deref());

    let chapter_url = match (&args.url, &args.series, args.chapter) {
        (Some(url), _, _) => url.clone(),
        (None, Some(series), Some(number)) => {
            let chapter = chapters::find_chapter(&client, &site, series, number)?;
            chapter.url(&site, series)
        }
        _ => anyhow::bail!("pass either --url or both --series and --chapter"),
    };

    tracing::info!(url = %chapter_url, "fetching chapter page");
    let urls = chapter_image_urls(&client, &chapter_url).context("extract image urls")?;
    if urls.is_empty() {
        return Err(Error::NoCandidates { url: chapter_url }.into());
    }

    for url in pages::select_one_per_page(&urls) {
        println!("{url}");
    }
    Ok(())
}

fn push_candidate(
    raw: &str,
    base_url: Option<&Url>,
    seen: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    let resolved = resolve_against_base(raw, base_url);
    let resolved = resolved.trim();
    if resolved.is_empty() || seen.contains(resolved) {
        return;
    }
    if classify::is_content_image(resolved) {
        seen.insert(resolved.to_owned());
        out.push(resolved.to_owned());
    }
}

fn resolve_against_base(raw: &str, base_url: Option<&Url>) -> String {
    let raw = raw.trim();
    match base_url {
        Some(base) => match base.join(raw) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => raw.to_owned(),
        },
        None => raw.to_owned(),
    }
}

/// First whitespace-delimited token of the first comma segment, as in a
/// srcset density/size descriptor list.
fn first_srcset_url(value: &str) -> Option<String> {
    let first_segment = value
        .split(',')
        .map(str::trim)
        .find(|segment| !segment.is_empty())?;
    first_segment
        .split_whitespace()
        .next()
        .map(|token| token.to_owned())
}

fn fallback_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)https?://[^\s"'<>()]+\.(?:jpg|jpeg|png|webp|gif)(?:\?[^\s"'<>)]*)?"#)
            .expect("fallback image url pattern")
    })
}
