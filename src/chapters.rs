//! Chapter discovery and resolution for the stacked-image host.
//!
//! The authoritative listing comes from the series page: a structured-data
//! block embedded in a script when present, canonical chapter hyperlinks
//! otherwise. A requested number missing from the listing falls back to a
//! bounded probe over the host's historical chapter-id allocation windows.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;

use anyhow::Context as _;
use regex::Regex;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::cli::ChaptersArgs;
use crate::error::NotFoundDiagnostics;
use crate::{Error, Result, fetch};

pub const DEFAULT_BASE_URL: &str = "https://bato.si";

/// Two listed numbers within this distance are the same chapter. Fractional
/// "half-chapters" are legitimate, so comparison is by tolerance, never
/// exact float equality.
pub const NUMBER_TOLERANCE: f64 = 0.01;

/// Host-specific knobs. The probe ranges mirror the host's observed id
/// allocation and go stale if that allocation shifts; they are configuration
/// here rather than literals in the resolver.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
    pub probe_ranges: Vec<Range<u64>>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            probe_ranges: vec![1_680_600..1_680_700, 3_255_000..3_255_200],
        }
    }
}

impl SiteConfig {
    pub fn with_base_url(base_url: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(base_url) = base_url {
            config.base_url = base_url.trim_end_matches('/').to_owned();
        }
        config
    }

    fn series_url(&self, series_id: &str) -> String {
        format!("{}/title/{}", self.base_url.trim_end_matches('/'), series_id)
    }
}

/// One addressable unit of content within a series. Constructed per
/// resolution call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    /// Opaque id token used to build the canonical address.
    pub id: String,
    pub number: f64,
    pub volume: Option<String>,
    pub title: Option<String>,
    pub lang: String,
}

impl Chapter {
    /// Canonical chapter address: `{base}/title/{series}/{id}-{vol_V_}ch_{N}`.
    pub fn url(&self, site: &SiteConfig, series_id: &str) -> String {
        let volume = match &self.volume {
            Some(volume) => format!("vol_{volume}_"),
            None => String::new(),
        };
        format!(
            "{}/title/{}/{}-{}ch_{}",
            site.base_url.trim_end_matches('/'),
            series_id,
            self.id,
            volume,
            format_chapter_number(self.number)
        )
    }

    pub fn display_name(&self) -> String {
        let mut parts = Vec::new();
        if let Some(volume) = &self.volume {
            parts.push(format!("Volume {volume}"));
        }
        parts.push(format!("Chapter {}", format_chapter_number(self.number)));
        if let Some(title) = &self.title {
            parts.push(format!("- {title}"));
        }
        parts.join(" ")
    }
}

/// Whole numbers render without a fraction; fractional chapters keep theirs.
pub fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

/// Fetches the series page and returns its chapters sorted ascending by
/// number. Always re-fetched; the listing is never cached.
pub fn list_chapters(client: &Client, site: &SiteConfig, series_id: &str) -> Result<Vec<Chapter>> {
    let page = fetch::fetch_page(client, &site.series_url(series_id))?;
    Ok(parse_chapter_listing(&page.body, series_id))
}

/// Latest chapter of the series, or `EmptyListing` when none parse.
pub fn latest_chapter(client: &Client, site: &SiteConfig, series_id: &str) -> Result<Chapter> {
    let chapters = list_chapters(client, site, series_id)?;
    chapters.into_iter().next_back().ok_or(Error::EmptyListing {
        series: series_id.to_owned(),
    })
}

/// Resolves `number` to a chapter.
///
/// Exact lookup against the listing first (within [`NUMBER_TOLERANCE`]).
/// A number past the end of the listing fails fast without probing, since a
/// not-yet-published chapter cannot exist. A gap inside the known range
/// triggers sequential existence probes over the configured id windows;
/// the first address that resolves wins.
pub fn find_chapter(
    client: &Client,
    site: &SiteConfig,
    series_id: &str,
    number: f64,
) -> Result<Chapter> {
    let chapters = list_chapters(client, site, series_id)?;

    if let Some(found) = find_in_listing(&chapters, number) {
        return Ok(found.clone());
    }

    let max_listed = chapters
        .iter()
        .map(|c| c.number)
        .fold(f64::NEG_INFINITY, f64::max);
    if !chapters.is_empty() && number > max_listed {
        return Err(Error::ChapterNotFound(not_found_diagnostics(
            series_id, number, &chapters,
        )));
    }

    for id in site.probe_ranges.iter().flat_map(Clone::clone) {
        let candidate = Chapter {
            id: id.to_string(),
            number,
            volume: Some(estimate_volume(number).to_string()),
            title: None,
            lang: "en".to_owned(),
        };
        let url = candidate.url(site, series_id);
        if fetch::probe_exists(client, &url) {
            tracing::debug!(id, url = %url, "probe resolved missing chapter");
            return Ok(candidate);
        }
    }

    Err(Error::ChapterNotFound(not_found_diagnostics(
        series_id, number, &chapters,
    )))
}

/// Exact lookup by numeric tolerance. Pure; shared by the resolver and its
/// tests.
pub fn find_in_listing(chapters: &[Chapter], number: f64) -> Option<&Chapter> {
    chapters
        .iter()
        .find(|c| (c.number - number).abs() < NUMBER_TOLERANCE)
}

/// Parses a series page into a sorted listing. Strategy 1 decodes the
/// embedded structured-data block; strategy 2 synthesizes chapters from
/// canonical hyperlinks when no block yields anything.
pub fn parse_chapter_listing(html: &str, series_id: &str) -> Vec<Chapter> {
    let mut chapters = parse_embedded_chapter_data(html);
    if chapters.is_empty() {
        chapters = parse_chapter_links(html, series_id);
    }
    chapters.sort_by(|a, b| a.number.total_cmp(&b.number));
    chapters
}

/// `chapters` subcommand: print the listing, ascending.
pub fn run(args: ChaptersArgs) -> anyhow::Result<()> {
    let client = fetch::client().context("build http client")?;
    let site = SiteConfig::with_base_url(args.base_url.as_deref());

    let chapters = list_chapters(&client, &site, &args.series)?;
    if chapters.is_empty() {
        return Err(Error::EmptyListing {
            series: args.series.clone(),
        }
        .into());
    }

    for chapter in &chapters {
        println!("{}\t{}\t{}", format_chapter_number(chapter.number), chapter.id, chapter.display_name());
    }
    Ok(())
}

fn estimate_volume(number: f64) -> u64 {
    // Rough estimate from the host's usual chapters-per-volume pacing.
    ((number / 4.0).floor().max(1.0)) as u64
}

fn not_found_diagnostics(series_id: &str, requested: f64, chapters: &[Chapter]) -> NotFoundDiagnostics {
    let mut available: Vec<f64> = chapters.iter().map(|c| c.number).collect();
    available.sort_by(f64::total_cmp);
    available.dedup();

    let closest = available
        .iter()
        .copied()
        .min_by(|a, b| (a - requested).abs().total_cmp(&(b - requested).abs()));
    let available_range = match (available.first(), available.last()) {
        (Some(low), Some(high)) => Some((*low, *high)),
        _ => None,
    };
    let nearby = available
        .iter()
        .copied()
        .filter(|n| (n - requested).abs() <= 5.0)
        .collect();

    NotFoundDiagnostics {
        series: series_id.to_owned(),
        requested,
        closest,
        available_range,
        nearby,
    }
}

fn parse_embedded_chapter_data(html: &str) -> Vec<Chapter> {
    let mut chapters = Vec::new();
    for assignment in data_assignment_regex().find_iter(html) {
        let rest = &html[assignment.end()..];
        let block = match rest.find("</script>") {
            Some(end) => &rest[..end],
            None => rest,
        };
        if !block.contains("\"chapters\"") {
            continue;
        }
        for caps in chapters_array_regex().captures_iter(block) {
            let Ok(value) = serde_json::from_str::<Value>(&caps[1]) else {
                continue;
            };
            let Some(items) = value.as_array() else {
                continue;
            };
            for item in items {
                if let Some(chapter) = chapter_from_json(item) {
                    chapters.push(chapter);
                }
            }
        }
    }
    chapters
}

/// One element of the embedded listing, before cleanup. Field types are
/// loose on purpose: the host serializes ids and numbers as either strings
/// or numbers depending on the page build.
#[derive(Debug, Deserialize)]
struct RawListedChapter {
    id: Option<Value>,
    number: Option<Value>,
    volume: Option<Value>,
    title: Option<Value>,
    lang: Option<Value>,
}

/// Decodes one listing element. Missing number defaults to 0; a malformed
/// number skips this element alone, never the whole parse.
fn chapter_from_json(item: &Value) -> Option<Chapter> {
    let raw: RawListedChapter = serde_json::from_value(item.clone()).ok()?;

    let id = match raw.id? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let number = match raw.number {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse().ok()?,
        Some(_) => return None,
    };
    let lang = match raw.lang {
        Some(Value::String(s)) if !s.is_empty() => s,
        _ => "en".to_owned(),
    };

    Some(Chapter {
        id,
        number,
        volume: non_empty_string(raw.volume),
        title: non_empty_string(raw.title),
        lang,
    })
}

fn non_empty_string(value: Option<Value>) -> Option<String> {
    let rendered = match value? {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if rendered.is_empty() { None } else { Some(rendered) }
}

fn parse_chapter_links(html: &str, series_id: &str) -> Vec<Chapter> {
    let pattern = format!(
        r"/title/{}/(\d+)-(?:vol_(\d+)_)?ch_([0-9.]+)",
        regex::escape(series_id)
    );
    let Ok(link_regex) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut chapters = Vec::new();
    for caps in link_regex.captures_iter(html) {
        let id = caps[1].to_owned();
        let Ok(number) = caps[3].parse::<f64>() else {
            continue;
        };
        if !seen_ids.insert(id.clone()) {
            continue;
        }
        chapters.push(Chapter {
            id,
            number,
            volume: caps.get(2).map(|m| m.as_str().to_owned()),
            title: None,
            lang: "en".to_owned(),
        });
    }
    chapters
}

fn data_assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"window\.__DATA__\s*=").expect("data assignment pattern"))
}

fn chapters_array_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""chapters"\s*:\s*(\[[^\]]+\])"#).expect("chapters array pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERIES: &str = "86663-en-grand-blue-dreaming-official";

    fn chapter(number: f64) -> Chapter {
        Chapter {
            id: format!("{}", 1_680_000 + (number * 10.0) as u64),
            number,
            volume: None,
            title: None,
            lang: "en".to_owned(),
        }
    }

    #[test]
    fn embedded_data_strategy_decodes_chapters() {
        let html = format!(
            r#"<html><head><script>window.__DATA__ = {{"series": "{SERIES}",
            "chapters": [
              {{"id": "1680643", "number": 45, "volume": "11", "title": "Deep Dive", "lang": "en"}},
              {{"id": 1680650, "number": "45.5"}},
              {{"id": "1680651", "number": "forty-six"}},
              {{"id": "1680652"}}
            ]}};</script></head></html>"#
        );
        let chapters = parse_chapter_listing(&html, SERIES);

        // The malformed "forty-six" element is skipped; the missing-number
        // element defaults to 0 and sorts first.
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].id, "1680652");
        assert_eq!(chapters[0].number, 0.0);
        assert_eq!(chapters[1].number, 45.0);
        assert_eq!(chapters[1].volume.as_deref(), Some("11"));
        assert_eq!(chapters[1].title.as_deref(), Some("Deep Dive"));
        assert_eq!(chapters[2].number, 45.5);
        assert_eq!(chapters[2].volume, None);
        assert_eq!(chapters[2].lang, "en");
    }

    #[test]
    fn link_scan_recovers_chapters_without_data_block() {
        let html = format!(
            r#"<div class="episodes">
              <a href="/title/{SERIES}/1680601-ch_1">Chapter 1</a>
              <a href="/title/{SERIES}/1680643-vol_11-ch_45">nope, wrong shape</a>
              <a href="/title/{SERIES}/1680643-vol_11_ch_45">Chapter 45</a>
              <a href="/title/{SERIES}/1680650-vol_11_ch_45.5">Chapter 45.5</a>
              <a href="/title/{SERIES}/1680650-vol_11_ch_45.5">duplicate link</a>
            </div>"#
        );
        let chapters = parse_chapter_listing(&html, SERIES);

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].number, 1.0);
        assert_eq!(chapters[0].volume, None);
        assert_eq!(chapters[1].number, 45.0);
        assert_eq!(chapters[1].volume.as_deref(), Some("11"));
        assert_eq!(chapters[2].number, 45.5);
    }

    #[test]
    fn tolerance_matches_rounded_numbers_but_not_distinct_fractions() {
        let listing = vec![chapter(45.0), chapter(45.02)];
        let found = find_in_listing(&listing, 45.00999).map(|c| c.number);
        assert_eq!(found, Some(45.0));
        // 45.02 is a distinct chapter, 0.02 away from 45.0.
        let found = find_in_listing(&listing, 45.02).map(|c| c.number);
        assert_eq!(found, Some(45.02));
        assert!(find_in_listing(&[chapter(45.0)], 45.02).is_none());
    }

    #[test]
    fn chapter_number_formatting_keeps_trailing_zero_integers() {
        assert_eq!(format_chapter_number(45.0), "45");
        assert_eq!(format_chapter_number(10.0), "10");
        assert_eq!(format_chapter_number(100.0), "100");
        assert_eq!(format_chapter_number(45.5), "45.5");
        assert_eq!(format_chapter_number(0.0), "0");
    }

    #[test]
    fn chapter_url_includes_volume_only_when_present() {
        let site = SiteConfig::default();
        let with_volume = Chapter {
            id: "1680643".to_owned(),
            number: 45.0,
            volume: Some("11".to_owned()),
            title: None,
            lang: "en".to_owned(),
        };
        assert_eq!(
            with_volume.url(&site, SERIES),
            format!("https://bato.si/title/{SERIES}/1680643-vol_11_ch_45")
        );

        let without_volume = Chapter {
            volume: None,
            number: 45.5,
            ..with_volume
        };
        assert_eq!(
            without_volume.url(&site, SERIES),
            format!("https://bato.si/title/{SERIES}/1680643-ch_45.5")
        );
    }

    #[test]
    fn display_name_combines_volume_number_title() {
        let full = Chapter {
            id: "1".to_owned(),
            number: 45.5,
            volume: Some("11".to_owned()),
            title: Some("Deep Dive".to_owned()),
            lang: "en".to_owned(),
        };
        assert_eq!(full.display_name(), "Volume 11 Chapter 45.5 - Deep Dive");

        let bare = Chapter {
            volume: None,
            title: None,
            ..full
        };
        assert_eq!(bare.display_name(), "Chapter 45.5");
    }

    #[test]
    fn diagnostics_cover_closest_range_and_nearby() {
        let listing = vec![chapter(1.0), chapter(2.0), chapter(44.0), chapter(45.0)];
        let diagnostics = not_found_diagnostics(SERIES, 43.0, &listing);
        assert_eq!(diagnostics.closest, Some(44.0));
        assert_eq!(diagnostics.available_range, Some((1.0, 45.0)));
        assert_eq!(diagnostics.nearby, vec![44.0, 45.0]);

        let rendered = crate::Error::ChapterNotFound(diagnostics).to_string();
        assert!(rendered.contains("chapter 43 not found"));
        assert!(rendered.contains("closest chapter: 44"));
        assert!(rendered.contains("available range: 1 - 45"));
        assert!(rendered.contains("nearby chapters: 44, 45"));
    }

    #[test]
    fn diagnostics_survive_an_empty_listing() {
        let diagnostics = not_found_diagnostics(SERIES, 43.0, &[]);
        assert_eq!(diagnostics.closest, None);
        assert_eq!(diagnostics.available_range, None);
        assert!(diagnostics.nearby.is_empty());
    }
}
