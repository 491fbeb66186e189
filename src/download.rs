//! Chapter download orchestration: resolve, extract, download, assemble,
//! record.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use reqwest::blocking::Client;

use crate::chapters::{self, Chapter, SiteConfig, format_chapter_number};
use crate::cli::FetchArgs;
use crate::store::{self, DownloadRecord, DownloadStore};
use crate::{Error, Result, archive, extract, fetch, pages};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub out_dir: PathBuf,
    /// Assemble a CBZ per chapter; false saves raw images to a folder.
    pub make_archive: bool,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub delay: Duration,
}

/// `fetch` subcommand.
pub fn run(args: FetchArgs) -> anyhow::Result<()> {
    let client = fetch::client().context("build http client")?;
    let site = SiteConfig::with_base_url(args.base_url.as_deref());
    let store = DownloadStore::open(Path::new(&args.db)).context("open download store")?;
    let options = DownloadOptions {
        out_dir: PathBuf::from(&args.out),
        make_archive: !args.raw_images,
        limit: args.limit,
        dry_run: args.dry_run,
        delay: Duration::from_millis(args.delay_ms),
    };

    if let Some(number) = args.chapter {
        download_chapter(&client, &site, &store, &args.series, number, &options)?;
    } else if args.latest {
        let chapter = chapters::latest_chapter(&client, &site, &args.series)?;
        println!(
            "latest chapter: {} -> {}",
            chapter.display_name(),
            chapter.url(&site, &args.series)
        );
        download_chapter(&client, &site, &store, &args.series, chapter.number, &options)?;
    } else if let Some(from) = args.from {
        let saved =
            download_series_from(&client, &site, &store, &args.series, from, &options)?;
        println!("downloaded {} chapter(s)", saved.len());
    } else {
        // clap's selection group guarantees one of the three is set.
        anyhow::bail!("pass one of --chapter, --latest or --from");
    }
    Ok(())
}

/// Downloads one chapter by number and returns the artifact path.
///
/// Chapters the store already marks completed (or whose artifact already
/// exists non-trivially) are skipped. Dry-run prints the intended action
/// and fetches nothing beyond chapter resolution.
pub fn download_chapter(
    client: &Client,
    site: &SiteConfig,
    store: &DownloadStore,
    series: &str,
    number: f64,
    options: &DownloadOptions,
) -> Result<PathBuf> {
    let chapter = chapters::find_chapter(client, site, series, number)?;
    let chapter_url = chapter.url(site, series);
    let artifact = artifact_path(options, series, chapter.number);

    if options.dry_run {
        println!(
            "[dry-run] would fetch {chapter_url} -> {}",
            artifact.display()
        );
        if !store.was_completed(series, chapter.number)? {
            store.record(&record_for(
                series,
                &chapter,
                &chapter_url,
                &artifact,
                store::STATUS_DRY_RUN,
                None,
            ))?;
        }
        return Ok(artifact);
    }

    if store.was_completed(series, chapter.number)? {
        println!(
            "skipping {}; already recorded as completed",
            chapter.display_name()
        );
        return Ok(artifact);
    }
    if artifact_present(&artifact, options.make_archive) {
        println!(
            "skipping {}; artifact already exists: {}",
            chapter.display_name(),
            artifact.display()
        );
        store.record(&record_for(
            series,
            &chapter,
            &chapter_url,
            &artifact,
            store::STATUS_SKIPPED,
            artifact_size(&artifact),
        ))?;
        return Ok(artifact);
    }

    println!(
        "downloading {} -> {}",
        chapter.display_name(),
        artifact.display()
    );
    let outcome = if options.make_archive {
        archive_chapter(client, &chapter_url, &artifact, options)
    } else {
        save_raw_images(client, &chapter_url, &artifact, options)
    };

    match outcome {
        Ok(size) => {
            store.record(&record_for(
                series,
                &chapter,
                &chapter_url,
                &artifact,
                store::STATUS_COMPLETED,
                Some(size),
            ))?;
            Ok(artifact)
        }
        Err(err) => {
            store.record(&record_for(
                series,
                &chapter,
                &chapter_url,
                &artifact,
                store::STATUS_FAILED,
                None,
            ))?;
            Err(err)
        }
    }
}

/// Downloads every listed chapter from `from` through the latest.
///
/// Partial-failure semantics: one chapter's error is logged and recorded,
/// never fatal to the rest of the batch.
pub fn download_series_from(
    client: &Client,
    site: &SiteConfig,
    store: &DownloadStore,
    series: &str,
    from: f64,
    options: &DownloadOptions,
) -> Result<Vec<PathBuf>> {
    let listing = chapters::list_chapters(client, site, series)?;
    if listing.is_empty() {
        return Err(Error::EmptyListing {
            series: series.to_owned(),
        });
    }

    let start = chapters::find_chapter(client, site, series, from)?;
    let to_download: Vec<Chapter> = listing
        .into_iter()
        .filter(|c| c.number >= start.number)
        .collect();
    if to_download.is_empty() {
        tracing::warn!(series, from, "no listed chapters at or above start");
        return Ok(Vec::new());
    }

    let mut saved = Vec::new();
    let mut failures = 0usize;
    for chapter in &to_download {
        match download_chapter(client, site, store, series, chapter.number, options) {
            Ok(path) => saved.push(path),
            Err(err) => {
                failures += 1;
                tracing::error!(
                    series,
                    chapter = %format_chapter_number(chapter.number),
                    %err,
                    "chapter download failed; continuing"
                );
            }
        }
    }
    if failures > 0 {
        tracing::warn!(failures, total = to_download.len(), "batch finished with failures");
    }
    Ok(saved)
}

/// Selected one-per-page URLs for a chapter page, truncated to `limit`.
fn chapter_pages(client: &Client, chapter_url: &str, limit: Option<usize>) -> Result<Vec<String>> {
    let urls = extract::chapter_image_urls(client, chapter_url)?;
    if urls.is_empty() {
        return Err(Error::NoCandidates {
            url: chapter_url.to_owned(),
        });
    }
    let mut chosen = pages::select_one_per_page(&urls);
    if let Some(limit) = limit {
        chosen.truncate(limit);
    }
    Ok(chosen)
}

/// Downloads pages into a scratch dir and packs them into a CBZ. Returns
/// the archive size in bytes.
fn archive_chapter(
    client: &Client,
    chapter_url: &str,
    out_path: &Path,
    options: &DownloadOptions,
) -> Result<u64> {
    let chosen = chapter_pages(client, chapter_url, options.limit)?;

    let staging = tempfile::tempdir()?;
    let saved = fetch::download_images(
        client,
        &chosen,
        staging.path(),
        Some("page"),
        options.limit,
        options.delay,
    )?;
    if saved.is_empty() {
        return Err(Error::NoPagesDownloaded {
            url: chapter_url.to_owned(),
        });
    }

    archive::write_cbz(&saved, out_path)?;
    Ok(std::fs::metadata(out_path)?.len())
}

/// Downloads pages straight into the chapter folder. Returns total bytes.
fn save_raw_images(
    client: &Client,
    chapter_url: &str,
    out_dir: &Path,
    options: &DownloadOptions,
) -> Result<u64> {
    let chosen = chapter_pages(client, chapter_url, options.limit)?;
    let saved = fetch::download_images(
        client,
        &chosen,
        out_dir,
        Some("page"),
        options.limit,
        options.delay,
    )?;
    if saved.is_empty() {
        return Err(Error::NoPagesDownloaded {
            url: chapter_url.to_owned(),
        });
    }

    let mut total = 0u64;
    for path in &saved {
        total += std::fs::metadata(path)?.len();
    }
    Ok(total)
}

fn artifact_path(options: &DownloadOptions, series: &str, number: f64) -> PathBuf {
    let safe_series = series.replace('/', "_");
    let safe_number = format_chapter_number(number).replace('.', "_");
    let stem = format!("{safe_series}_ch_{safe_number}");
    if options.make_archive {
        options.out_dir.join(format!("{stem}.cbz"))
    } else {
        options.out_dir.join(stem)
    }
}

fn artifact_present(artifact: &Path, make_archive: bool) -> bool {
    if make_archive {
        // A tiny file is a previous failed write, not a chapter.
        artifact_size(artifact).is_some_and(|size| size > 1024)
    } else {
        std::fs::read_dir(artifact)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }
}

fn artifact_size(artifact: &Path) -> Option<u64> {
    std::fs::metadata(artifact).ok().map(|meta| meta.len())
}

fn record_for(
    series: &str,
    chapter: &Chapter,
    chapter_url: &str,
    artifact: &Path,
    status: &str,
    size: Option<u64>,
) -> DownloadRecord {
    DownloadRecord {
        series: series.to_owned(),
        chapter_num: chapter.number,
        chapter_id: Some(chapter.id.clone()),
        url: Some(chapter_url.to_owned()),
        out_path: artifact.to_string_lossy().into_owned(),
        status: status.to_owned(),
        size,
        downloaded_at: store::now_timestamp(),
    }
}
