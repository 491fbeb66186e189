//! Blocking HTTP collaborator: page fetches, existence probes, and the
//! image download loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use url::Url;

use crate::{Result, pages};

/// Desktop browser agent; the host serves a degraded shell to unknown ones.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36";

const PAGE_TIMEOUT: Duration = Duration::from_secs(20);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn client() -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(PAGE_TIMEOUT)
        .redirect(Policy::limited(10))
        .build()?;
    Ok(client)
}

#[derive(Debug)]
pub struct FetchedPage {
    /// Post-redirect URL; relative candidates resolve against this, not the
    /// URL that was requested.
    pub final_url: Url,
    pub body: String,
}

pub fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage> {
    let response = client.get(url).send()?.error_for_status()?;
    let final_url = response.url().clone();
    let body = response.text()?;
    Ok(FetchedPage { final_url, body })
}

/// Lightweight existence check: redirects followed, body never read.
/// Best-effort; any transport failure reads as "does not exist".
pub fn probe_exists(client: &Client, url: &str) -> bool {
    match client.head(url).timeout(PROBE_TIMEOUT).send() {
        Ok(response) => response.status().is_success(),
        Err(err) => {
            tracing::debug!(url, %err, "existence probe failed");
            false
        }
    }
}

/// Downloads `urls` into `out_dir` and returns the saved paths, in order.
///
/// Filenames keep the URL basename where possible, prefixed when asked, and
/// get a numeric suffix on collision. A failed item is logged and skipped;
/// it never aborts the loop.
pub fn download_images(
    client: &Client,
    urls: &[String],
    out_dir: &Path,
    prefix: Option<&str>,
    limit: Option<usize>,
    delay: Duration,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    let mut saved = Vec::new();
    for (index, url) in urls.iter().enumerate() {
        if limit.is_some_and(|limit| saved.len() >= limit) {
            break;
        }

        let bytes = match fetch_bytes(client, url) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(url, %err, "failed to download image");
                continue;
            }
        };

        let mut filename = pages::basename_key(url);
        if filename.is_empty() {
            filename = format!("page_{}.jpg", index + 1);
        }
        if let Some(prefix) = prefix {
            filename = format!("{prefix}_{filename}");
        }

        let out_path = collision_free_path(out_dir.join(filename));
        std::fs::write(&out_path, &bytes)?;
        saved.push(out_path);

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    Ok(saved)
}

fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send()?.error_for_status()?;
    Ok(response.bytes()?.to_vec())
}

/// Appends `_1`, `_2`, ... before the extension until the path is free.
fn collision_free_path(candidate: PathBuf) -> PathBuf {
    if !candidate.exists() {
        return candidate;
    }

    let stem = candidate
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page")
        .to_owned();
    let extension = candidate
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let parent = candidate
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let mut attempt = 1u32;
    loop {
        let next = parent.join(format!("{stem}_{attempt}{extension}"));
        if !next.exists() {
            return next;
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collision_suffixes_count_upwards() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("001.webp");

        assert_eq!(collision_free_path(path.clone()), path);

        std::fs::write(&path, b"first").expect("write first");
        assert_eq!(collision_free_path(path.clone()), dir.path().join("001_1.webp"));

        std::fs::write(dir.path().join("001_1.webp"), b"second").expect("write second");
        assert_eq!(collision_free_path(path.clone()), dir.path().join("001_2.webp"));
    }
}
