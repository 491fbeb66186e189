use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use batodl::chapters::{self, SiteConfig};
use batodl::{Error, fetch};

const SERIES: &str = "86663-en-test-series";

/// Spawns a fixture server that records (method, path) for every request.
/// Unknown chapter addresses get 404; the one address in `existing_chapter`
/// resolves, which is what the probing fallback looks for.
fn spawn_series_server(
    listing_html: String,
    existing_chapter: Option<String>,
) -> (
    String,
    Arc<Mutex<Vec<(String, String)>>>,
    mpsc::Sender<()>,
    thread::JoinHandle<()>,
) {
    let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
    let addr = server.server_addr();
    let base_url = format!("http://{addr}");

    let log: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let log_handle = Arc::clone(&log);
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let listing_path = format!("/title/{SERIES}");
    let handle = thread::spawn(move || {
        loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }

            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let method = request.method().to_string();
            let path = request.url().to_string();
            log_handle
                .lock()
                .expect("request log lock")
                .push((method, path.clone()));

            let response = if path == listing_path {
                tiny_http::Response::from_string(listing_html.clone())
            } else if existing_chapter.as_deref() == Some(path.as_str()) {
                tiny_http::Response::from_string("ok")
            } else {
                tiny_http::Response::from_string("not found").with_status_code(404)
            };
            let _ = request.respond(response);
        }
    });

    (base_url, log, shutdown_tx, handle)
}

fn listing_with_chapters(numbers: &[&str]) -> String {
    let links = numbers
        .iter()
        .enumerate()
        .map(|(i, number)| {
            format!(
                r#"<a href="/title/{SERIES}/{}-ch_{number}">Chapter {number}</a>"#,
                1_680_601 + i
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("<html><body><div class=\"episodes\">{links}</div></body></html>")
}

fn site_for(base_url: &str, probe_ranges: Vec<std::ops::Range<u64>>) -> SiteConfig {
    SiteConfig {
        base_url: base_url.to_owned(),
        probe_ranges,
    }
}

#[test]
fn listing_recovered_from_hyperlinks_over_http() {
    let (base_url, _log, shutdown, handle) =
        spawn_series_server(listing_with_chapters(&["1", "45", "45.5"]), None);
    let client = fetch::client().expect("client");
    let site = site_for(&base_url, vec![]);

    let chapters = chapters::list_chapters(&client, &site, SERIES).expect("list chapters");
    let numbers: Vec<f64> = chapters.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![1.0, 45.0, 45.5]);

    let _ = shutdown.send(());
    let _ = handle.join();
}

#[test]
fn future_chapter_fails_fast_without_probing() {
    let (base_url, log, shutdown, handle) =
        spawn_series_server(listing_with_chapters(&["1", "44", "45"]), None);
    let client = fetch::client().expect("client");
    // Probe ranges are configured; fail-fast must not touch them.
    let site = site_for(&base_url, vec![500..600]);

    let err = chapters::find_chapter(&client, &site, SERIES, 999.0)
        .expect_err("future chapter cannot resolve");
    match err {
        Error::ChapterNotFound(diagnostics) => {
            assert_eq!(diagnostics.requested, 999.0);
            assert_eq!(diagnostics.closest, Some(45.0));
            assert_eq!(diagnostics.available_range, Some((1.0, 45.0)));
            assert!(diagnostics.nearby.is_empty());
        }
        other => panic!("expected ChapterNotFound, got: {other:?}"),
    }

    // Exactly one request: the listing fetch. Zero existence probes.
    let requests = log.lock().expect("request log lock");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, "GET");
    assert_eq!(requests[0].1, format!("/title/{SERIES}"));

    drop(requests);
    let _ = shutdown.send(());
    let _ = handle.join();
}

#[test]
fn listing_gap_is_recovered_by_sequential_probing() {
    // Chapter 2 is missing from the listing but sits inside the known
    // range, so the resolver probes the configured id windows.
    let existing = format!("/title/{SERIES}/501-vol_1_ch_2");
    let (base_url, log, shutdown, handle) =
        spawn_series_server(listing_with_chapters(&["1", "45"]), Some(existing));
    let client = fetch::client().expect("client");
    let site = site_for(&base_url, vec![500..503]);

    let chapter = chapters::find_chapter(&client, &site, SERIES, 2.0).expect("probe resolves");
    assert_eq!(chapter.id, "501");
    assert_eq!(chapter.number, 2.0);
    assert_eq!(chapter.volume.as_deref(), Some("1"));

    let requests = log.lock().expect("request log lock");
    // Listing fetch, failed probe of id 500, successful probe of id 501.
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].0, "HEAD");
    assert_eq!(requests[1].1, format!("/title/{SERIES}/500-vol_1_ch_2"));
    assert_eq!(requests[2].0, "HEAD");
    assert_eq!(requests[2].1, format!("/title/{SERIES}/501-vol_1_ch_2"));

    drop(requests);
    let _ = shutdown.send(());
    let _ = handle.join();
}

#[test]
fn exhausted_probing_reports_diagnostics() {
    let (base_url, log, shutdown, handle) =
        spawn_series_server(listing_with_chapters(&["1", "2", "44", "45"]), None);
    let client = fetch::client().expect("client");
    let site = site_for(&base_url, vec![500..502]);

    let err = chapters::find_chapter(&client, &site, SERIES, 43.0)
        .expect_err("gap chapter with no live address");
    match err {
        Error::ChapterNotFound(diagnostics) => {
            assert_eq!(diagnostics.closest, Some(44.0));
            assert_eq!(diagnostics.available_range, Some((1.0, 45.0)));
            assert_eq!(diagnostics.nearby, vec![44.0, 45.0]);
        }
        other => panic!("expected ChapterNotFound, got: {other:?}"),
    }

    // Listing fetch plus one probe per configured id.
    let requests = log.lock().expect("request log lock");
    assert_eq!(requests.len(), 3);

    drop(requests);
    let _ = shutdown.send(());
    let _ = handle.join();
}
