//! SQLite bookkeeping for downloaded chapters.
//!
//! The store is an explicit handle constructed once at process start and
//! passed down; no module-level path state. Concurrent writers on the same
//! (series, chapter number) key serialize through the keyed upsert.

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::Result;
use crate::chapters::format_chapter_number;
use crate::cli::HistoryArgs;

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_SKIPPED: &str = "skipped";
pub const STATUS_DRY_RUN: &str = "dry-run";

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub series: String,
    pub chapter_num: f64,
    pub chapter_id: Option<String>,
    pub url: Option<String>,
    pub out_path: String,
    pub status: String,
    pub size: Option<u64>,
    pub downloaded_at: String,
}

#[derive(Debug)]
pub struct DownloadStore {
    conn: Connection,
}

impl DownloadStore {
    /// Opens (creating if needed) the store at `path`; parent directories
    /// are created as well.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS downloads (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  series TEXT NOT NULL,
  chapter_num REAL NOT NULL,
  chapter_id TEXT,
  url TEXT,
  out_path TEXT,
  status TEXT,
  size INTEGER,
  downloaded_at TEXT,
  UNIQUE(series, chapter_num)
);
"#,
        )?;

        Ok(Self { conn })
    }

    /// Inserts or replaces the record for (series, chapter number).
    pub fn record(&self, record: &DownloadRecord) -> Result<()> {
        self.conn.execute(
            r#"
INSERT INTO downloads (series, chapter_num, chapter_id, url, out_path, status, size, downloaded_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT(series, chapter_num) DO UPDATE SET
  chapter_id = excluded.chapter_id,
  url = excluded.url,
  out_path = excluded.out_path,
  status = excluded.status,
  size = excluded.size,
  downloaded_at = excluded.downloaded_at
"#,
            params![
                record.series,
                record.chapter_num,
                record.chapter_id,
                record.url,
                record.out_path,
                record.status,
                record.size,
                record.downloaded_at,
            ],
        )?;
        Ok(())
    }

    /// True when the chapter completed with a nonzero artifact size.
    pub fn was_completed(&self, series: &str, chapter_num: f64) -> Result<bool> {
        let row: Option<(String, Option<u64>)> = self
            .conn
            .query_row(
                "SELECT status, size FROM downloads WHERE series = ?1 AND chapter_num = ?2 LIMIT 1",
                params![series, chapter_num],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((status, size)) => {
                status == STATUS_COMPLETED && size.is_some_and(|size| size > 0)
            }
            None => false,
        })
    }

    /// All records, optionally restricted to one series, ordered by
    /// (series, chapter number).
    pub fn list(&self, series: Option<&str>) -> Result<Vec<DownloadRecord>> {
        let (sql, filter) = match series {
            Some(series) => (
                "SELECT series, chapter_num, chapter_id, url, out_path, status, size, downloaded_at
                 FROM downloads WHERE series = ?1 ORDER BY chapter_num",
                Some(series),
            ),
            None => (
                "SELECT series, chapter_num, chapter_id, url, out_path, status, size, downloaded_at
                 FROM downloads ORDER BY series, chapter_num",
                None,
            ),
        };

        let mut stmt = self.conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(DownloadRecord {
                series: row.get(0)?,
                chapter_num: row.get(1)?,
                chapter_id: row.get(2)?,
                url: row.get(3)?,
                out_path: row.get(4)?,
                status: row.get(5)?,
                size: row.get(6)?,
                downloaded_at: row.get(7)?,
            })
        };

        let rows = match filter {
            Some(series) => stmt.query_map(params![series], map_row)?,
            None => stmt.query_map([], map_row)?,
        };

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// `history` subcommand: print bookkeeping rows.
pub fn run(args: HistoryArgs) -> anyhow::Result<()> {
    let store = DownloadStore::open(Path::new(&args.db)).context("open download store")?;
    for record in store.list(args.series.as_deref())? {
        let size = record
            .size
            .map(|size| size.to_string())
            .unwrap_or_else(|| "-".to_owned());
        println!(
            "{}\tch {}\t{}\t{} bytes\t{}\t{}",
            record.series,
            format_chapter_number(record.chapter_num),
            record.status,
            size,
            record.downloaded_at,
            record.out_path,
        );
    }
    Ok(())
}
