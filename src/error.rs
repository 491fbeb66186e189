use std::fmt;

use thiserror::Error;

use crate::chapters::format_chapter_number;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    ChapterNotFound(NotFoundDiagnostics),

    #[error("no chapters found for series {series}")]
    EmptyListing { series: String },

    #[error("no content image urls found at {url}")]
    NoCandidates { url: String },

    #[error("no pages could be downloaded from {url}")]
    NoPagesDownloaded { url: String },

    #[error("none of the downloaded pages could be decoded as images")]
    NoPagesDecoded,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// What the resolver knew when it gave up on a chapter number. Callers are
/// expected to branch on this rather than re-derive it from the message.
#[derive(Debug, Clone, PartialEq)]
pub struct NotFoundDiagnostics {
    pub series: String,
    pub requested: f64,
    /// Listed number closest to the request by absolute distance.
    pub closest: Option<f64>,
    /// Lowest and highest listed numbers.
    pub available_range: Option<(f64, f64)>,
    /// Listed numbers within 5 chapters of the request, ascending.
    pub nearby: Vec<f64>,
}

impl fmt::Display for NotFoundDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chapter {} not found for series {}",
            format_chapter_number(self.requested),
            self.series
        )?;
        if let Some(closest) = self.closest {
            write!(f, "; closest chapter: {}", format_chapter_number(closest))?;
        }
        if let Some((low, high)) = self.available_range {
            write!(
                f,
                "; available range: {} - {}",
                format_chapter_number(low),
                format_chapter_number(high)
            )?;
        }
        if !self.nearby.is_empty() {
            let nearby = self
                .nearby
                .iter()
                .map(|n| format_chapter_number(*n))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "; nearby chapters: {nearby}")?;
        }
        Ok(())
    }
}
