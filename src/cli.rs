use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve a chapter and download it (archive or raw images).
    Fetch(FetchArgs),
    /// Print the selected one-per-page image URLs for a chapter.
    Images(ImagesArgs),
    /// Print a series' chapter listing, ascending by number.
    Chapters(ChaptersArgs),
    /// Print recorded download history.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("selection").required(true).multiple(false)))]
pub struct FetchArgs {
    /// Series ID slug (e.g. 86663-en-grand-blue-dreaming-official).
    #[arg(long)]
    pub series: String,

    /// Chapter number to download (fractional allowed, e.g. 45.5).
    #[arg(long, group = "selection")]
    pub chapter: Option<f64>,

    /// Download the latest available chapter.
    #[arg(long, group = "selection")]
    pub latest: bool,

    /// Download from this chapter number through the latest.
    #[arg(long, group = "selection")]
    pub from: Option<f64>,

    /// Output directory for chapter artifacts.
    #[arg(long, default_value = "downloads")]
    pub out: String,

    /// Save raw images into a per-chapter folder instead of a CBZ archive.
    #[arg(long)]
    pub raw_images: bool,

    /// Limit the number of pages fetched per chapter.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Print intended actions without fetching pages.
    #[arg(long)]
    pub dry_run: bool,

    /// Download history database path.
    #[arg(long, default_value = "downloads/batodl.sqlite")]
    pub db: String,

    /// Site base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Delay before each page download (politeness).
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).multiple(false)))]
pub struct ImagesArgs {
    /// Direct chapter URL to scrape.
    #[arg(long, group = "target")]
    pub url: Option<String>,

    /// Series ID slug; requires --chapter.
    #[arg(long, group = "target", requires = "chapter")]
    pub series: Option<String>,

    /// Chapter number to resolve within --series.
    #[arg(long)]
    pub chapter: Option<f64>,

    /// Site base URL.
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct ChaptersArgs {
    /// Series ID slug.
    #[arg(long)]
    pub series: String,

    /// Site base URL.
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Restrict to one series.
    #[arg(long)]
    pub series: Option<String>,

    /// Download history database path.
    #[arg(long, default_value = "downloads/batodl.sqlite")]
    pub db: String,
}
