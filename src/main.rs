use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    batodl::logging::init().context("init logging")?;

    let cli = batodl::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        batodl::cli::Command::Fetch(args) => {
            batodl::download::run(args).context("fetch")?;
        }
        batodl::cli::Command::Images(args) => {
            batodl::extract::run(args).context("images")?;
        }
        batodl::cli::Command::Chapters(args) => {
            batodl::chapters::run(args).context("chapters")?;
        }
        batodl::cli::Command::History(args) => {
            batodl::store::run(args).context("history")?;
        }
    }

    Ok(())
}
