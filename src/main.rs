use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    legacysite::logging::init().context("init logging")?;

    let cli = legacysite::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        legacysite::cli::Command::Resolve(args) => {
            legacysite::resolve::run(args).await.context("resolve")?;
        }
        legacysite::cli::Command::Check(args) => {
            legacysite::check::run(args).context("check")?;
        }
        legacysite::cli::Command::ExportCms(args) => {
            legacysite::export::run(args).context("export-cms")?;
        }
    }

    Ok(())
}
