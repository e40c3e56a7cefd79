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
    comicbundle::logging::init().context("init logging")?;

    let cli = comicbundle::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        comicbundle::cli::Command::Chapters(args) => {
            comicbundle::chapters::run(args).await.context("chapters")?;
        }
        comicbundle::cli::Command::Download(args) => {
            comicbundle::download::run(args).await.context("download")?;
        }
    }

    Ok(())
}
