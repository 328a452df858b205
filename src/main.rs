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
    daily_crawl::logging::init().context("init logging")?;

    let cli = daily_crawl::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        daily_crawl::cli::Command::Run(args) => {
            daily_crawl::commands::run(args).await.context("run")?;
        }
        daily_crawl::cli::Command::Handlers(args) => {
            daily_crawl::commands::handlers(args).context("handlers")?;
        }
    }

    Ok(())
}
