use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Directory for output files (overrides DAILY_CRAWL_OUTPUT_DIR).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// JSON array of catalog rows; serves an in-memory catalog instead of the database.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Handler route file (overrides DAILY_CRAWL_ROUTES).
    #[arg(long)]
    routes: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    daily_crawl::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting daily-crawl-app");

    let mut config = daily_crawl::config::ServiceConfig::from_env().context("load config")?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if let Some(routes) = args.routes {
        config.routes_file = Some(routes);
    }
    tracing::info!(output_dir = %config.output_dir.display(), max_concurrent_jobs = config.max_concurrent_jobs, "configuration loaded");

    let manager = daily_crawl::app::bootstrap(&config, args.seed.as_deref()).await?;
    let app = daily_crawl::http::router(manager);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    Ok(())
}
