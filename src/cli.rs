use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::app::model::{JobParams, SchedulerMode};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one crawl job to completion and print its result as JSON.
    Run(RunArgs),
    /// List the registered handler routes.
    Handlers(HandlersArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON array of catalog rows; crawls an in-memory catalog instead of the database.
    #[arg(long)]
    pub seed: Option<PathBuf>,

    /// Directory for the output file (overrides DAILY_CRAWL_OUTPUT_DIR).
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Handler route file (overrides DAILY_CRAWL_ROUTES).
    #[arg(long)]
    pub routes: Option<PathBuf>,

    /// Scheduler mode: sequential or parallel.
    #[arg(long, default_value = "parallel")]
    pub mode: SchedulerMode,

    /// Parallel worker count, clamped to 1..=10.
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    pub concurrency: i64,

    /// Maximum number of catalog rows (ignored with --id).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Catalog ids to crawl (repeatable or comma-separated).
    #[arg(long = "id", value_delimiter = ',')]
    pub ids: Vec<i64>,

    /// Skip rows whose last crawl succeeded.
    #[arg(long)]
    pub skip_succeeded: bool,

    /// Do not write menu links; output records get an empty docId.
    #[arg(long)]
    pub no_menu_links: bool,
}

impl RunArgs {
    pub fn params(&self) -> JobParams {
        JobParams {
            force_recrawl: !self.skip_succeeded,
            limit: self.limit,
            url_ids: self.ids.clone(),
            mode: self.mode,
            concurrency: self.concurrency,
            update_menu_links: !self.no_menu_links,
        }
    }
}

#[derive(Debug, Args)]
pub struct HandlersArgs {
    /// Handler route file (overrides DAILY_CRAWL_ROUTES).
    #[arg(long)]
    pub routes: Option<PathBuf>,
}
