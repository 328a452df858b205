pub mod dispatcher;
pub mod events;
pub mod manager;
pub mod model;
pub mod queue;
pub mod runner;
pub mod scheduler;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use sqlx::postgres::PgPoolOptions;

use crate::app::dispatcher::ItemDispatcher;
use crate::app::manager::JobManager;
use crate::app::runner::CrawlContext;
use crate::catalog::{InputUrlRepository, MemoryInputUrlRepository, PgInputUrlRepository};
use crate::config::ServiceConfig;
use crate::fetch::HttpFetcher;
use crate::handlers::{HandlerRegistry, load_routes};
use crate::menu_links::{MemoryMenuLinkRepository, MenuLinkRepository, PgMenuLinkRepository};
use crate::preprocess::Preprocessor;
use crate::record::MobileUrlRule;
use crate::sink::JsonSink;

/// Wires a [`JobManager`] from configuration.
///
/// A `seed` file selects in-memory repositories over the database; with
/// neither, the catalog starts empty.
pub async fn bootstrap(config: &ServiceConfig, seed: Option<&Path>) -> anyhow::Result<Arc<JobManager>> {
    let registry = match &config.routes_file {
        Some(path) => load_routes(path).context("load handler routes")?,
        None => HandlerRegistry::new(),
    };
    tracing::info!(handlers = registry.len(), "handler registry ready");

    let (inputs, menu_links): (Arc<dyn InputUrlRepository>, Arc<dyn MenuLinkRepository>) =
        match (seed, &config.database_url) {
            (Some(seed), _) => {
                tracing::info!(seed = %seed.display(), "using seeded in-memory catalog");
                (
                    Arc::new(MemoryInputUrlRepository::from_json_file(seed)?),
                    Arc::new(MemoryMenuLinkRepository::default()),
                )
            }
            (None, Some(url)) => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                tracing::info!("using postgres catalog");
                (
                    Arc::new(PgInputUrlRepository::new(pool.clone())),
                    Arc::new(PgMenuLinkRepository::new(pool)),
                )
            }
            (None, None) => {
                tracing::warn!("no database configured and no seed given; catalog is empty");
                (
                    Arc::new(MemoryInputUrlRepository::default()),
                    Arc::new(MemoryMenuLinkRepository::default()),
                )
            }
        };

    let fetcher = HttpFetcher::new(config.fetch_timeout).context("build http fetcher")?;
    let context = CrawlContext {
        inputs,
        menu_links,
        dispatcher: Arc::new(ItemDispatcher::new(
            Arc::new(registry),
            Arc::new(fetcher),
            config.scheduler(),
        )),
        preprocessor: Preprocessor::default(),
        mobile_rule: MobileUrlRule {
            domain: config.mobile_domain.clone(),
        },
        sink: JsonSink::new(&config.output_dir),
    };
    Ok(JobManager::new(context, config.manager()))
}
