use anyhow::Context as _;
use futures::StreamExt as _;

use crate::app::events::JobEvent;
use crate::app::model::JobStatus;
use crate::cli::{HandlersArgs, RunArgs};
use crate::config::ServiceConfig;
use crate::handlers::{HandlerKind, HandlerRegistry, load_routes};

/// Runs one job in-process, logging its events, and prints the result JSON.
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = ServiceConfig::from_env().context("load config")?;
    if let Some(dir) = &args.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(routes) = &args.routes {
        config.routes_file = Some(routes.clone());
    }

    let manager = crate::app::bootstrap(&config, args.seed.as_deref()).await?;
    let created = manager
        .create(args.params())
        .await
        .context("create job")?;
    let job_id = created.task_id;
    tracing::info!(job_id = %job_id, total_urls = created.total_urls, "job submitted");

    let mut events = manager.subscribe(&job_id);
    while let Some(event) = events.next().await {
        match &event {
            JobEvent::Status(status) => tracing::info!(status = %status.status, "{}", status.message),
            JobEvent::Progress(p) => {
                tracing::info!(current = p.current, total = p.total, success = p.success, failed = p.failed, "{}", p.message)
            }
            JobEvent::Error { message } => tracing::error!("{message}"),
            _ => {}
        }
        if event.is_terminal() {
            break;
        }
    }

    let state = manager
        .get(&job_id)
        .with_context(|| format!("job disappeared: {job_id}"))?;
    match state.status {
        JobStatus::Completed => {
            let result = state.result.unwrap_or_default();
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("serialize job result")?
            );
            Ok(())
        }
        JobStatus::Failed => anyhow::bail!(
            "job failed: {}",
            state.error.unwrap_or_else(|| "unknown error".to_string())
        ),
        other => anyhow::bail!("job ended in unexpected state: {other:?}"),
    }
}

/// Prints `pattern<TAB>name<TAB>kind` per route, in match order.
pub fn handlers(args: HandlersArgs) -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("load config")?;
    let registry = match args.routes.or(config.routes_file) {
        Some(path) => load_routes(&path)?,
        None => HandlerRegistry::new(),
    };
    if registry.is_empty() {
        println!("no handlers registered");
        return Ok(());
    }
    for (pattern, name, kind) in registry.entries() {
        let kind = match kind {
            HandlerKind::SinglePage => "single_page",
            HandlerKind::MultiPage => "multi_page",
        };
        println!("{pattern}\t{name}\t{kind}");
    }
    Ok(())
}
