use anyhow::Context as _;

/// Installs the stderr subscriber. `RUST_LOG` filters (default `info`);
/// `DAILY_CRAWL_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .context("build log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = if json_requested(std::env::var("DAILY_CRAWL_LOG_FORMAT").ok().as_deref()) {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn json_requested(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}
