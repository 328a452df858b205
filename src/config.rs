use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

use crate::app::manager::ManagerConfig;
use crate::app::scheduler::SchedulerConfig;

/// Finished jobs keep their event log at least this long.
pub const MIN_CLEANUP_DELAY: Duration = Duration::from_secs(300);

/// Service settings read from `DAILY_CRAWL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub output_dir: PathBuf,
    pub database_url: Option<String>,
    /// JSON route file binding URL patterns to named fetch handlers.
    pub routes_file: Option<PathBuf>,
    pub mobile_domain: String,
    pub fetch_timeout: Duration,
    pub single_page_timeout: Duration,
    pub default_timeout: Duration,
    pub cleanup_delay: Duration,
    pub max_concurrent_jobs: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("result"),
            database_url: None,
            routes_file: None,
            mobile_domain: "kt.com".to_string(),
            fetch_timeout: Duration::from_secs(60),
            single_page_timeout: Duration::from_secs(180),
            default_timeout: Duration::from_secs(300),
            cleanup_delay: Duration::from_secs(300),
            max_concurrent_jobs: 4,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| -> anyhow::Result<Duration> {
            match var(key) {
                Some(raw) => parse_secs(&raw)
                    .with_context(|| format!("invalid {key}={raw:?}. expected whole seconds")),
                None => Ok(default),
            }
        };

        let max_concurrent_jobs = match var("DAILY_CRAWL_MAX_CONCURRENT_JOBS") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .with_context(|| {
                    format!("invalid DAILY_CRAWL_MAX_CONCURRENT_JOBS={raw:?}. expected a positive integer")
                })?,
            None => defaults.max_concurrent_jobs,
        };

        let cleanup_delay = secs("DAILY_CRAWL_CLEANUP_DELAY_SECS", defaults.cleanup_delay)?;
        if cleanup_delay < MIN_CLEANUP_DELAY {
            anyhow::bail!(
                "invalid DAILY_CRAWL_CLEANUP_DELAY_SECS={}. must be at least {}s",
                cleanup_delay.as_secs(),
                MIN_CLEANUP_DELAY.as_secs()
            );
        }

        Ok(Self {
            output_dir: var("DAILY_CRAWL_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            database_url: var("DAILY_CRAWL_DATABASE_URL"),
            routes_file: var("DAILY_CRAWL_ROUTES").map(PathBuf::from),
            mobile_domain: var("DAILY_CRAWL_MOBILE_DOMAIN").unwrap_or(defaults.mobile_domain),
            fetch_timeout: secs("DAILY_CRAWL_FETCH_TIMEOUT_SECS", defaults.fetch_timeout)?,
            single_page_timeout: secs(
                "DAILY_CRAWL_SINGLE_PAGE_TIMEOUT_SECS",
                defaults.single_page_timeout,
            )?,
            default_timeout: secs("DAILY_CRAWL_DEFAULT_TIMEOUT_SECS", defaults.default_timeout)?,
            cleanup_delay,
            max_concurrent_jobs,
        })
    }

    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            single_page_timeout: self.single_page_timeout,
            default_timeout: self.default_timeout,
        }
    }

    pub fn manager(&self) -> ManagerConfig {
        ManagerConfig {
            cleanup_delay: self.cleanup_delay,
            max_concurrent_jobs: self.max_concurrent_jobs,
            ..ManagerConfig::default()
        }
    }
}

fn parse_secs(raw: &str) -> anyhow::Result<Duration> {
    let secs: u64 = raw.parse().context("parse seconds")?;
    if secs == 0 {
        anyhow::bail!("must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.scheduler(), SchedulerConfig::default());
        assert_eq!(config.manager().cleanup_delay, Duration::from_secs(300));
        assert_eq!(config.manager().drain_delay, Duration::from_secs(1));
    }

    #[test]
    fn overrides_are_trimmed_and_parsed() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("DAILY_CRAWL_OUTPUT_DIR", " /tmp/out "),
            ("DAILY_CRAWL_DATABASE_URL", "postgres://localhost/crawl"),
            ("DAILY_CRAWL_SINGLE_PAGE_TIMEOUT_SECS", "90"),
            ("DAILY_CRAWL_CLEANUP_DELAY_SECS", "600"),
            ("DAILY_CRAWL_MAX_CONCURRENT_JOBS", "2"),
            ("DAILY_CRAWL_ROUTES", ""),
        ]))
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/crawl"));
        assert_eq!(config.single_page_timeout, Duration::from_secs(90));
        assert_eq!(config.default_timeout, Duration::from_secs(300));
        assert_eq!(config.manager().cleanup_delay, Duration::from_secs(600));
        assert_eq!(config.manager().max_concurrent_jobs, 2);
        assert_eq!(config.routes_file, None);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = ServiceConfig::from_lookup(lookup(&[("DAILY_CRAWL_DEFAULT_TIMEOUT_SECS", "soon")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("DAILY_CRAWL_DEFAULT_TIMEOUT_SECS"), "{err}");

        let err = ServiceConfig::from_lookup(lookup(&[("DAILY_CRAWL_MAX_CONCURRENT_JOBS", "0")]))
            .unwrap_err()
            .to_string();
        assert!(err.contains("DAILY_CRAWL_MAX_CONCURRENT_JOBS"), "{err}");

        let err = ServiceConfig::from_lookup(lookup(&[("DAILY_CRAWL_CLEANUP_DELAY_SECS", "5")]))
            .unwrap_err();
        assert!(err.to_string().contains("DAILY_CRAWL_CLEANUP_DELAY_SECS"), "{err:#}");
        assert!(format!("{err:#}").contains("at least 300s"), "{err:#}");

        let config = ServiceConfig::from_lookup(lookup(&[("DAILY_CRAWL_CLEANUP_DELAY_SECS", "300")]))
            .unwrap();
        assert_eq!(config.cleanup_delay, MIN_CLEANUP_DELAY);
    }
}
