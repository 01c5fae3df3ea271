//! Layered run configuration.
//!
//! Settings are resolved in three layers, later layers winning:
//!
//! 1. built-in defaults ([`CrawlConfig::default`])
//! 2. an optional YAML file (`--config`)
//! 3. command-line flags and their environment variables ([`Cli`])
//!
//! A YAML file only needs the keys it changes:
//!
//! ```yaml
//! site: thecarspec
//! worker_count: 16
//! request_timeout_secs: 20
//! restrict_scope: true
//! ```

use crate::cli::Cli;
use crate::error::RunError;
use crate::fetch::{HttpConnector, RetryPolicy};
use crate::pipeline::PipelineOptions;
use crate::scrapers::{self, SITES, SiteProfile};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlConfig {
    pub site: String,
    /// Replaces the profile's own seed URL when set.
    pub seed_url: Option<String>,
    pub worker_count: usize,
    /// Defaults to `<site>.snapshot.json`.
    pub snapshot_path: Option<PathBuf>,
    /// Defaults to `<site>.csv`.
    pub output_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub redirect_limit: usize,
    pub retry_budget: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_jitter_ms: u64,
    pub min_snapshot_records: usize,
    pub restrict_scope: bool,
    pub restricted_fanout: usize,
    pub dedup_links: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            site: scrapers::autodata::NAME.to_string(),
            seed_url: None,
            worker_count: 32,
            snapshot_path: None,
            output_path: None,
            request_timeout_secs: 10,
            redirect_limit: 10,
            retry_budget: 5,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            backoff_jitter_ms: 250,
            min_snapshot_records: 100,
            restrict_scope: false,
            restricted_fanout: 2,
            dedup_links: true,
        }
    }
}

impl CrawlConfig {
    /// Resolve the configuration for `cli`, reading its YAML file if given.
    #[instrument(level = "info", skip_all)]
    pub fn resolve(cli: &Cli) -> Result<Self, RunError> {
        let mut config = match &cli.config {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        info!(
            site = %config.site,
            workers = config.worker_count,
            snapshot = %config.snapshot_path().display(),
            output = %config.output_path().display(),
            "configuration resolved"
        );
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, RunError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RunError::Config(format!("cannot read {}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_yaml_str(&text)
            .map_err(|e| RunError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Overlay every option the command line (or its environment) set.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(site) = &cli.site {
            self.site = site.clone();
        }
        if let Some(url) = &cli.seed_url {
            self.seed_url = Some(url.clone());
        }
        if let Some(n) = cli.workers {
            self.worker_count = n;
        }
        if let Some(path) = &cli.snapshot {
            self.snapshot_path = Some(path.clone());
        }
        if let Some(path) = &cli.output {
            self.output_path = Some(path.clone());
        }
        if let Some(secs) = cli.timeout_secs {
            self.request_timeout_secs = secs;
        }
        if let Some(n) = cli.redirect_limit {
            self.redirect_limit = n;
        }
        if let Some(n) = cli.retry_budget {
            self.retry_budget = n;
        }
        if let Some(n) = cli.min_snapshot_records {
            self.min_snapshot_records = n;
        }
        if cli.restrict_scope {
            self.restrict_scope = true;
        }
        if let Some(n) = cli.restricted_fanout {
            self.restricted_fanout = n;
        }
        if cli.no_dedup {
            self.dedup_links = false;
        }
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if !SITES.contains(&self.site.as_str()) {
            return Err(RunError::Config(format!(
                "unknown site '{}' (expected one of: {})",
                self.site,
                SITES.join(", ")
            )));
        }
        if self.worker_count == 0 {
            return Err(RunError::Config("worker_count must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(RunError::Config("request_timeout_secs must be at least 1".into()));
        }
        if let Some(url) = &self.seed_url {
            Url::parse(url).map_err(|e| RunError::Config(format!("bad seed_url '{url}': {e}")))?;
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.snapshot.json", self.site)))
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.csv", self.site)))
    }

    /// The selected site profile, with the seed override applied.
    pub fn profile(&self) -> Result<SiteProfile, RunError> {
        let profile = scrapers::profile(&self.site)
            .ok_or_else(|| RunError::Config(format!("unknown site '{}'", self.site)))?;
        match &self.seed_url {
            Some(url) => {
                let seed = Url::parse(url)
                    .map_err(|e| RunError::Config(format!("bad seed_url '{url}': {e}")))?;
                Ok(profile.with_seed(seed))
            }
            None => Ok(profile),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_budget: self.retry_budget,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            jitter: Duration::from_millis(self.backoff_jitter_ms),
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            restrict_scope: self.restrict_scope,
            restricted_fanout: self.restricted_fanout,
            dedup_links: self.dedup_links,
        }
    }

    pub fn connector(&self) -> HttpConnector {
        HttpConnector {
            timeout: Duration::from_secs(self.request_timeout_secs),
            redirect_limit: self.redirect_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_defaults() {
        let config = CrawlConfig::default();
        assert_eq!(config.site, "auto-data");
        assert_eq!(config.worker_count, 32);
        assert_eq!(config.snapshot_path(), PathBuf::from("auto-data.snapshot.json"));
        assert_eq!(config.output_path(), PathBuf::from("auto-data.csv"));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.pipeline_options(), PipelineOptions::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_overrides_only_named_keys() {
        let config = CrawlConfig::from_yaml_str("site: thecarspec\nworker_count: 4\n").unwrap();
        assert_eq!(config.site, "thecarspec");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.output_path(), PathBuf::from("thecarspec.csv"));
    }

    #[test]
    fn test_yaml_rejects_unknown_keys() {
        assert!(CrawlConfig::from_yaml_str("workers: 4\n").is_err());
    }

    #[test]
    fn test_cli_beats_yaml() {
        let mut config =
            CrawlConfig::from_yaml_str("site: thecarspec\nworker_count: 4\ndedup_links: true\n")
                .unwrap();
        let cli = Cli::parse_from([
            "catalog_crawl",
            "--site",
            "cars-directory",
            "--restrict-scope",
            "--no-dedup",
        ]);

        config.apply_cli(&cli);

        assert_eq!(config.site, "cars-directory");
        assert_eq!(config.worker_count, 4);
        assert!(config.restrict_scope);
        assert!(!config.dedup_links);
    }

    #[test]
    fn test_resolve_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.yaml");
        std::fs::write(&path, "site: cars-directory\nmin_snapshot_records: 10\n").unwrap();
        let cli = Cli::parse_from(["catalog_crawl", "--config", path.to_str().unwrap(), "-w", "2"]);

        let config = CrawlConfig::resolve(&cli).unwrap();

        assert_eq!(config.site, "cars-directory");
        assert_eq!(config.min_snapshot_records, 10);
        assert_eq!(config.worker_count, 2);
    }

    #[test]
    fn test_validation_errors() {
        let unknown = CrawlConfig {
            site: "nope".into(),
            ..CrawlConfig::default()
        };
        assert!(matches!(unknown.validate(), Err(RunError::Config(_))));

        let no_workers = CrawlConfig {
            worker_count: 0,
            ..CrawlConfig::default()
        };
        assert!(no_workers.validate().is_err());

        let bad_seed = CrawlConfig {
            seed_url: Some("not a url".into()),
            ..CrawlConfig::default()
        };
        assert!(bad_seed.validate().is_err());
        assert!(bad_seed.profile().is_err());
    }

    #[test]
    fn test_profile_uses_seed_override() {
        let config = CrawlConfig {
            seed_url: Some("https://mirror.test/en/".into()),
            ..CrawlConfig::default()
        };
        let profile = config.profile().unwrap();
        assert_eq!(profile.seed_url.as_str(), "https://mirror.test/en/");
        assert_eq!(profile.name, "auto-data");
    }
}
