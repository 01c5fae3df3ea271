//! Command-line interface definitions for catalog_crawl.
//!
//! Every option can also come from an environment variable. Options left
//! unset fall through to the YAML config file, then to built-in defaults (see
//! [`crate::config::CrawlConfig`]).

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for catalog_crawl.
///
/// # Examples
///
/// ```sh
/// # Crawl auto-data.net with the defaults
/// catalog_crawl
///
/// # Quick validation run against two brands of thecarspec.net
/// catalog_crawl --site thecarspec --restrict-scope -o ./out/thecarspec.csv
///
/// # Settings from a file, worker count from the environment
/// CATALOG_CRAWL_WORKERS=8 catalog_crawl -c crawl.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "CATALOG_CRAWL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Site profile to crawl (auto-data, cars-directory, thecarspec)
    #[arg(short, long, env = "CATALOG_CRAWL_SITE")]
    pub site: Option<String>,

    /// Override the profile's seed URL
    #[arg(long, env = "CATALOG_CRAWL_SEED_URL")]
    pub seed_url: Option<String>,

    /// Number of concurrent workers per stage
    #[arg(short, long, env = "CATALOG_CRAWL_WORKERS")]
    pub workers: Option<usize>,

    /// Checkpoint snapshot file
    #[arg(long, env = "CATALOG_CRAWL_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Output CSV file
    #[arg(short, long, env = "CATALOG_CRAWL_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, env = "CATALOG_CRAWL_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Maximum redirects followed per request
    #[arg(long, env = "CATALOG_CRAWL_REDIRECT_LIMIT")]
    pub redirect_limit: Option<usize>,

    /// Retries allowed for transient fetch failures
    #[arg(long, env = "CATALOG_CRAWL_RETRY_BUDGET")]
    pub retry_budget: Option<usize>,

    /// Fewest records a snapshot must hold to be reused
    #[arg(long, env = "CATALOG_CRAWL_MIN_SNAPSHOT_RECORDS")]
    pub min_snapshot_records: Option<usize>,

    /// Only follow the first few links of the seed page
    #[arg(long, env = "CATALOG_CRAWL_RESTRICT_SCOPE")]
    pub restrict_scope: bool,

    /// How many seed links a restricted run follows
    #[arg(long, env = "CATALOG_CRAWL_RESTRICTED_FANOUT")]
    pub restricted_fanout: Option<usize>,

    /// Keep duplicate links instead of fetching each URL once per stage
    #[arg(long, env = "CATALOG_CRAWL_NO_DEDUP")]
    pub no_dedup: bool,
}
