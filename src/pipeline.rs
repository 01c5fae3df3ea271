//! Stage orchestrator.
//!
//! A [`Pipeline`] walks one [`SiteProfile`] from its seed URL down to the
//! detail pages. Each stage is one pass of the [`WorkPool`]: every input link
//! is fetched by a per-worker [`Fetcher`] and handed to that stage's extractor.
//! The flattened output of a stage becomes the input of the next one.
//!
//! ```text
//! Idle → Running(seed) → … → Running(detail) → Completed
//!                  ╲               ╲
//!                   Aborted{stage}  Failed{reason}
//! ```
//!
//! An empty stage output ends the run as [`RunState::Aborted`]; nothing after
//! it is fetched. Cancellation is observed between items and ends the run as
//! [`RunState::Failed`] once in-flight fetches have drained. So does a stage
//! whose inputs were never fetched at all (no worker could open its client).

use crate::error::{FetchError, PipelineError};
use crate::extract::StageExtractor;
use crate::fetch::{Connector, Fetcher, RetryPolicy};
use crate::models::{Link, Record, Stage};
use crate::pool::{Job, PoolSummary, WorkPool};
use crate::scrapers::SiteProfile;
use crate::utils::truncate_for_log;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Where a pipeline is in its traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Stage),
    Completed,
    /// `stage` found nothing at the `output` level.
    Aborted { stage: Stage, output: Stage },
    Failed { reason: String },
}

/// Traversal knobs that do not change what a stage extracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Keep only `restricted_fanout` links out of the seed stage.
    pub restrict_scope: bool,
    pub restricted_fanout: usize,
    /// Drop links whose URL was already produced earlier in the same stage.
    pub dedup_links: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            restrict_scope: false,
            restricted_fanout: 2,
            dedup_links: true,
        }
    }
}

/// What one fetched page contributed to its stage's output.
#[derive(Debug, Default)]
pub struct StageYield {
    pub links: Vec<Link>,
    pub record: Option<Record>,
}

/// Fetch-then-extract for one stage of a profile.
struct StageJob<C> {
    profile: Arc<SiteProfile>,
    index: usize,
    connector: Arc<C>,
    policy: RetryPolicy,
}

impl<C: Connector> StageJob<C> {
    fn extract(&self, body: &str, link: &Link) -> StageYield {
        match &self.profile.stages[self.index] {
            StageExtractor::Links(extractor) => {
                let found = extractor.extract_links(body, link.url());
                if found.container_missing {
                    warn!(
                        url = %link.url(),
                        stage = %extractor.stage(),
                        linked_from = %link.stage(),
                        body = %truncate_for_log(body, 200),
                        "link container missing"
                    );
                }
                if found.skipped > 0 {
                    debug!(url = %link.url(), skipped = found.skipped, "skipped malformed fragments");
                }
                StageYield {
                    links: found.links.into_iter().map(|l| l.inherit(link)).collect(),
                    record: None,
                }
            }
            StageExtractor::Record(extractor) => {
                let record = extractor
                    .extract_record(body, link.url())
                    .map(|r| r.seeded_with(link.context()))
                    .map(|r| match &self.profile.backfill {
                        Some(rule) => rule.apply(r, link.url()),
                        None => r,
                    })
                    .filter(|r| !r.is_empty());
                StageYield {
                    links: Vec::new(),
                    record,
                }
            }
        }
    }
}

impl<C: Connector> Job for StageJob<C> {
    type Item = Link;
    type Output = StageYield;
    type Worker = Fetcher<C::Transport>;
    type Error = FetchError;

    fn open_worker(&self, worker_id: usize) -> Result<Self::Worker, FetchError> {
        let transport = self.connector.connect()?;
        debug!(worker_id, "opened fetcher");
        Ok(Fetcher::new(transport, self.policy.clone()))
    }

    async fn run(&self, worker: &mut Self::Worker, link: Link) -> Result<StageYield, FetchError> {
        let body = worker.fetch(link.url().as_str()).await?;
        Ok(self.extract(&body, &link))
    }
}

/// Logs a line each time another tenth of a stage completes.
#[derive(Debug)]
struct Progress {
    stage: Stage,
    total: usize,
    done: usize,
    logged_tenths: usize,
}

impl Progress {
    fn new(stage: Stage, total: usize) -> Self {
        Self {
            stage,
            total,
            done: 0,
            logged_tenths: 0,
        }
    }

    /// Count one finished item; returns the percentage when a new 10% step
    /// was crossed.
    fn advance(&mut self) -> Option<usize> {
        self.done += 1;
        if self.total == 0 {
            return None;
        }
        let tenths = self.done * 10 / self.total;
        if tenths > self.logged_tenths {
            self.logged_tenths = tenths;
            let percent = tenths * 10;
            info!(stage = %self.stage, done = self.done, total = self.total, "{percent}% complete");
            return Some(percent);
        }
        None
    }
}

/// Drives one crawl of one site.
pub struct Pipeline<C: Connector> {
    profile: Arc<SiteProfile>,
    connector: Arc<C>,
    pool: WorkPool,
    policy: RetryPolicy,
    options: PipelineOptions,
    state: RunState,
}

impl<C: Connector> Pipeline<C> {
    pub fn new(profile: SiteProfile, connector: C, pool: WorkPool, policy: RetryPolicy) -> Self {
        Self {
            profile: Arc::new(profile),
            connector: Arc::new(connector),
            pool,
            policy,
            options: PipelineOptions::default(),
            state: RunState::Idle,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Crawl every stage and return the harvested records.
    ///
    /// # Returns
    ///
    /// The detail records in no particular order, or the
    /// [`PipelineError`] that ended the run. [`Pipeline::state`] reflects the
    /// outcome either way.
    #[instrument(level = "info", skip(self), fields(site = self.profile.name))]
    pub async fn run(&mut self) -> Result<Vec<Record>, PipelineError> {
        if let Err(e) = self.profile.validate() {
            error!(error = %e, "refusing to run invalid profile");
            self.state = RunState::Failed {
                reason: e.to_string(),
            };
            return Err(e);
        }

        let profile = Arc::clone(&self.profile);
        let mut links = vec![Link::seed(profile.seed_url.clone())];
        info!(seed = %profile.seed_url, stages = profile.stages.len(), "crawl starting");

        for (index, extractor) in profile.stages.iter().enumerate() {
            let stage = extractor.stage();
            let inputs = links.len();
            self.state = RunState::Running(stage);
            info!(stage = %stage, inputs, "stage starting");

            let (yields, summary) = self.run_stage(index, stage, links).await;

            if self.pool.cancellation().is_cancelled() {
                warn!(stage = %stage, "crawl cancelled");
                self.state = RunState::Failed {
                    reason: "cancelled".to_string(),
                };
                return Err(PipelineError::Cancelled { stage });
            }
            if summary.unprocessed > 0 {
                let err = PipelineError::Stalled {
                    stage,
                    inputs,
                    unprocessed: summary.unprocessed,
                };
                error!(error = %err, workers = summary.workers, "stage could not be crawled");
                self.state = RunState::Failed {
                    reason: err.to_string(),
                };
                return Err(err);
            }

            match extractor {
                StageExtractor::Links(_) => {
                    let next = self.collect_links(stage, yields);
                    if next.is_empty() {
                        let output = profile
                            .stages
                            .get(index + 1)
                            .map_or(Stage::Detail, StageExtractor::stage);
                        return Err(self.abort(stage, output, inputs));
                    }
                    info!(stage = %stage, inputs, outputs = next.len(), "stage finished");
                    links = next;
                }
                StageExtractor::Record(_) => {
                    let records: Vec<Record> = yields.into_iter().filter_map(|y| y.record).collect();
                    if records.is_empty() {
                        return Err(self.abort(stage, Stage::Detail, inputs));
                    }
                    info!(stage = %stage, inputs, records = records.len(), "crawl completed");
                    self.state = RunState::Completed;
                    return Ok(records);
                }
            }
        }

        // validate() guarantees the last stage is the record stage.
        Err(self.abort(Stage::Detail, Stage::Detail, 0))
    }

    async fn run_stage(
        &self,
        index: usize,
        stage: Stage,
        links: Vec<Link>,
    ) -> (Vec<StageYield>, PoolSummary) {
        let job = Arc::new(StageJob {
            profile: Arc::clone(&self.profile),
            index,
            connector: Arc::clone(&self.connector),
            policy: self.policy.clone(),
        });

        let mut run = self.pool.spawn(job, links);
        let mut progress = Progress::new(stage, run.total());
        let mut yields = Vec::with_capacity(run.total());
        while let Some(y) = run.next().await {
            progress.advance();
            yields.push(y);
        }

        let summary = run.finish().await;
        info!(
            stage = %stage,
            workers = summary.workers,
            processed = summary.processed,
            failed = summary.failed,
            unprocessed = summary.unprocessed,
            "stage drained"
        );
        (yields, summary)
    }

    fn collect_links(&self, stage: Stage, yields: Vec<StageYield>) -> Vec<Link> {
        let found: Vec<Link> = yields.into_iter().flat_map(|y| y.links).collect();
        let found_count = found.len();

        let mut links: Vec<Link> = if self.options.dedup_links {
            found.into_iter().unique_by(|l| l.url().clone()).collect()
        } else {
            found
        };
        if links.len() < found_count {
            debug!(stage = %stage, dropped = found_count - links.len(), "dropped duplicate links");
        }

        if stage == Stage::Seed && self.options.restrict_scope {
            links.truncate(self.options.restricted_fanout);
            info!(kept = links.len(), "restricted scope; truncated seed fan-out");
        }
        links
    }

    fn abort(&mut self, stage: Stage, output: Stage, inputs: usize) -> PipelineError {
        let err = PipelineError::EmptyStage {
            stage,
            output,
            inputs,
        };
        error!(error = %err, "aborting crawl");
        self.state = RunState::Aborted { stage, output };
        err
    }
}
