//! Site profiles: one ordered set of stage extractors per catalog site.
//!
//! Each submodule describes one site by registering one extractor per stage it
//! uses. Adding a site means adding a module and a registry entry; the
//! pipeline itself never branches on the site.
//!
//! # Supported Sites
//!
//! | Site | Module | Stages | Notes |
//! |------|--------|--------|-------|
//! | auto-data.net | [`autodata`] | seed → brand → model → generation → detail | Skips classed rows in the spec table |
//! | cars-directory.net | [`carsdirectory`] | seed → brand → model → generation → detail | Carries card names as `Brand` / `BrandModel` |
//! | thecarspec.net | [`thecarspec`] | seed → brand → model → detail | Derives `Version`; backfills brand/model from the URL |

pub mod autodata;
pub mod carsdirectory;
pub mod thecarspec;

use crate::error::PipelineError;
use crate::extract::{LinkExtractor, RecordExtractor, StageExtractor};
use crate::models::{Record, Stage};
use crate::utils::title_case;
use url::Url;

/// Names accepted by [`profile`].
pub const SITES: &[&str] = &[autodata::NAME, carsdirectory::NAME, thecarspec::NAME];

/// Look up a site profile by name.
pub fn profile(name: &str) -> Option<SiteProfile> {
    match name {
        autodata::NAME => Some(autodata::profile()),
        carsdirectory::NAME => Some(carsdirectory::profile()),
        thecarspec::NAME => Some(thecarspec::profile()),
        _ => None,
    }
}

/// Fills missing brand/model fields from path segments of the page URL.
///
/// Segments are counted from the end of the URL after trailing slashes are
/// dropped, over the full `/`-split string (scheme and host included).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlBackfill {
    pub brand_from_end: usize,
    pub model_from_end: usize,
    pub min_parts: usize,
}

impl UrlBackfill {
    /// Add `Brand` and `Model` when the record lacks one of them.
    pub fn apply(&self, mut record: Record, page: &Url) -> Record {
        if record.contains("Brand") && record.contains("Model") {
            return record;
        }
        let parts: Vec<&str> = page.as_str().trim_end_matches('/').split('/').collect();
        if parts.len() < self.min_parts {
            return record;
        }
        let segment = |from_end: usize| {
            parts
                .len()
                .checked_sub(from_end)
                .map(|i| title_case(&parts[i].replace('-', " ")))
        };
        if let Some(brand) = segment(self.brand_from_end) {
            record.insert("Brand", brand);
        }
        if let Some(model) = segment(self.model_from_end) {
            record.insert("Model", model);
        }
        record
    }
}

/// Everything the pipeline needs to know about one site.
pub struct SiteProfile {
    pub name: &'static str,
    pub seed_url: Url,
    /// Columns placed first in the output table, when present.
    pub priority_fields: &'static [&'static str],
    /// Stage extractors in traversal order; the last one yields records.
    pub stages: Vec<StageExtractor>,
    pub backfill: Option<UrlBackfill>,
}

impl SiteProfile {
    pub fn new(name: &'static str, seed_url: Url, priority_fields: &'static [&'static str]) -> Self {
        Self {
            name,
            seed_url,
            priority_fields,
            stages: Vec::new(),
            backfill: None,
        }
    }

    pub fn link_stage(mut self, extractor: impl LinkExtractor + 'static) -> Self {
        self.stages.push(StageExtractor::Links(Box::new(extractor)));
        self
    }

    pub fn detail_stage(mut self, extractor: impl RecordExtractor + 'static) -> Self {
        self.stages.push(StageExtractor::Record(Box::new(extractor)));
        self
    }

    pub fn with_backfill(mut self, backfill: UrlBackfill) -> Self {
        self.backfill = Some(backfill);
        self
    }

    pub fn with_seed(mut self, seed_url: Url) -> Self {
        self.seed_url = seed_url;
        self
    }

    /// Check that stages start at the seed, strictly follow the canonical
    /// order, and end with the single record stage.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |reason: String| PipelineError::InvalidProfile {
            profile: self.name.to_string(),
            reason,
        };
        let stages: Vec<Stage> = self.stages.iter().map(StageExtractor::stage).collect();

        match (stages.first(), stages.last()) {
            (Some(Stage::Seed), Some(Stage::Detail)) => {}
            _ => return Err(invalid(format!("stages must run seed..detail, got {stages:?}"))),
        }
        if let Some(pair) = stages.windows(2).find(|w| w[0] >= w[1]) {
            return Err(invalid(format!("{} cannot follow {}", pair[1], pair[0])));
        }
        let record_stages = self
            .stages
            .iter()
            .filter(|s| matches!(s, StageExtractor::Record(_)))
            .count();
        if record_stages != 1 || !matches!(self.stages.last(), Some(StageExtractor::Record(_))) {
            return Err(invalid("exactly one record stage must come last".to_string()));
        }
        Ok(())
    }
}
