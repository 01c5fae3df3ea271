//! Per-stage extraction contract.
//!
//! Every pipeline stage owns one extractor. Link stages turn a page into the
//! links of the next level ([`LinkExtractor`]); the terminal detail stage turns
//! a page into one [`Record`] ([`RecordExtractor`]). The two capabilities are
//! joined in the tagged [`StageExtractor`] so a site is just an ordered list of
//! them (see [`crate::scrapers`]).
//!
//! Extraction never fails a batch: a missing container yields an empty
//! [`LinkExtraction`] with `container_missing` set, a malformed fragment is
//! logged and skipped, and an incomplete page yields `None`.

use crate::models::{Link, Record, Stage};
use scraper::ElementRef;
use tracing::debug;
use url::Url;

/// Links found on one page.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LinkExtraction {
    /// Absolute links in document order. Duplicates are allowed.
    pub links: Vec<Link>,
    /// The stage-specific container was not on the page.
    pub container_missing: bool,
    /// Fragments inside the container that could not be turned into a link.
    pub skipped: usize,
}

impl LinkExtraction {
    pub fn missing_container() -> Self {
        Self {
            container_missing: true,
            ..Self::default()
        }
    }
}

/// Turns a listing page into links to the next level.
pub trait LinkExtractor: Send + Sync {
    /// The stage this extractor processes; links it emits carry this tag.
    fn stage(&self) -> Stage;

    /// Extract every child link from `body`, resolving hrefs against `base`.
    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction;
}

/// Turns a detail page into one record.
pub trait RecordExtractor: Send + Sync {
    /// Extract the attribute table of `body`.
    ///
    /// Returns `None` when the page does not carry enough data to be useful.
    fn extract_record(&self, body: &str, page: &Url) -> Option<Record>;
}

/// One stage of a site, tagged by capability.
pub enum StageExtractor {
    Links(Box<dyn LinkExtractor>),
    Record(Box<dyn RecordExtractor>),
}

impl StageExtractor {
    pub fn stage(&self) -> Stage {
        match self {
            StageExtractor::Links(x) => x.stage(),
            StageExtractor::Record(_) => Stage::Detail,
        }
    }
}

/// Minimum-completeness rule for a detail record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completeness {
    /// Fewest fields a usable record may hold.
    pub min_fields: usize,
    /// Anchor fields that must be present.
    pub required: &'static [&'static str],
}

impl Completeness {
    pub const ANY: Completeness = Completeness {
        min_fields: 1,
        required: &[],
    };

    pub fn accepts(&self, record: &Record) -> bool {
        record.len() >= self.min_fields && self.required.iter().all(|f| record.contains(f))
    }

    /// Keep `record` only if it passes.
    pub fn check(&self, record: Record, page: &Url) -> Option<Record> {
        if self.accepts(&record) {
            Some(record)
        } else {
            debug!(url = %page, fields = record.len(), "insufficient data for record");
            None
        }
    }
}

/// Text owned directly by `el`, ignoring nested elements.
fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .collect::<String>()
        .trim()
        .replace('\n', "")
}

/// The "direct text" of a table cell.
///
/// Returns the cell's own text (trimmed, newlines removed). When the cell has
/// none, falls back to the own text of its first child element; with no child
/// element the result is empty.
pub fn direct_text(cell: ElementRef<'_>) -> String {
    let text = own_text(cell);
    if !text.is_empty() {
        return text;
    }
    cell.children()
        .find_map(ElementRef::wrap)
        .map(own_text)
        .unwrap_or_default()
}

/// All text under `el`, with runs of whitespace collapsed to single spaces.
pub fn collapsed_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `href` against `base`, logging hrefs that cannot be resolved.
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    match base.join(href.trim()) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!(%base, href, error = %e, "skipping unresolvable href");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first_cell(html: &str) -> String {
        let doc = Html::parse_document(html);
        let sel = Selector::parse("td").unwrap();
        direct_text(doc.select(&sel).next().unwrap())
    }

    #[test]
    fn test_direct_text_prefers_own_text() {
        let html = "<table><tr><td> 150 hp <span>(110 kW)</span></td></tr></table>";
        assert_eq!(first_cell(html), "150 hp");
    }

    #[test]
    fn test_direct_text_falls_back_to_first_child() {
        let html = "<table><tr><td><a href='/x'>Audi <b>A4</b></a><i>other</i></td></tr></table>";
        assert_eq!(first_cell(html), "Audi");
    }

    #[test]
    fn test_direct_text_strips_newlines() {
        let html = "<table><tr><td>\n  Front\nengine  \n</td></tr></table>";
        assert_eq!(first_cell(html), "Frontengine");
    }

    #[test]
    fn test_direct_text_empty_cell() {
        assert_eq!(first_cell("<table><tr><td>  </td></tr></table>"), "");
    }

    #[test]
    fn test_collapsed_text() {
        let doc = Html::parse_document("<div><p> 1 598 <small>cm3</small>\n </p></div>");
        let sel = Selector::parse("p").unwrap();
        assert_eq!(collapsed_text(doc.select(&sel).next().unwrap()), "1 598 cm3");
    }

    #[test]
    fn test_completeness() {
        let url = Url::parse("https://example.com/car").unwrap();
        let rule = Completeness {
            min_fields: 2,
            required: &["Version"],
        };
        let thin: Record = [("Version", "1.4")].into_iter().collect();
        let full: Record = [("Version", "1.4"), ("Power", "90")].into_iter().collect();
        let anchorless: Record = [("Brand", "X"), ("Power", "90")].into_iter().collect();

        assert!(rule.check(thin, &url).is_none());
        assert!(rule.check(full, &url).is_some());
        assert!(rule.check(anchorless, &url).is_none());
        assert!(!Completeness::ANY.accepts(&Record::new()));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let base = Url::parse("https://example.com/en/brands/").unwrap();
        assert_eq!(
            resolve(&base, "audi-brand-5").unwrap().as_str(),
            "https://example.com/en/brands/audi-brand-5"
        );
        assert_eq!(
            resolve(&base, "/en/bmw").unwrap().as_str(),
            "https://example.com/en/bmw"
        );
        assert_eq!(
            resolve(&base, "https://other.org/x").unwrap().as_str(),
            "https://other.org/x"
        );
    }
}
