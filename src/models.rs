//! Data models shared by every stage of the crawl.
//!
//! This module defines the values that flow between pipeline stages:
//! - [`Stage`]: one level of the catalog hierarchy
//! - [`Link`]: an absolute URL tagged with the stage that discovered it
//! - [`Record`]: the flat field/value mapping harvested from one detail page
//!
//! Links and records are plain owned values so they can be moved into worker
//! tasks and collected back without sharing.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// One level of the catalog hierarchy.
///
/// A stage names the kind of page being processed: the seed stage reads the
/// top-level index, the detail stage reads leaf pages and yields records.
/// The derived ordering is the canonical traversal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Seed,
    Brand,
    Model,
    Generation,
    Variant,
    Detail,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Seed => "seed",
            Stage::Brand => "brand",
            Stage::Model => "model",
            Stage::Generation => "generation",
            Stage::Variant => "variant",
            Stage::Detail => "detail",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An absolute URL discovered by a stage.
///
/// Links are immutable once built. Besides the URL they carry the stage that
/// produced them and any context fields picked up on the way down the
/// hierarchy (for example the brand name printed on an index card). Context
/// is inherited by child links and seeds the final [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    url: Url,
    stage: Stage,
    context: Vec<(String, String)>,
}

impl Link {
    /// Create a link produced by `stage`.
    pub fn new(stage: Stage, url: Url) -> Self {
        Self {
            url,
            stage,
            context: Vec::new(),
        }
    }

    /// The configured entry point of a crawl, tagged as a seed link.
    pub fn seed(url: Url) -> Self {
        Self::new(Stage::Seed, url)
    }

    /// Attach a context field. A name already present keeps its first value.
    pub fn with_context(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if !self.context.iter().any(|(k, _)| *k == name) {
            self.context.push((name, value.into()));
        }
        self
    }

    /// Prepend the context of `parent`, keeping the parent's values on conflict.
    pub fn inherit(mut self, parent: &Link) -> Self {
        if parent.context.is_empty() {
            return self;
        }
        let own = std::mem::take(&mut self.context);
        self.context = parent.context.clone();
        for (name, value) in own {
            self = self.with_context(name, value);
        }
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.stage)
    }
}

/// The flat field/value mapping harvested from one detail page.
///
/// Fields keep their insertion order and are uniquely keyed: the first write
/// of a name wins and later writes of the same name are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: IndexMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field unless the name is already present.
    ///
    /// Returns `true` when the value was stored.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return false;
        }
        self.fields.insert(name, value.into());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build a record whose leading fields come from `context`, followed by
    /// the fields of `self` that the context did not already define.
    pub fn seeded_with(self, context: &[(String, String)]) -> Self {
        if context.is_empty() {
            return self;
        }
        let mut seeded = Record::new();
        for (name, value) in context {
            seeded.insert(name.clone(), value.clone());
        }
        for (name, value) in self.iter() {
            seeded.insert(name, value);
        }
        seeded
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_stage_order_is_traversal_order() {
        let mut shuffled = vec![Stage::Detail, Stage::Seed, Stage::Generation, Stage::Brand];
        shuffled.sort();
        assert_eq!(
            shuffled,
            vec![Stage::Seed, Stage::Brand, Stage::Generation, Stage::Detail]
        );
        assert_eq!(Stage::Model.to_string(), "model");
    }

    #[test]
    fn test_record_first_write_wins() {
        let mut record = Record::new();
        assert!(record.insert("Power", "150"));
        assert!(!record.insert("Power", "200"));
        assert!(record.insert("Brand", "X"));
        assert_eq!(record.get("Power"), Some("150"));
        assert_eq!(record.names().collect::<Vec<_>>(), vec!["Power", "Brand"]);
    }

    #[test]
    fn test_record_serialization_keeps_order() {
        let record: Record = [("Zeta", "1"), ("Alpha", "2")].into_iter().collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"Zeta":"1","Alpha":"2"}"#);
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_link_inherits_parent_context_first() {
        let parent = Link::new(Stage::Seed, url("https://example.com/"))
            .with_context("Brand", "Audi");
        let child = Link::new(Stage::Brand, url("https://example.com/a4"))
            .with_context("BrandModel", "A4")
            .with_context("Brand", "ignored")
            .inherit(&parent);

        assert_eq!(
            child.context(),
            &[
                ("Brand".to_string(), "Audi".to_string()),
                ("BrandModel".to_string(), "A4".to_string())
            ]
        );
        assert_eq!(child.stage(), Stage::Brand);
    }

    #[test]
    fn test_record_seeded_with_context() {
        let record: Record = [("Brand", "page"), ("Power", "90")].into_iter().collect();
        let seeded = record.seeded_with(&[("Brand".to_string(), "Ctx".to_string())]);
        assert_eq!(seeded.get("Brand"), Some("Ctx"));
        assert_eq!(seeded.names().collect::<Vec<_>>(), vec!["Brand", "Power"]);
    }
}
