//! cars-directory.net catalog.
//!
//! Brand, model and generation listings share one card grid layout
//! (`div.justify-content-left` holding `div.col-xs-6.p-1.card` cards). The
//! brand and model names printed on the cards are not repeated on the detail
//! page, so they travel down as link context and land in the record as
//! `Brand` and `BrandModel`.

use crate::extract::{
    Completeness, LinkExtraction, LinkExtractor, RecordExtractor, direct_text, resolve,
};
use crate::models::{Link, Record, Stage};
use crate::scrapers::SiteProfile;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

pub const NAME: &str = "cars-directory";
pub const SEED_URL: &str = "https://www.cars-directory.net/car-specs/";

pub const PRIORITY_FIELDS: &[&str] = &[
    "Brand",
    "BrandModel",
    "Generation",
    "Start of production",
    "End of production",
    "Modification",
    "Powertrain Architecture",
    "Body type",
    "Fuel Type",
    "Max. weight",
    "Length",
    "Width",
    "Height",
];

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static GRID: Lazy<Selector> = Lazy::new(|| sel("div.justify-content-left"));
static CARD: Lazy<Selector> = Lazy::new(|| sel("div.col-xs-6.p-1.card"));
static CARD_TEXT: Lazy<Selector> = Lazy::new(|| sel("div.card-text.text-center"));
static TABLE: Lazy<Selector> = Lazy::new(|| sel("table.table"));
static ROW: Lazy<Selector> = Lazy::new(|| sel("tr"));
static TH: Lazy<Selector> = Lazy::new(|| sel("th"));
static TD: Lazy<Selector> = Lazy::new(|| sel("td"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));

pub fn profile() -> SiteProfile {
    let seed = Url::parse(SEED_URL).expect("static seed url");
    SiteProfile::new(NAME, seed, PRIORITY_FIELDS)
        .link_stage(CardGrid {
            stage: Stage::Seed,
            label: Some("Brand"),
        })
        .link_stage(CardGrid {
            stage: Stage::Brand,
            label: Some("BrandModel"),
        })
        .link_stage(CardGrid {
            stage: Stage::Model,
            label: None,
        })
        .link_stage(VariantTable)
        .detail_stage(Car)
}

/// A page of cards, each linking one level down.
///
/// When `label` is set, the card caption is attached to the link as a context
/// field of that name; a card without a caption is then skipped.
pub struct CardGrid {
    pub stage: Stage,
    pub label: Option<&'static str>,
}

impl LinkExtractor for CardGrid {
    fn stage(&self) -> Stage {
        self.stage
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let Some(grid) = doc.select(&GRID).next() else {
            return LinkExtraction::missing_container();
        };

        let mut out = LinkExtraction::default();
        for card in grid.select(&CARD) {
            let Some(anchor) = card.select(&ANCHOR).next() else {
                debug!(%base, "card without an anchor");
                out.skipped += 1;
                continue;
            };
            let Some(url) = anchor.value().attr("href").and_then(|h| resolve(base, h)) else {
                out.skipped += 1;
                continue;
            };
            let mut link = Link::new(self.stage, url);
            if let Some(label) = self.label {
                let Some(caption) = anchor.select(&CARD_TEXT).next() else {
                    debug!(%base, "card without a caption");
                    out.skipped += 1;
                    continue;
                };
                link = link.with_context(label, direct_text(caption));
            }
            out.links.push(link);
        }
        out
    }
}

/// Generation page: every anchor inside the variant table.
pub struct VariantTable;

impl LinkExtractor for VariantTable {
    fn stage(&self) -> Stage {
        Stage::Generation
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let Some(table) = doc.select(&TABLE).next() else {
            return LinkExtraction::missing_container();
        };
        let mut out = LinkExtraction::default();
        for anchor in table.select(&ANCHOR) {
            match anchor.value().attr("href").and_then(|h| resolve(base, h)) {
                Some(url) => out.links.push(Link::new(Stage::Generation, url)),
                None => out.skipped += 1,
            }
        }
        out
    }
}

/// Detail page: label/value rows of the first `table.table`.
pub struct Car;

impl RecordExtractor for Car {
    fn extract_record(&self, body: &str, page: &Url) -> Option<Record> {
        let doc = Html::parse_document(body);
        let Some(table) = doc.select(&TABLE).next() else {
            debug!(url = %page, "specification table missing");
            return None;
        };
        let mut record = Record::new();
        for row in table.select(&ROW) {
            if let (Some(label), Some(value)) = (row.select(&TH).next(), row.select(&TD).next()) {
                record.insert(direct_text(label), direct_text(value));
            }
        }
        Completeness::ANY.check(record, page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    const BRANDS: &str = r#"
        <div class="row justify-content-left">
          <div class="col-xs-6 p-1 card">
            <a href="/car-specs/audi/"><img src="a.png"><div class="card-text text-center">Audi</div></a>
          </div>
          <div class="col-xs-6 p-1 card"><span>coming soon</span></div>
          <div class="col-xs-6 p-1 card">
            <a href="/car-specs/bmw/"><div class="card-text text-center"> BMW </div></a>
          </div>
        </div>"#;

    #[test]
    fn test_brand_cards_carry_names() {
        let grid = CardGrid {
            stage: Stage::Seed,
            label: Some("Brand"),
        };
        let out = grid.extract_links(BRANDS, &url(SEED_URL));

        assert_eq!(out.links.len(), 2);
        assert_eq!(out.skipped, 1);
        assert_eq!(out.links[0].url().as_str(), "https://www.cars-directory.net/car-specs/audi/");
        assert_eq!(out.links[0].context(), &[("Brand".to_string(), "Audi".to_string())]);
        assert_eq!(out.links[1].context(), &[("Brand".to_string(), "BMW".to_string())]);
    }

    #[test]
    fn test_unlabelled_grid_keeps_captionless_cards() {
        let html = r#"<div class="justify-content-left">
            <div class="col-xs-6 p-1 card"><a href="gen-1/">B9</a></div></div>"#;
        let grid = CardGrid {
            stage: Stage::Model,
            label: None,
        };
        let out = grid.extract_links(html, &url("https://www.cars-directory.net/car-specs/audi/a4/"));
        assert_eq!(
            out.links[0].url().as_str(),
            "https://www.cars-directory.net/car-specs/audi/a4/gen-1/"
        );
        assert!(out.links[0].context().is_empty());
    }

    #[test]
    fn test_missing_grid() {
        let grid = CardGrid {
            stage: Stage::Brand,
            label: Some("BrandModel"),
        };
        assert!(grid.extract_links("<html></html>", &url(SEED_URL)).container_missing);
    }

    #[test]
    fn test_variant_table_links() {
        let html = r#"<table class="table"><tr><td><a href="v/1">1.4</a></td><td><a href="v/2">2.0</a></td></tr></table>"#;
        let out = VariantTable.extract_links(html, &url("https://www.cars-directory.net/g/"));
        assert_eq!(out.links.len(), 2);
        assert_eq!(out.links[1].url().as_str(), "https://www.cars-directory.net/g/v/2");
    }

    #[test]
    fn test_car_rows() {
        let html = r#"<table class="table">
            <tr><th>Generation</th><td>B9</td></tr>
            <tr><td>orphan value</td></tr>
            <tr><th>Fuel Type</th><td><span>Petrol</span></td></tr></table>"#;
        let record = Car.extract_record(html, &url("https://www.cars-directory.net/v/1")).unwrap();
        assert_eq!(
            record.iter().collect::<Vec<_>>(),
            vec![("Generation", "B9"), ("Fuel Type", "Petrol")]
        );
    }
}
