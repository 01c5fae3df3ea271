//! auto-data.net catalog.
//!
//! The site is a strict five-level tree:
//!
//! ```text
//! /en/                      div.markite a[title]             → brand pages
//! /en/<brand>               ul.modelite ul li a              → model pages
//! /en/<model>               table#generr th a                → generation pages
//! /en/<generation>          table.carlist tr.i th a          → detail pages
//! /en/<car>                 table.cardetailsout.car2 tr      → record
//! ```
//!
//! Detail rows that carry a `class` attribute are section headings or ads and
//! hold no data.

use crate::extract::{
    Completeness, LinkExtraction, LinkExtractor, RecordExtractor, direct_text, resolve,
};
use crate::models::{Link, Record, Stage};
use crate::scrapers::SiteProfile;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

pub const NAME: &str = "auto-data";
pub const SEED_URL: &str = "https://www.auto-data.net/en/";

/// Columns grouped at the front of the output table.
pub const PRIORITY_FIELDS: &[&str] = &[
    "Brand",
    "Model",
    "Generation",
    "Start of production",
    "End of production",
    "Modification (Engine)",
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

static BRANDS: Lazy<Selector> = Lazy::new(|| sel("div.markite"));
static BRAND_ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));
static MODELS: Lazy<Selector> = Lazy::new(|| sel("ul.modelite"));
static MODEL_LIST: Lazy<Selector> = Lazy::new(|| sel("ul"));
static MODEL_ITEM: Lazy<Selector> = Lazy::new(|| sel("li"));
static GENERATIONS: Lazy<Selector> = Lazy::new(|| sel("table#generr"));
static GENERATION_CELL: Lazy<Selector> = Lazy::new(|| sel("th"));
static VARIANTS: Lazy<Selector> = Lazy::new(|| sel("table.carlist"));
static VARIANT_ROW: Lazy<Selector> = Lazy::new(|| sel("tr.i"));
static DETAILS: Lazy<Selector> = Lazy::new(|| sel("table.cardetailsout.car2"));
static ROW: Lazy<Selector> = Lazy::new(|| sel("tr"));
static TH: Lazy<Selector> = Lazy::new(|| sel("th"));
static TD: Lazy<Selector> = Lazy::new(|| sel("td"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a"));

pub fn profile() -> SiteProfile {
    let seed = Url::parse(SEED_URL).expect("static seed url");
    SiteProfile::new(NAME, seed, PRIORITY_FIELDS)
        .link_stage(Brands)
        .link_stage(Models)
        .link_stage(Generations)
        .link_stage(Variants)
        .detail_stage(Car)
}

/// Collect one link per fragment, where `anchor` picks the `<a>` out of each.
fn collect_links<'a>(
    stage: Stage,
    base: &Url,
    fragments: impl Iterator<Item = ElementRef<'a>>,
    anchor: impl Fn(ElementRef<'a>) -> Option<ElementRef<'a>>,
) -> LinkExtraction {
    let mut out = LinkExtraction::default();
    for fragment in fragments {
        let url = anchor(fragment)
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| resolve(base, href));
        match url {
            Some(url) => out.links.push(Link::new(stage, url)),
            None => {
                debug!(%base, %stage, "fragment without a usable anchor");
                out.skipped += 1;
            }
        }
    }
    out
}

/// Seed page: one link per titled anchor in the brand grid.
pub struct Brands;

impl LinkExtractor for Brands {
    fn stage(&self) -> Stage {
        Stage::Seed
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let Some(container) = doc.select(&BRANDS).next() else {
            return LinkExtraction::missing_container();
        };
        let titled = container
            .select(&BRAND_ANCHOR)
            .filter(|a| a.value().attr("title").is_some());
        collect_links(self.stage(), base, titled, Some)
    }
}

/// Brand page: the first anchor of every item in the nested model lists.
pub struct Models;

impl LinkExtractor for Models {
    fn stage(&self) -> Stage {
        Stage::Brand
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let Some(container) = doc.select(&MODELS).next() else {
            return LinkExtraction::missing_container();
        };
        let items = container
            .select(&MODEL_LIST)
            .flat_map(|ul| ul.select(&MODEL_ITEM));
        collect_links(self.stage(), base, items, |li| li.select(&ANCHOR).next())
    }
}

/// Model page: the anchor in every header cell of the generation table.
pub struct Generations;

impl LinkExtractor for Generations {
    fn stage(&self) -> Stage {
        Stage::Model
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let Some(container) = doc.select(&GENERATIONS).next() else {
            return LinkExtraction::missing_container();
        };
        collect_links(self.stage(), base, container.select(&GENERATION_CELL), |th| {
            th.select(&ANCHOR).next()
        })
    }
}

/// Generation page: the header anchor of every car row.
pub struct Variants;

impl LinkExtractor for Variants {
    fn stage(&self) -> Stage {
        Stage::Generation
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let Some(container) = doc.select(&VARIANTS).next() else {
            return LinkExtraction::missing_container();
        };
        collect_links(self.stage(), base, container.select(&VARIANT_ROW), |tr| {
            tr.select(&TH).next().and_then(|th| th.select(&ANCHOR).next())
        })
    }
}

/// Detail page: the label/value rows of the specification table.
pub struct Car;

impl RecordExtractor for Car {
    fn extract_record(&self, body: &str, page: &Url) -> Option<Record> {
        let doc = Html::parse_document(body);
        let Some(table) = doc.select(&DETAILS).next() else {
            debug!(url = %page, "specification table missing");
            return None;
        };

        let mut record = Record::new();
        for row in table.select(&ROW) {
            if row.value().attr("class").is_some() {
                continue;
            }
            let (Some(label), Some(value)) = (row.select(&TH).next(), row.select(&TD).next())
            else {
                debug!(url = %page, "row without label or value cell");
                continue;
            };
            record.insert(direct_text(label), direct_text(value));
        }
        Completeness::ANY.check(record, page)
    }
}
