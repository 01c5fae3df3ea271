//! thecarspec.net catalog.
//!
//! This site has no dedicated list containers, so links are recognized by
//! their URL shape instead:
//!
//! - seed: `<h3><a href="https://www.thecarspec.net/model/...">` brand pages
//! - brand: anchors to `/cars/...` that wrap a `div.spec-box` (model pages)
//! - model: `div.individual-car-title a` pointing at `/car-detail/` pages
//!
//! A page without a single anchor of the expected shape is reported as a
//! missing container.
//!
//! Detail pages spread their data over several `div.car-details-discription`
//! sections. A few labels are folded into canonical column names, the version
//! name is cut out of the `<h5>` title, and pages that lack a version or carry
//! too few fields are dropped.

use crate::extract::{
    Completeness, LinkExtraction, LinkExtractor, RecordExtractor, collapsed_text, resolve,
};
use crate::models::{Link, Record, Stage};
use crate::scrapers::{SiteProfile, UrlBackfill};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::info;
use url::Url;

pub const NAME: &str = "thecarspec";
pub const SEED_URL: &str = "https://www.thecarspec.net";

const BRAND_PREFIX: &str = "https://www.thecarspec.net/model/";
const MODEL_PATH: &str = "/cars/";
const DETAIL_PATH: &str = "/car-detail/";

pub const PRIORITY_FIELDS: &[&str] = &[
    "Brand",
    "Model",
    "Version",
    "Year production start",
    "Engine version",
    "Fuel type",
    "Power (hp)",
    "Top Speed",
    "Curb weight (kg)",
    "URL",
];

/// More than six fields, one of which is the version.
const COMPLETENESS: Completeness = Completeness {
    min_fields: 7,
    required: &["Version"],
};

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static H3_ANCHOR: Lazy<Selector> = Lazy::new(|| sel("h3 a[href]"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static SPEC_BOX: Lazy<Selector> = Lazy::new(|| sel("div.spec-box"));
static CAR_TITLE_ANCHOR: Lazy<Selector> = Lazy::new(|| sel("div.individual-car-title a[href]"));
static TITLE: Lazy<Selector> = Lazy::new(|| sel("h5"));
static SECTION: Lazy<Selector> = Lazy::new(|| sel("div.car-details-discription"));
static ROW: Lazy<Selector> = Lazy::new(|| sel("tr"));
static TH: Lazy<Selector> = Lazy::new(|| sel("th"));
static TD: Lazy<Selector> = Lazy::new(|| sel("td"));
static H4: Lazy<Selector> = Lazy::new(|| sel("h4"));

pub fn profile() -> SiteProfile {
    let seed = Url::parse(SEED_URL).expect("static seed url");
    SiteProfile::new(NAME, seed, PRIORITY_FIELDS)
        .link_stage(Brands)
        .link_stage(Models)
        .link_stage(Variants)
        .detail_stage(Car)
        .with_backfill(UrlBackfill {
            brand_from_end: 4,
            model_from_end: 3,
            min_parts: 6,
        })
}

/// Seed page: brand pages linked from section headings.
pub struct Brands;

impl LinkExtractor for Brands {
    fn stage(&self) -> Stage {
        Stage::Seed
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        if doc.select(&H3_ANCHOR).next().is_none() {
            return LinkExtraction::missing_container();
        }
        let mut out = LinkExtraction::default();
        for a in doc.select(&H3_ANCHOR) {
            let href = a.value().attr("href").unwrap_or_default();
            if !href.starts_with(BRAND_PREFIX) {
                continue;
            }
            let name = collapsed_text(a);
            if name.chars().count() <= 1 {
                out.skipped += 1;
                continue;
            }
            if let Some(url) = resolve(base, href) {
                out.links.push(Link::new(Stage::Seed, url));
            }
        }
        out
    }
}

/// Brand page: model tiles (anchors wrapping a spec box).
pub struct Models;

impl LinkExtractor for Models {
    fn stage(&self) -> Stage {
        Stage::Brand
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        let mut out = LinkExtraction::default();
        let mut candidates = 0;
        for a in doc.select(&ANCHOR) {
            let href = a.value().attr("href").unwrap_or_default();
            let is_model = href.starts_with(MODEL_PATH)
                || href.starts_with(&format!("{SEED_URL}{MODEL_PATH}"));
            if !is_model {
                continue;
            }
            candidates += 1;
            if a.select(&SPEC_BOX).next().is_none() {
                continue;
            }
            if let Some(url) = resolve(base, href) {
                out.links.push(Link::new(Stage::Brand, url));
            }
        }
        out.container_missing = candidates == 0;
        out
    }
}

/// Model page: one detail link per listed car.
pub struct Variants;

impl LinkExtractor for Variants {
    fn stage(&self) -> Stage {
        Stage::Model
    }

    fn extract_links(&self, body: &str, base: &Url) -> LinkExtraction {
        let doc = Html::parse_document(body);
        if doc.select(&CAR_TITLE_ANCHOR).next().is_none() {
            return LinkExtraction::missing_container();
        }
        let mut out = LinkExtraction::default();
        for a in doc.select(&CAR_TITLE_ANCHOR) {
            let href = a.value().attr("href").unwrap_or_default();
            if !href.contains(DETAIL_PATH) {
                out.skipped += 1;
                continue;
            }
            if let Some(url) = resolve(base, href) {
                out.links.push(Link::new(Stage::Model, url));
            }
        }
        out
    }
}

/// Version name from a page title such as
/// `"Abarth 124 Spider (Roadster) 124 GT 2018,2019 Specs"`.
///
/// Drops the word `Specs`, then keeps everything after the first three words.
/// Titles of three words or fewer carry no version.
pub fn version_from_title(title: &str) -> Option<String> {
    let cleaned = title.replace("Specs", "");
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() <= 3 {
        return None;
    }
    Some(words[3..].join(" ").trim_matches(',').to_string())
}

/// Fold the site's label variants into canonical column names.
fn canonical_field(label: &str, value: &str) -> (String, String) {
    if label.contains("Power (hp)") || label.to_lowercase().contains("horsepower") {
        return ("Power (hp)".to_string(), value.to_string());
    }
    if label == "Curb weight kg -lbs total" {
        let kg = value.split_whitespace().next().unwrap_or_default();
        return ("Curb weight (kg)".to_string(), kg.to_string());
    }
    (label.to_string(), value.to_string())
}

/// Detail page: URL, version and every section table.
pub struct Car;

impl RecordExtractor for Car {
    fn extract_record(&self, body: &str, page: &Url) -> Option<Record> {
        let doc = Html::parse_document(body);
        let mut record = Record::new();
        record.insert("URL", page.as_str());

        if let Some(version) = doc
            .select(&TITLE)
            .next()
            .and_then(|h5| version_from_title(&collapsed_text(h5)))
        {
            record.insert("Version", version);
        }

        for section in doc.select(&SECTION) {
            for row in section.select(&ROW) {
                let (Some(th), Some(td)) = (row.select(&TH).next(), row.select(&TD).next()) else {
                    continue;
                };
                let label = collapsed_text(th);
                let label = label.trim_end_matches(':').trim();
                let value = match td.select(&H4).next() {
                    Some(h4) => collapsed_text(h4),
                    None => collapsed_text(td),
                };
                let (name, value) = canonical_field(label, &value);
                record.insert(name, value);
            }
        }

        let record = COMPLETENESS.check(record, page)?;
        info!(
            brand = record.get("Brand").unwrap_or("?"),
            model = record.get("Model").unwrap_or("?"),
            version = record.get("Version").unwrap_or("?"),
            "harvested car"
        );
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_version_from_title() {
        assert_eq!(
            version_from_title("Abarth 124 Spider (Roadster) 124 GT 2018,2019,2020 Specs").as_deref(),
            Some("(Roadster) 124 GT 2018,2019,2020")
        );
        assert_eq!(version_from_title("Audi A4 Specs"), None);
        assert_eq!(version_from_title("Kia Rio 1.4 2021,").as_deref(), Some("2021"));
    }

    #[test]
    fn test_brands_filter_by_prefix_and_name() {
        let html = r#"
            <h3><a href="https://www.thecarspec.net/model/audi">Audi</a></h3>
            <h3><a href="https://www.thecarspec.net/model/x">X</a></h3>
            <h3><a href="https://www.thecarspec.net/news/1">News</a></h3>
            <p><a href="https://www.thecarspec.net/model/bmw">BMW</a></p>"#;
        let out = Brands.extract_links(html, &url(SEED_URL));
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.links[0].url().as_str(), "https://www.thecarspec.net/model/audi");
        assert!(!out.container_missing);
    }

    #[test]
    fn test_models_need_spec_box() {
        let html = r#"
            <a href="/cars/audi-a4"><div class="spec-box">A4</div></a>
            <a href="/cars/audi-a6">A6 text only</a>
            <a href="https://www.thecarspec.net/cars/audi-q5"><div class="spec-box">Q5</div></a>
            <a href="/other/x"><div class="spec-box">no</div></a>"#;
        let out = Models.extract_links(html, &url("https://www.thecarspec.net/model/audi"));
        let urls: Vec<&str> = out.links.iter().map(|l| l.url().as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.thecarspec.net/cars/audi-a4",
                "https://www.thecarspec.net/cars/audi-q5"
            ]
        );
    }

    #[test]
    fn test_variants_only_detail_links() {
        let html = r#"
            <div class="individual-car-title"><a href="/car-detail/audi/a4/2020/1">A4 2.0</a></div>
            <div class="individual-car-title"><a href="/compare/1">compare</a></div>"#;
        let out = Variants.extract_links(html, &url("https://www.thecarspec.net/cars/audi-a4"));
        assert_eq!(out.links.len(), 1);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn test_pages_without_candidate_anchors_report_missing_container() {
        let page = "<html><body><p>Under maintenance</p><a href=\"/about\">About</a></body></html>";
        let seed = Brands.extract_links(page, &url(SEED_URL));
        let models = Models.extract_links(page, &url("https://www.thecarspec.net/model/audi"));
        let variants = Variants.extract_links(page, &url("https://www.thecarspec.net/cars/audi-a4"));
        assert!(seed.container_missing && seed.links.is_empty());
        assert!(models.container_missing && models.links.is_empty());
        assert!(variants.container_missing && variants.links.is_empty());

        // Model anchors without a spec box are still the right container.
        let text_only = r#"<a href="/cars/audi-a6">A6 text only</a>"#;
        let out = Models.extract_links(text_only, &url("https://www.thecarspec.net/model/audi"));
        assert!(!out.container_missing);
        assert!(out.links.is_empty());
    }

    fn detail_page(rows: &str) -> String {
        format!(
            r#"<html><body><h5>Audi A4 Sedan 2.0 TFSI 2020 Specs</h5>
               <div class="car-details-discription"><h3>General</h3><table>{rows}</table></div>
               </body></html>"#
        )
    }

    #[test]
    fn test_car_maps_labels_and_keeps_first_value() {
        let html = detail_page(
            r#"<tr><th>Brand:</th><td><h4>Audi</h4><p>ignored</p></td></tr>
               <tr><th>Model</th><td>A4</td></tr>
               <tr><th>Max horsepower</th><td> 190 </td></tr>
               <tr><th>Curb weight kg -lbs total</th><td>1450 kg 3197 lbs</td></tr>
               <tr><th>Fuel type</th><td>Petrol   (Gasoline)</td></tr>
               <tr><th>Brand</th><td>Dup</td></tr>
               <tr><th>lonely label</th></tr>"#,
        );
        let page = url("https://www.thecarspec.net/car-detail/audi/a4/2020/1");
        let record = Car.extract_record(&html, &page).unwrap();

        assert_eq!(record.get("URL"), Some(page.as_str()));
        assert_eq!(record.get("Version"), Some("2.0 TFSI 2020"));
        assert_eq!(record.get("Brand"), Some("Audi"));
        assert_eq!(record.get("Power (hp)"), Some("190"));
        assert_eq!(record.get("Curb weight (kg)"), Some("1450"));
        assert_eq!(record.get("Fuel type"), Some("Petrol (Gasoline)"));
        assert_eq!(record.len(), 7);
    }

    #[test]
    fn test_car_below_completeness_is_none() {
        let html = detail_page("<tr><th>Brand</th><td>Audi</td></tr>");
        let page = url("https://www.thecarspec.net/car-detail/audi/a4/2020/1");
        assert!(Car.extract_record(&html, &page).is_none());
    }
}
