// src/ingest/providers/immowelt.rs
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::classify::{score_scam, DEFAULT_SCAM_PRICE_PER_SQM};
use crate::error::{ExtractError, FieldParseError};
use crate::ingest::types::{collect_items, ItemResult, OfferExtractor};
use crate::ingest::{element_text, first_text, parse_area, parse_price, selector};
use crate::offer::{resolve_link, Offer, SourceKind};

pub const BASE_URL: &str = "https://www.immowelt.de";

static BASE: Lazy<Url> = Lazy::new(|| Url::parse(BASE_URL).expect("base url"));

/// Provider label of listings posted by private persons.
pub const PRIVATE_PROVIDER: &str = "Privater Anbieter";

const CONTAINER: &str = r#"div[class*="SearchResults-"]"#;

static SEL_CONTAINER: Lazy<Selector> = Lazy::new(|| selector(CONTAINER));
static SEL_ITEM: Lazy<Selector> = Lazy::new(|| selector(r#"div[class*="EstateItem-"]"#));
static SEL_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static SEL_FACTS_MAIN: Lazy<Selector> = Lazy::new(|| selector(r#"div[class*="FactsMain-"]"#));
static SEL_KEY_FACTS: Lazy<Selector> =
    Lazy::new(|| selector(r#"div[class*="KeyFacts-"] > div"#));
static SEL_TITLE: Lazy<Selector> = Lazy::new(|| selector("h2"));
static SEL_ICON_FACT: Lazy<Selector> = Lazy::new(|| selector(r#"div[class*="IconFact-"]"#));
static SEL_ICON: Lazy<Selector> = Lazy::new(|| selector("i"));
static SEL_SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));
static SEL_PROVIDER: Lazy<Selector> =
    Lazy::new(|| selector(r#"div[class*="ProviderName-"] span"#));

/// Search result pages of immowelt.de. Listings carry no posting time, but
/// private scam offers are common, so every offer gets a scam score.
#[derive(Debug, Clone)]
pub struct ImmoweltExtractor {
    scam_price_per_sqm: f64,
}

impl Default for ImmoweltExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImmoweltExtractor {
    pub fn new() -> Self {
        Self {
            scam_price_per_sqm: DEFAULT_SCAM_PRICE_PER_SQM,
        }
    }

    pub fn with_scam_threshold(mut self, price_per_sqm: f64) -> Self {
        self.scam_price_per_sqm = price_per_sqm;
        self
    }

    fn extract_item(&self, item: ElementRef<'_>) -> ItemResult {
        // The whole listing is one big link; anything else is decoration.
        let Some(link_el) = item.select(&SEL_LINK).next() else {
            return Ok(None);
        };
        let Some(href) = link_el.value().attr("href") else {
            return Ok(None);
        };
        let Some(mut offer) = resolve_link(&BASE, href)
            .and_then(|url| Offer::from_url(SourceKind::Immowelt, &url))
        else {
            return Ok(None);
        };

        let facts_main = link_el
            .select(&SEL_FACTS_MAIN)
            .next()
            .ok_or_else(|| FieldParseError::missing("facts"))?;

        let mut price = None;
        let mut flat_size = None;
        for fact_el in facts_main.select(&SEL_KEY_FACTS) {
            let fact = element_text(fact_el);
            if fact_el.value().attr("data-test") == Some("price") {
                price = Some(parse_price(&fact)?);
                continue;
            }
            if fact.contains("m²") {
                flat_size = parse_area(&fact);
            }
            if !fact.is_empty() {
                offer.key_data.push(fact);
            }
        }
        offer.price = price.ok_or_else(|| FieldParseError::missing("price"))?;

        offer.title = first_text(facts_main, &SEL_TITLE)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FieldParseError::missing("title"))?;

        for fact in facts_main.select(&SEL_ICON_FACT) {
            let name = first_text(fact, &SEL_ICON).unwrap_or_default();
            let text = first_text(fact, &SEL_SPAN).unwrap_or_default();
            match name.as_str() {
                "location" => offer.location = text,
                "check" => {
                    let equipment: Vec<String> = text
                        .split(", ")
                        .map(str::trim)
                        .filter(|e| !e.is_empty() && *e != "..." && *e != "…")
                        .map(str::to_string)
                        .collect();
                    if !equipment.is_empty() {
                        offer.equipment = Some(equipment);
                    }
                }
                _ => {}
            }
        }

        let provider = first_text(link_el, &SEL_PROVIDER).unwrap_or_default();
        let verdict = score_scam(
            provider == PRIVATE_PROVIDER,
            offer.price,
            flat_size,
            self.scam_price_per_sqm,
        );
        offer.is_scam = verdict.is_scam;
        offer.scam_reasons = verdict.reasons;

        Ok(Some(offer))
    }
}

impl OfferExtractor for ImmoweltExtractor {
    fn source(&self) -> SourceKind {
        SourceKind::Immowelt
    }

    fn extract(&self, html: &str, _now: NaiveDateTime) -> Result<Vec<Offer>, ExtractError> {
        let document = Html::parse_document(html);

        let container = document
            .select(&SEL_CONTAINER)
            .next()
            .ok_or(ExtractError::Structural {
                site: SourceKind::Immowelt,
                selector: CONTAINER,
            })?;

        Ok(collect_items(
            SourceKind::Immowelt,
            container.select(&SEL_ITEM),
            |item| self.extract_item(item),
        ))
    }
}
