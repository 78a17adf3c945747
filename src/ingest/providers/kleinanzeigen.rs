// src/ingest/providers/kleinanzeigen.rs
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ExtractError, FieldParseError};
use crate::ingest::types::{collect_items, ItemResult, OfferExtractor};
use crate::ingest::{first_text, parse_posted_time, parse_price, scrub_zero_width, selector};
use crate::offer::{resolve_link, Offer, SourceKind};

pub const BASE_URL: &str = "https://www.kleinanzeigen.de";

static BASE: Lazy<Url> = Lazy::new(|| Url::parse(BASE_URL).expect("base url"));

const CONTAINER: &str = "div.l-container-row.contentbox-unpadded.no-bg";

static SEL_CONTAINER: Lazy<Selector> = Lazy::new(|| selector(CONTAINER));
static SEL_LIST: Lazy<Selector> = Lazy::new(|| selector("ul"));
static SEL_ITEM: Lazy<Selector> = Lazy::new(|| selector("li"));
static SEL_ARTICLE: Lazy<Selector> = Lazy::new(|| selector("article"));
static SEL_LOCATION: Lazy<Selector> = Lazy::new(|| selector(".aditem-main--top--left"));
static SEL_TIME: Lazy<Selector> = Lazy::new(|| selector(".aditem-main--top--right"));
static SEL_TITLE: Lazy<Selector> = Lazy::new(|| selector(".aditem-main--middle h2"));
static SEL_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| selector(".aditem-main--middle--description"));
static SEL_PRICE: Lazy<Selector> =
    Lazy::new(|| selector(".aditem-main--middle--price-shipping--price"));
static SEL_TAGS: Lazy<Selector> = Lazy::new(|| selector(".aditem-main--bottom span.simpletag"));

/// Search result pages of kleinanzeigen.de (`s-wohnung-mieten`).
#[derive(Debug, Default, Clone)]
pub struct KleinanzeigenExtractor;

impl KleinanzeigenExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extract_item(&self, item: ElementRef<'_>, now: NaiveDateTime) -> ItemResult {
        // List items without an article are ad slots and separators.
        let Some(article) = item.select(&SEL_ARTICLE).next() else {
            return Ok(None);
        };
        let Some(href) = article.value().attr("data-href") else {
            return Ok(None);
        };
        let Some(mut offer) = resolve_link(&BASE, href)
            .and_then(|url| Offer::from_url(SourceKind::Kleinanzeigen, &url))
        else {
            return Ok(None);
        };

        offer.title = first_text(item, &SEL_TITLE)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FieldParseError::missing("title"))?;

        let raw_price =
            first_text(item, &SEL_PRICE).ok_or_else(|| FieldParseError::missing("price"))?;
        offer.price = parse_price(&raw_price)?;

        offer.location = first_text(item, &SEL_LOCATION).unwrap_or_default();

        offer.raw_posted_at = first_text(item, &SEL_TIME).unwrap_or_default();
        offer.posted_at = parse_posted_time(&offer.raw_posted_at, now.date())?;

        offer.description = first_text(item, &SEL_DESCRIPTION).filter(|d| !d.is_empty());
        offer.key_data = item
            .select(&SEL_TAGS)
            .map(crate::ingest::element_text)
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Some(offer))
    }
}

impl OfferExtractor for KleinanzeigenExtractor {
    fn source(&self) -> SourceKind {
        SourceKind::Kleinanzeigen
    }

    fn extract(&self, html: &str, now: NaiveDateTime) -> Result<Vec<Offer>, ExtractError> {
        let document = Html::parse_document(&scrub_zero_width(html));

        let container = document
            .select(&SEL_CONTAINER)
            .next()
            .ok_or(ExtractError::Structural {
                site: SourceKind::Kleinanzeigen,
                selector: CONTAINER,
            })?;

        // No result list inside the container means no results.
        let Some(list) = container.select(&SEL_LIST).next() else {
            return Ok(Vec::new());
        };

        Ok(collect_items(
            SourceKind::Kleinanzeigen,
            list.select(&SEL_ITEM),
            |item| self.extract_item(item, now),
        ))
    }
}
