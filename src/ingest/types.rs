// src/ingest/types.rs
use chrono::NaiveDateTime;
use scraper::ElementRef;

use crate::error::{ExtractError, FieldParseError};
use crate::offer::{Offer, SourceKind};

/// Turns a listing page of one site into offers.
///
/// `extract` is synchronous on purpose: the parsed DOM is not `Send` and
/// must not live across an `.await`.
pub trait OfferExtractor: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Whole page. `Err` only when the page structure is gone; malformed
    /// listings are logged and dropped.
    fn extract(&self, html: &str, now: NaiveDateTime) -> Result<Vec<Offer>, ExtractError>;
}

/// Outcome of reading one listing element.
pub(crate) type ItemResult = Result<Option<Offer>, FieldParseError>;

/// Collect offers from item elements, dropping (and logging) the broken ones.
pub(crate) fn collect_items<'a, I, F>(source: SourceKind, items: I, mut extract_item: F) -> Vec<Offer>
where
    I: IntoIterator<Item = ElementRef<'a>>,
    F: FnMut(ElementRef<'a>) -> ItemResult,
{
    let mut offers = Vec::new();
    let mut skipped = 0usize;
    let mut dropped = 0usize;

    for item in items {
        match extract_item(item) {
            Ok(Some(offer)) => offers.push(offer),
            Ok(None) => skipped += 1,
            Err(e) => {
                dropped += 1;
                tracing::warn!(
                    source = %source,
                    error = %e,
                    fragment = %item.html(),
                    "dropping malformed listing"
                );
            }
        }
    }

    metrics::counter!("offers_dropped_total", "source" => source.as_str()).increment(dropped as u64);
    tracing::debug!(
        source = %source,
        offers = offers.len(),
        skipped,
        dropped,
        "extracted listings"
    );
    offers
}
