//! Viability filter and scam heuristic.
//!
//! The filter is allow-by-default: an offer is only rejected when it is too
//! old, mentions a forbidden word, or lies in a forbidden area. Rules are
//! checked in that order and the first hit decides.

use chrono::{Duration, NaiveDateTime};
use std::fmt;
use tracing::info;

use crate::offer::Offer;

/// Private offers at or below this rent per m² are considered bait.
pub const DEFAULT_SCAM_PRICE_PER_SQM: f64 = 10.0;

pub const REASON_PRIVATE: &str = "Privater Anbieter";
pub const REASON_TOO_CHEAP: &str = "Zu günstig";

#[derive(Debug, Clone, PartialEq)]
pub struct ViabilityPolicy {
    /// Offers older than this are ignored. Offers without a time always pass.
    pub max_age: Duration,
    /// Lowercased substrings rejected in title or description.
    pub forbidden_words: Vec<String>,
    /// Lowercased substrings rejected in title, description or location.
    pub forbidden_areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooOld { age: Duration },
    ForbiddenWord(String),
    ForbiddenArea(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::TooOld { age } => {
                write!(f, "too old ({}h {}m)", age.num_hours(), age.num_minutes() % 60)
            }
            RejectReason::ForbiddenWord(w) => write!(f, "forbidden word `{w}`"),
            RejectReason::ForbiddenArea(a) => write!(f, "forbidden area `{a}`"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viability {
    Viable,
    Rejected(RejectReason),
}

impl ViabilityPolicy {
    pub fn new(max_age: Duration, forbidden_words: Vec<String>, forbidden_areas: Vec<String>) -> Self {
        Self {
            max_age,
            forbidden_words: lowercase_all(forbidden_words),
            forbidden_areas: lowercase_all(forbidden_areas),
        }
    }

    /// Only the staleness rule.
    pub fn allow_all(max_age: Duration) -> Self {
        Self::new(max_age, Vec::new(), Vec::new())
    }

    /// Pure evaluation, no logging.
    pub fn evaluate(&self, offer: &Offer, now: NaiveDateTime) -> Viability {
        if let Some(posted_at) = offer.posted_at {
            let age = now - posted_at;
            if age > self.max_age {
                return Viability::Rejected(RejectReason::TooOld { age });
            }
        }

        let title = offer.title.to_lowercase();
        let description = offer.description.as_deref().unwrap_or_default().to_lowercase();

        if let Some(word) = self
            .forbidden_words
            .iter()
            .find(|w| title.contains(w.as_str()) || description.contains(w.as_str()))
        {
            return Viability::Rejected(RejectReason::ForbiddenWord(word.clone()));
        }

        let location = offer.location.to_lowercase();
        if let Some(area) = self.forbidden_areas.iter().find(|a| {
            title.contains(a.as_str()) || description.contains(a.as_str()) || location.contains(a.as_str())
        }) {
            return Viability::Rejected(RejectReason::ForbiddenArea(area.clone()));
        }

        Viability::Viable
    }

    /// `evaluate`, logging the reason when the offer is rejected.
    pub fn is_viable(&self, offer: &Offer, now: NaiveDateTime) -> bool {
        match self.evaluate(offer, now) {
            Viability::Viable => true,
            Viability::Rejected(reason) => {
                info!(source = %offer.source, id = %offer.id, title = %offer.title, %reason, "ignoring offer");
                false
            }
        }
    }
}

fn lowercase_all(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScamVerdict {
    pub is_scam: bool,
    pub reasons: Vec<String>,
}

/// Scam score for an offer with the given provider type, rent and size.
///
/// Only private offers can be scams. A private offer is flagged when its
/// price per m² cannot be checked, or when it is at or below
/// `max_price_per_sqm`. Reasons accumulate.
pub fn score_scam(
    is_private: bool,
    price: f64,
    size_sqm: Option<f64>,
    max_price_per_sqm: f64,
) -> ScamVerdict {
    if !is_private {
        return ScamVerdict::default();
    }

    let mut reasons = vec![REASON_PRIVATE.to_string()];
    let suspicious = match size_sqm.filter(|s| *s > 0.0) {
        None => true,
        Some(size) => {
            let too_cheap = price / size <= max_price_per_sqm;
            if too_cheap {
                reasons.push(REASON_TOO_CHEAP.to_string());
            }
            too_cheap
        }
    };

    if suspicious {
        ScamVerdict {
            is_scam: true,
            reasons,
        }
    } else {
        ScamVerdict::default()
    }
}
