pub mod immowelt;
pub mod kleinanzeigen;

use crate::ingest::types::OfferExtractor;
use crate::offer::SourceKind;

/// Extractor for a site with default settings.
pub fn extractor_for(kind: SourceKind, scam_price_per_sqm: f64) -> Box<dyn OfferExtractor> {
    match kind {
        SourceKind::Kleinanzeigen => Box::new(kleinanzeigen::KleinanzeigenExtractor::new()),
        SourceKind::Immowelt => {
            Box::new(immowelt::ImmoweltExtractor::new().with_scam_threshold(scam_price_per_sqm))
        }
    }
}
