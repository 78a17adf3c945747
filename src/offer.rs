// src/offer.rs
//! The normalized rental offer flowing through the pipeline.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use url::Url;

/// Listing sites we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Kleinanzeigen,
    Immowelt,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Kleinanzeigen, SourceKind::Immowelt];

    /// Display name, also used as the known-key store section.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Kleinanzeigen => "Kleinanzeigen",
            SourceKind::Immowelt => "Immowelt",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    /// Last path segment of `link`. Unique per source only.
    pub id: String,
    pub source: SourceKind,
    pub link: String,

    pub title: String,
    pub description: Option<String>,
    pub location: String,
    /// Monthly rent in EUR.
    pub price: f64,

    pub posted_at: Option<NaiveDateTime>,
    /// Time text as shown by the site, kept for display.
    pub raw_posted_at: String,

    pub key_data: Vec<String>,
    pub equipment: Option<Vec<String>>,

    pub is_scam: bool,
    pub scam_reasons: Vec<String>,
}

impl Offer {
    /// Start an offer from its listing URL.
    ///
    /// Returns `None` when no id can be derived, so an offer without an id
    /// never exists.
    pub fn from_url(source: SourceKind, url: &Url) -> Option<Self> {
        let id = id_from_url(url)?;
        Some(Self {
            id,
            source,
            link: url.to_string(),
            title: String::new(),
            description: None,
            location: String::new(),
            price: 0.0,
            posted_at: None,
            raw_posted_at: String::new(),
            key_data: Vec::new(),
            equipment: None,
            is_scam: false,
            scam_reasons: Vec::new(),
        })
    }

    /// `from_url` for an absolute URL given as text.
    #[cfg(test)]
    pub(crate) fn from_link(source: SourceKind, link: &str) -> Option<Self> {
        Self::from_url(source, &Url::parse(link.trim()).ok()?)
    }
}

/// Resolve a scraped `href` against the site root.
///
/// Empty hrefs, in-page anchors and non-http targets (`javascript:`,
/// `mailto:`) are not links to a listing.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Last non-empty path segment. Query and fragment are ignored.
pub fn id_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_from_link(link: &str) -> Option<String> {
        id_from_url(&Url::parse(link).ok()?)
    }

    #[test]
    fn id_is_last_path_segment() {
        assert_eq!(
            id_from_link("https://www.kleinanzeigen.de/s-anzeige/schoene-wohnung/2712345678-203-9409")
                .as_deref(),
            Some("2712345678-203-9409")
        );
        assert_eq!(
            id_from_link("https://www.immowelt.de/expose/2abc3de/?utm=x").as_deref(),
            Some("2abc3de")
        );
    }

    #[test]
    fn no_id_no_offer() {
        assert!(id_from_link("").is_none());
        assert!(id_from_link("https://www.immowelt.de").is_none());
        assert!(id_from_link("https://www.immowelt.de/#top").is_none());
        assert!(Offer::from_link(SourceKind::Immowelt, "/expose/2abc").is_none());
    }

    #[test]
    fn hrefs_resolve_against_the_site() {
        let base = Url::parse("https://www.immowelt.de").unwrap();
        let resolve = |href| resolve_link(&base, href).map(|u| u.to_string());

        assert_eq!(resolve("/expose/2abc").as_deref(), Some("https://www.immowelt.de/expose/2abc"));
        assert_eq!(resolve("expose/2xyz").as_deref(), Some("https://www.immowelt.de/expose/2xyz"));
        assert_eq!(
            resolve("//www.immowelt.de/expose/2def").as_deref(),
            Some("https://www.immowelt.de/expose/2def")
        );
        assert_eq!(
            resolve("https://www.immowelt.de/expose/2ghi?ref=list").as_deref(),
            Some("https://www.immowelt.de/expose/2ghi?ref=list")
        );
    }

    #[test]
    fn placeholder_hrefs_are_not_links() {
        let base = Url::parse("https://www.kleinanzeigen.de").unwrap();
        assert!(resolve_link(&base, "").is_none());
        assert!(resolve_link(&base, "  ").is_none());
        assert!(resolve_link(&base, "#").is_none());
        assert!(resolve_link(&base, "#contact").is_none());
        assert!(resolve_link(&base, "javascript:void(0)").is_none());
        assert!(resolve_link(&base, "mailto:info@example.org").is_none());
    }
}
