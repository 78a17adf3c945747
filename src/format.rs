//! Telegram message bodies for offers.
//!
//! Messages use Telegram's legacy Markdown. Interpolated values are stripped
//! of the markup characters `_ * [ ] \``; links get them percent-encoded
//! instead so they still resolve.

use std::fmt::Write as _;

use url::Url;

use crate::offer::Offer;

/// Characters that open or close legacy Markdown entities.
pub const MARKUP_CHARS: [char; 5] = ['_', '*', '[', ']', '`'];

/// Strip markup characters and collapse the whitespace left behind.
pub fn sanitize_text(s: &str) -> String {
    let stripped: String = s.chars().filter(|c| !MARKUP_CHARS.contains(c)).collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// URL characters Telegram would read as markup or as the end of the link.
/// `url` leaves them unencoded since they are legal in paths and queries.
const LINK_ESCAPED: [char; 6] = ['_', '*', '[', ']', '`', ')'];

/// Normalize `link` and percent-encode the characters that would break the
/// `[title](link)` entity.
pub fn sanitize_link(link: &str) -> String {
    let Ok(url) = Url::parse(link.trim()) else {
        // Not a usable URL anyway; keep it inert.
        return urlencoding::encode(&sanitize_text(link)).into_owned();
    };

    let mut out = String::with_capacity(url.as_str().len());
    for c in url.as_str().chars() {
        if LINK_ESCAPED.contains(&c) {
            let _ = write!(out, "%{:02X}", c as u32);
        } else {
            out.push(c);
        }
    }
    out
}

/// `950` or `1234.56`.
fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{price:.0}")
    } else {
        format!("{price:.2}")
    }
}

fn join_clean(items: &[String]) -> String {
    items
        .iter()
        .map(|s| sanitize_text(s))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render `offer` as a message. Scam suspects get a short warning only.
pub fn format_offer(offer: &Offer) -> String {
    let title = sanitize_text(&offer.title);
    let link = sanitize_link(&offer.link);

    if offer.is_scam {
        return format!(
            "⚠️ *Betrugsverdacht ({})*: [{}]({})\n*Gründe:* {}\n",
            offer.source,
            title,
            link,
            join_clean(&offer.scam_reasons)
        );
    }

    let mut text = String::new();
    let _ = writeln!(text, "*{}*: [{}]({})", offer.source, title, link);
    let _ = writeln!(text, "*Gegend:* {}", sanitize_text(&offer.location));
    let _ = writeln!(text, "*Preis:* {} €", format_price(offer.price));
    if !offer.key_data.is_empty() {
        let _ = writeln!(text, "*Eckdaten:* {}", join_clean(&offer.key_data));
    }
    if let Some(equipment) = offer.equipment.as_deref().filter(|e| !e.is_empty()) {
        let _ = writeln!(text, "*Ausstattung:* {}", join_clean(equipment));
    }

    let raw_time = sanitize_text(&offer.raw_posted_at);
    match (offer.posted_at, raw_time.is_empty()) {
        (Some(ts), true) => {
            let _ = writeln!(text, "*Datum:* {}", ts.format("%d.%m. %H:%M"));
        }
        (Some(ts), false) => {
            let _ = writeln!(text, "*Datum:* {} ({})", raw_time, ts.format("%d.%m. %H:%M"));
        }
        (None, false) => {
            let _ = writeln!(text, "*Datum:* {raw_time}");
        }
        (None, true) => {}
    }

    if let Some(description) = offer.description.as_deref() {
        let description = sanitize_text(description);
        if !description.is_empty() {
            let _ = write!(text, "\n---\n\n{description}\n");
        }
    }

    text
}
