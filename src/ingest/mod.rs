// src/ingest/mod.rs
pub mod fetch;
pub mod providers;
pub mod scheduler;
pub mod types;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::error::FieldParseError;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

// "Heute, 12:15" / "Gestern, 18:01"
static RE_RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<day>\p{L}+),\s*(?P<h>\d{1,2}):(?P<m>\d{2})$").expect("relative time regex")
});

// "74,5 m²", "124.2 m²", "60 m²"
static RE_AREA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<int>\d+)(?:[.,](?P<frac>\d{1,2}))?\s*m²").expect("area regex")
});

/// Compile a selector that is part of the source code.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector `{css}`: {e}"))
}

/// Remove zero-width spaces that some sites sprinkle into their markup.
pub fn scrub_zero_width(html: &str) -> String {
    html.replace("&#8203;", "").replace('\u{200B}', "")
}

/// Normalize text: drop zero-width characters, collapse whitespace, trim.
pub fn clean_text(s: &str) -> String {
    let out = s.replace(['\u{200B}', '\u{FEFF}'], "");
    RE_WS.replace_all(&out, " ").trim().to_string()
}

/// All text below `el`, text nodes joined by a space and cleaned.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// First match of `sel` below `el`, as cleaned text.
pub(crate) fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel).next().map(element_text)
}

/// Parse a locale formatted price like `1.234,56 €` or `950 € VB`.
///
/// Currency markers are removed, `.` is a thousands separator and `,` the
/// decimal separator. Trailing words (`VB`, `zzgl. NK`) are ignored.
pub fn parse_price(raw: &str) -> Result<f64, FieldParseError> {
    let stripped = raw.replace('€', " ").replace("EUR", " ");
    let digits: String = stripped
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ',') || c.is_whitespace())
        .filter(|c| !c.is_whitespace())
        .collect();

    let normalized = digits.replace('.', "").replace(',', ".");
    if normalized.is_empty() {
        return Err(FieldParseError::new("price", format!("no number in {raw:?}")));
    }

    let value: f64 = normalized
        .parse()
        .map_err(|e| FieldParseError::new("price", format!("{raw:?}: {e}")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(FieldParseError::new("price", format!("{raw:?} out of range")));
    }
    Ok(value)
}

/// Living area in m² from a fact like `74,5 m²`. `None` when the text holds no area.
pub fn parse_area(raw: &str) -> Option<f64> {
    let caps = RE_AREA.captures(raw)?;
    let int = caps.name("int")?.as_str();
    let value = match caps.name("frac") {
        Some(frac) => format!("{int}.{}", frac.as_str()),
        None => int.to_string(),
    };
    value.parse().ok().filter(|v: &f64| *v > 0.0)
}

/// Resolve a posting time as shown on Kleinanzeigen.
///
/// - `""` → unknown (`None`)
/// - `10.05.2024` → that date at midnight
/// - `Heute, 12:15` / `Gestern, 18:01` → relative to `today`
pub fn parse_posted_time(
    raw: &str,
    today: NaiveDate,
) -> Result<Option<NaiveDateTime>, FieldParseError> {
    let raw = clean_text(raw);
    if raw.is_empty() {
        return Ok(None);
    }

    if !raw.contains(':') {
        let date = NaiveDate::parse_from_str(&raw, "%d.%m.%Y")
            .map_err(|e| FieldParseError::new("posted_at", format!("{raw:?}: {e}")))?;
        return Ok(date.and_hms_opt(0, 0, 0));
    }

    let caps = RE_RELATIVE
        .captures(&raw)
        .ok_or_else(|| FieldParseError::new("posted_at", format!("unexpected format {raw:?}")))?;

    let day = match caps["day"].to_lowercase().as_str() {
        "heute" => today,
        "gestern" => today
            .pred_opt()
            .ok_or_else(|| FieldParseError::new("posted_at", "date underflow"))?,
        other => {
            return Err(FieldParseError::new(
                "posted_at",
                format!("unknown relative day {other:?}"),
            ))
        }
    };

    let hour: u32 = caps["h"].parse().unwrap_or(u32::MAX);
    let minute: u32 = caps["m"].parse().unwrap_or(u32::MAX);
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| FieldParseError::new("posted_at", format!("invalid time in {raw:?}")))?;

    Ok(Some(day.and_time(time)))
}
