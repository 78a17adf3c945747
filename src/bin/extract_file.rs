//! Run an extractor over a saved listing page and print the formatted messages.
//!
//! Usage: `extract-file <kleinanzeigen|immowelt> <page.html>`

use anyhow::{bail, Context};
use chrono::Local;
use flat_notifier::classify::DEFAULT_SCAM_PRICE_PER_SQM;
use flat_notifier::format::format_offer;
use flat_notifier::ingest::providers::extractor_for;
use flat_notifier::SourceKind;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let (Some(site), Some(path)) = (args.next(), args.next()) else {
        bail!("usage: extract-file <kleinanzeigen|immowelt> <page.html>");
    };

    let kind = match site.to_ascii_lowercase().as_str() {
        "kleinanzeigen" => SourceKind::Kleinanzeigen,
        "immowelt" => SourceKind::Immowelt,
        other => bail!("unknown source {other:?}"),
    };

    let html = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let offers = extractor_for(kind, DEFAULT_SCAM_PRICE_PER_SQM)
        .extract(&html, Local::now().naive_local())?;

    for offer in &offers {
        println!("{}\n", format_offer(offer));
    }
    println!("extract-file: {} offers from {kind}", offers.len());
    Ok(())
}
