//! Flat notifier: binary entrypoint.
//! Loads the config, then polls the listing sites on a schedule and posts new
//! offers to Telegram. `flat-notifier once` runs a single cycle and exits.

use std::sync::Arc;

use anyhow::Context;
use flat_notifier::{init_tracing, spawn_scheduler, AppConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev (NOTIFIER_CONFIG_PATH, TELEGRAM_API_KEY, RUST_LOG).
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::load_default()?;
    init_tracing(&cfg.logging);

    if let Some(listen) = cfg.metrics.listen {
        flat_notifier::metrics::install_exporter(listen, &cfg)?;
    }

    let pipeline = Arc::new(cfg.build_pipeline().context("building pipeline")?);
    info!(sources = ?pipeline.source_kinds(), "pipeline ready");

    if std::env::args().nth(1).as_deref() == Some("once") {
        let report = pipeline.run_cycle().await;
        info!(sent = report.total_sent(), "single cycle finished");
        return Ok(());
    }

    let handle = spawn_scheduler(pipeline, cfg.scheduler);

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    warn!("shutting down");
    handle.abort();
    Ok(())
}
