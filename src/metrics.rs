use std::net::SocketAddr;

use anyhow::Context;
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::AppConfig;
use crate::offer::SourceKind;

/// Install the Prometheus recorder and serve `/metrics` on `listen`.
///
/// Must run inside the tokio runtime; the listener is spawned onto it.
pub fn install_exporter(listen: SocketAddr, cfg: &AppConfig) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()
        .context("prometheus: install recorder")?;

    // Static gauges describing the running configuration
    gauge!("scheduler_interval_secs").set(cfg.scheduler.interval_secs as f64);
    let enabled = SourceKind::ALL
        .iter()
        .filter(|kind| cfg.sources.get(**kind).enabled)
        .count();
    gauge!("sources_enabled").set(enabled as f64);

    tracing::info!(%listen, "metrics exporter listening");
    Ok(())
}
