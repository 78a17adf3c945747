// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod ingest;
pub mod known_keys;
pub mod metrics;
pub mod notify;
pub mod offer;
pub mod pipeline;

// ---- Re-exports for stable public API ----
pub use crate::config::AppConfig;
pub use crate::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
pub use crate::known_keys::KnownKeys;
pub use crate::offer::{Offer, SourceKind};
pub use crate::pipeline::{CycleReport, Pipeline, SourceDef, SourceReport};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingCfg;

/// Default filter when `RUST_LOG` is unset. Parser and HTTP internals stay at warn.
pub fn default_log_filter(debug: bool) -> String {
    let own = if debug { "flat_notifier=debug,info" } else { "flat_notifier=info,warn" };
    format!("{own},hyper=warn,reqwest=warn,html5ever=warn,selectors=warn")
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the config.
pub fn init_tracing(cfg: &LoggingCfg) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(cfg.debug)));

    let registry = tracing_subscriber::registry().with(filter);
    if cfg.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}
