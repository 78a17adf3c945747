// src/config/mod.rs
//! Application configuration (`config/notifier.toml`).
//!
//! Every key is optional and falls back to its default. On first start a
//! default file is written and loading fails, so the operator gets a chance
//! to fill in the bot token and channel.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{ViabilityPolicy, DEFAULT_SCAM_PRICE_PER_SQM};
use crate::dispatch::Dispatcher;
use crate::ingest::fetch::{FetchRequest, HttpFetcher, DEFAULT_USER_AGENT};
use crate::ingest::providers::extractor_for;
use crate::ingest::scheduler::SchedulerCfg;
use crate::known_keys::{KnownKeys, DEFAULT_KNOWN_KEYS_PATH};
use crate::notify::telegram::TelegramNotifier;
use crate::notify::{LogNotifier, Notifier, SendOptions};
use crate::offer::SourceKind;
use crate::pipeline::{Pipeline, SourceDef};

pub const DEFAULT_CONFIG_PATH: &str = "config/notifier.toml";
pub const ENV_CONFIG_PATH: &str = "NOTIFIER_CONFIG_PATH";
pub const ENV_TELEGRAM_API_KEY: &str = "TELEGRAM_API_KEY";

pub const KLEINANZEIGEN_URL: &str = "https://www.kleinanzeigen.de/s-wohnung-mieten/hamburg/\
                                     anzeige:angebote/preis::1600/c203l9409+\
                                     wohnung_mieten.qm_d:65%2C+wohnung_mieten.zimmer_d:3%2C5";
pub const IMMOWELT_URL: &str = "https://www.immowelt.de/suche/hamburg/wohnungen/mieten\
                                ?ami=65&d=true&ffs=FITTED_KITCHEN&pma=1500&rmi=3&sd=DESC&sf=TIMESTAMP&sp=1";

fn default_forbidden_words() -> Vec<String> {
    ["untermiete", "zwischenmiete", "möbliert"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_forbidden_areas() -> Vec<String> {
    [
        "altengamme",
        "bramfeld",
        "finkenwerder",
        "hausbruch",
        "lohbrügge",
        "rahlstedt",
        "sasel",
        "schnelsen",
        "tonndorf",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub telegram: TelegramCfg,
    pub logging: LoggingCfg,
    pub scheduler: SchedulerCfg,
    pub http: HttpCfg,
    pub state: StateCfg,
    pub metrics: MetricsCfg,
    pub sources: SourcesCfg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramCfg {
    /// Bot token. "ENV" reads `TELEGRAM_API_KEY`; empty means dry run.
    pub api_key: String,
    pub target_channel: String,
    pub disable_link_preview: bool,
}

impl Default for TelegramCfg {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            target_channel: "your_chat_id".into(),
            disable_link_preview: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingCfg {
    pub debug: bool,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpCfg {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateCfg {
    pub known_keys_path: PathBuf,
}

impl Default for StateCfg {
    fn default() -> Self {
        Self {
            known_keys_path: PathBuf::from(DEFAULT_KNOWN_KEYS_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsCfg {
    /// Serve Prometheus metrics on this address, e.g. "127.0.0.1:9184".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesCfg {
    pub kleinanzeigen: SourceCfg,
    pub immowelt: SourceCfg,
}

impl SourcesCfg {
    pub fn get(&self, kind: SourceKind) -> &SourceCfg {
        match kind {
            SourceKind::Kleinanzeigen => &self.kleinanzeigen,
            SourceKind::Immowelt => &self.immowelt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCfg {
    pub enabled: bool,
    /// Search URL. Empty uses the built-in search.
    pub url: String,
    pub max_age_secs: i64,
    pub forbidden_words: Vec<String>,
    pub forbidden_areas: Vec<String>,
    pub scam_price_per_sqm: f64,
}

impl Default for SourceCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            max_age_secs: 2 * 3600,
            forbidden_words: default_forbidden_words(),
            forbidden_areas: default_forbidden_areas(),
            scam_price_per_sqm: DEFAULT_SCAM_PRICE_PER_SQM,
        }
    }
}

impl SourceCfg {
    pub fn url_for(&self, kind: SourceKind) -> &str {
        if !self.url.trim().is_empty() {
            return self.url.trim();
        }
        match kind {
            SourceKind::Kleinanzeigen => KLEINANZEIGEN_URL,
            SourceKind::Immowelt => IMMOWELT_URL,
        }
    }

    pub fn policy(&self) -> ViabilityPolicy {
        ViabilityPolicy::new(
            chrono::Duration::seconds(self.max_age_secs.max(0)),
            self.forbidden_words.clone(),
            self.forbidden_areas.clone(),
        )
    }
}

impl AppConfig {
    /// `$NOTIFIER_CONFIG_PATH`, else `config/notifier.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load_default() -> Result<Self> {
        Self::load_or_init(&Self::default_path())
    }

    /// Load `path`; if it does not exist, write the defaults there and fail.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::default().write_to(path)?;
            bail!(
                "no configuration found, wrote defaults to {}. Please adjust it and restart.",
                path.display()
            );
        }
        Self::load_from(path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;

        if cfg.telegram.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.telegram.api_key = std::env::var(ENV_TELEGRAM_API_KEY)
                .map_err(|_| anyhow!("Missing {ENV_TELEGRAM_API_KEY} env var"))?;
        }

        // Keep the scheduler in a usable range
        cfg.scheduler.interval_secs = cfg.scheduler.interval_secs.max(1);
        cfg.scheduler.max_concurrent_cycles = cfg.scheduler.max_concurrent_cycles.max(1);

        Ok(cfg)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let body = toml::to_string_pretty(self).context("serializing default config")?;
        std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Telegram when a token is configured, otherwise the dry-run logger.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        let token = self.telegram.api_key.trim();
        if token.is_empty() {
            info!("no telegram api_key configured, running in dry-run mode");
            return Arc::new(LogNotifier);
        }
        Arc::new(TelegramNotifier::new(token.to_string()).with_timeout(self.http.timeout_secs))
    }

    pub fn source_defs(&self) -> Vec<SourceDef> {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| self.sources.get(*kind).enabled)
            .map(|kind| {
                let cfg = self.sources.get(kind);
                SourceDef {
                    kind,
                    request: FetchRequest::browser(cfg.url_for(kind), &self.http.user_agent),
                    extractor: extractor_for(kind, cfg.scam_price_per_sqm),
                    policy: cfg.policy(),
                }
            })
            .collect()
    }

    /// Wire the production pipeline: HTTP fetcher, configured sink, file store.
    pub fn build_pipeline(&self) -> Result<Pipeline> {
        let fetcher = HttpFetcher::new(Duration::from_secs(self.http.timeout_secs))
            .context("building http client")?;
        let known = KnownKeys::open(&self.state.known_keys_path)
            .context("opening known-key store")?;
        let notifier = self.notifier();
        info!(sink = notifier.name(), channel = %self.telegram.target_channel, "notification sink");
        let dispatcher = Dispatcher::new(notifier, self.telegram.target_channel.clone())
            .with_send_delay(Duration::from_secs(self.scheduler.send_delay_secs))
            .with_options(SendOptions {
                disable_link_preview: self.telegram.disable_link_preview,
            });

        Ok(Pipeline::new(
            self.source_defs(),
            Arc::new(fetcher),
            known,
            dispatcher,
        ))
    }
}
