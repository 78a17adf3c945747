//! # Pipeline
//! One cycle: fetch and extract every source concurrently, then classify,
//! dedup and send source by source through a single paced dispatcher.
//!
//! A failing source only costs its own notifications for this cycle. A fatal
//! sink error ends the cycle; everything already sent stays committed.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::classify::ViabilityPolicy;
use crate::dispatch::Dispatcher;
use crate::error::SourceError;
use crate::ingest::fetch::{FetchRequest, Fetcher};
use crate::ingest::types::OfferExtractor;
use crate::known_keys::KnownKeys;
use crate::offer::{Offer, SourceKind};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("offers_extracted_total", "Offers parsed from listing pages.");
        describe_counter!("offers_dropped_total", "Listings dropped because a field was malformed.");
        describe_counter!("offers_rejected_total", "Offers rejected by the viability policy.");
        describe_counter!("offers_known_total", "Offers skipped because they were already processed.");
        describe_counter!("notifications_sent_total", "Offers sent to the notification sink.");
        describe_counter!("notifications_failed_total", "Failed notification attempts.");
        describe_counter!("source_errors_total", "Sources that failed to fetch or extract.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts when the pipeline last ran.");
    });
}

/// A site the pipeline watches.
pub struct SourceDef {
    pub kind: SourceKind,
    pub request: FetchRequest,
    pub extractor: Box<dyn OfferExtractor>,
    pub policy: ViabilityPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: SourceKind,
    /// HTTP status of the listing page, when it was fetched.
    pub status: Option<u16>,
    pub extracted: usize,
    pub known: usize,
    pub rejected: usize,
    pub sent: usize,
    pub deferred: usize,
    pub error: Option<String>,
}

impl SourceReport {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            status: None,
            extracted: 0,
            known: 0,
            rejected: 0,
            sent: 0,
            deferred: 0,
            error: None,
        }
    }

    fn failed(source: SourceKind, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(source)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CycleReport {
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    pub fn total_sent(&self) -> usize {
        self.sources.iter().map(|s| s.sent).sum()
    }

    pub fn source(&self, kind: SourceKind) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == kind)
    }
}

/// Everything that must not be touched by two cycles at once.
struct Ledger {
    known: KnownKeys,
    dispatcher: Dispatcher,
}

type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub struct Pipeline {
    sources: Vec<Arc<SourceDef>>,
    fetcher: Arc<dyn Fetcher>,
    ledger: Mutex<Ledger>,
    clock: Clock,
}

impl Pipeline {
    pub fn new(
        sources: Vec<SourceDef>,
        fetcher: Arc<dyn Fetcher>,
        known: KnownKeys,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
            fetcher,
            ledger: Mutex::new(Ledger { known, dispatcher }),
            clock: Arc::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the wall clock (tests pin "now" with this).
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind).collect()
    }

    /// Run one cycle over all configured sources.
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_sources(&self.source_kinds()).await
    }

    /// Run one cycle over the configured sources listed in `only`.
    pub async fn run_sources(&self, only: &[SourceKind]) -> CycleReport {
        ensure_metrics_described();
        let now = (self.clock)();

        let selected: Vec<Arc<SourceDef>> = self
            .sources
            .iter()
            .filter(|s| only.contains(&s.kind))
            .cloned()
            .collect();

        // Fetch + extract all sources concurrently; results stay in config order.
        let handles: Vec<_> = selected
            .iter()
            .map(|src| tokio::spawn(harvest(self.fetcher.clone(), src.clone(), now)))
            .collect();

        let mut harvested = Vec::with_capacity(handles.len());
        for handle in handles {
            let harvest = handle.await.unwrap_or_else(|e| Harvest {
                status: None,
                offers: Err(SourceError::Join(e.to_string())),
            });
            harvested.push(harvest);
        }

        let mut report = CycleReport::default();
        let mut guard = self.ledger.lock().await;
        let Ledger { known, dispatcher } = &mut *guard;

        if let Err(e) = known.load() {
            error!(path = %known.path().display(), error = %e, "cannot read known keys, skipping cycle");
            for src in &selected {
                report.sources.push(SourceReport::failed(src.kind, &e));
            }
            return report;
        }

        let mut halted = false;
        for (src, harvest) in selected.iter().zip(harvested) {
            if halted {
                report
                    .sources
                    .push(SourceReport::failed(src.kind, "cycle aborted by sink error"));
                continue;
            }

            let mut entry = SourceReport::new(src.kind);
            entry.status = harvest.status;
            let offers = match harvest.offers {
                Ok(offers) => offers,
                Err(e) => {
                    match &e {
                        SourceError::Extract(_) => {
                            error!(source = %src.kind, error = %e, "page structure changed, please investigate")
                        }
                        _ => warn!(source = %src.kind, error = %e, "source failed this cycle"),
                    }
                    counter!("source_errors_total", "source" => src.kind.as_str()).increment(1);
                    entry.error = Some(e.to_string());
                    report.sources.push(entry);
                    continue;
                }
            };

            entry.extracted = offers.len();
            let outcome = dispatcher.dispatch(&offers, &src.policy, known, now).await;
            entry.known = outcome.known;
            entry.rejected = outcome.rejected;
            entry.sent = outcome.sent;
            entry.deferred = outcome.deferred;

            if let Some(e) = outcome.aborted {
                error!(source = %src.kind, error = %e, "send loop aborted");
                entry.error = Some(e.to_string());
                halted = true;
            }

            info!(
                source = %src.kind,
                status = ?entry.status,
                extracted = entry.extracted,
                known = entry.known,
                rejected = entry.rejected,
                sent = entry.sent,
                deferred = entry.deferred,
                "source done"
            );
            report.sources.push(entry);
        }

        gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
        report
    }
}

/// A fetched page keeps its status even when extraction fails.
struct Harvest {
    status: Option<u16>,
    offers: Result<Vec<Offer>, SourceError>,
}

async fn harvest(fetcher: Arc<dyn Fetcher>, src: Arc<SourceDef>, now: NaiveDateTime) -> Harvest {
    let site = src.extractor.source();
    info!(source = %site, url = %src.request.url, "checking");
    let page = match fetcher.fetch(&src.request).await {
        Ok(page) => page,
        Err(e) => {
            return Harvest {
                status: None,
                offers: Err(e.into()),
            }
        }
    };
    let offers = src.extractor.extract(&page.body, now).map_err(SourceError::from);
    if let Ok(offers) = &offers {
        counter!("offers_extracted_total", "source" => site.as_str()).increment(offers.len() as u64);
    }
    Harvest {
        status: Some(page.status),
        offers,
    }
}
