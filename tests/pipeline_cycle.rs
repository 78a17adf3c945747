// tests/pipeline_cycle.rs
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use flat_notifier::config::AppConfig;
use flat_notifier::dispatch::Dispatcher;
use flat_notifier::error::{FetchError, SinkError};
use flat_notifier::ingest::fetch::{FetchRequest, FetchedPage, Fetcher, HttpFetcher, DEFAULT_USER_AGENT};
use flat_notifier::ingest::providers::extractor_for;
use flat_notifier::notify::{Notifier, SendOptions};
use flat_notifier::{KnownKeys, Pipeline, SourceDef, SourceKind};

const KA_URL: &str = "https://www.kleinanzeigen.test/s-wohnung-mieten";
const IW_URL: &str = "https://www.immowelt.test/suche";

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 10)
        .unwrap()
        .and_hms_opt(20, 0, 0)
        .unwrap()
}

#[derive(Debug, Clone)]
struct Sent {
    channel: String,
    text: String,
}

/// Records messages; scripted outcomes are used first, then every send succeeds.
#[derive(Default)]
struct RecordingSink {
    script: Mutex<VecDeque<Result<(), SinkError>>>,
    sent: Mutex<Vec<Sent>>,
}

impl RecordingSink {
    fn pass_next(&self) {
        self.script.lock().unwrap().push_back(Ok(()));
    }

    fn fail_next(&self, err: SinkError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingSink {
    async fn send(&self, channel: &str, text: &str, _opts: SendOptions) -> Result<(), SinkError> {
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or(Ok(()))?;
        self.sent.lock().unwrap().push(Sent {
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Serves canned pages; unknown URLs go to a closed local port.
struct CannedFetcher {
    pages: HashMap<String, (u16, String)>,
    fallback: HttpFetcher,
}

impl CannedFetcher {
    fn new(pages: &[(&str, String)]) -> Self {
        let pages: Vec<(&str, u16, String)> = pages.iter().map(|(u, b)| (*u, 200, b.clone())).collect();
        Self::with_status(&pages)
    }

    fn with_status(pages: &[(&str, u16, String)]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|(u, status, b)| (u.to_string(), (*status, b.clone())))
                .collect(),
            fallback: HttpFetcher::new(Duration::from_secs(2)).unwrap(),
        }
    }
}

#[async_trait]
impl Fetcher for CannedFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError> {
        match self.pages.get(&req.url) {
            Some((status, body)) => Ok(FetchedPage {
                status: *status,
                body: body.clone(),
            }),
            None => {
                let refused = FetchRequest::browser("http://127.0.0.1:9/", DEFAULT_USER_AGENT);
                self.fallback.fetch(&refused).await
            }
        }
    }
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn source(kind: SourceKind, url: &str) -> SourceDef {
    let cfg = AppConfig::default();
    SourceDef {
        kind,
        request: FetchRequest::browser(url, DEFAULT_USER_AGENT),
        extractor: extractor_for(kind, cfg.sources.get(kind).scam_price_per_sqm),
        policy: cfg.sources.get(kind).policy(),
    }
}

fn pipeline(
    sources: Vec<SourceDef>,
    fetcher: CannedFetcher,
    store: &Path,
    notifier: Arc<RecordingSink>,
) -> Pipeline {
    let dispatcher = Dispatcher::new(notifier, "-100777").with_send_delay(Duration::ZERO);
    Pipeline::new(sources, Arc::new(fetcher), KnownKeys::new(store), dispatcher).with_clock(now)
}

fn both_sources() -> Vec<SourceDef> {
    vec![
        source(SourceKind::Kleinanzeigen, KA_URL),
        source(SourceKind::Immowelt, IW_URL),
    ]
}

fn both_pages() -> CannedFetcher {
    CannedFetcher::new(&[
        (KA_URL, fixture("kleinanzeigen.html")),
        (IW_URL, fixture("immowelt.html")),
    ])
}

#[tokio::test]
async fn new_offers_are_sent_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("state/known_keys.toml");
    let notifier = Arc::new(RecordingSink::default());
    let p = pipeline(both_sources(), both_pages(), &store, notifier.clone());

    let first = p.run_cycle().await;
    let ka = first.source(SourceKind::Kleinanzeigen).unwrap();
    assert_eq!((ka.extracted, ka.rejected, ka.sent), (5, 3, 2));
    let iw = first.source(SourceKind::Immowelt).unwrap();
    assert_eq!((iw.extracted, iw.rejected, iw.sent), (3, 0, 3));
    assert_eq!(first.total_sent(), 5);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 5);
    assert!(sent.iter().all(|m| m.channel == "-100777"));
    assert!(sent[0].text.contains("Helle 3-Zimmer-Wohnung in Ottensen"));
    assert!(sent[1].text.contains("3,5 Zimmer Altbau"));
    assert!(sent[2].text.starts_with("⚠️ *Betrugsverdacht (Immowelt)*"));

    let second = p.run_cycle().await;
    assert_eq!(second.total_sent(), 0);
    assert_eq!(second.source(SourceKind::Kleinanzeigen).unwrap().known, 5);
    assert_eq!(second.source(SourceKind::Immowelt).unwrap().known, 3);
    assert_eq!(notifier.sent().len(), 5);

    // Rejected offers are remembered too.
    let reloaded = KnownKeys::open(&store).unwrap();
    assert_eq!(reloaded.len("Kleinanzeigen"), 5);
    assert_eq!(reloaded.len("Immowelt"), 3);
    assert!(reloaded.has_seen("Kleinanzeigen", "2712000003-203-9409"));
}

#[tokio::test]
async fn store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("known.toml");

    let notifier = Arc::new(RecordingSink::default());
    let p = pipeline(both_sources(), both_pages(), &store, notifier.clone());
    assert_eq!(p.run_cycle().await.total_sent(), 5);
    drop(p);

    let notifier = Arc::new(RecordingSink::default());
    let p = pipeline(both_sources(), both_pages(), &store, notifier.clone());
    assert_eq!(p.run_cycle().await.total_sent(), 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn unreachable_source_does_not_block_the_other() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingSink::default());
    let fetcher = CannedFetcher::new(&[(IW_URL, fixture("immowelt.html"))]);
    let p = pipeline(both_sources(), fetcher, &dir.path().join("k.toml"), notifier.clone());

    let report = p.run_cycle().await;
    let ka = report.source(SourceKind::Kleinanzeigen).unwrap();
    assert!(ka.error.as_deref().unwrap().contains("127.0.0.1:9"));
    assert_eq!(ka.sent, 0);
    assert_eq!(report.source(SourceKind::Immowelt).unwrap().sent, 3);
}

#[tokio::test]
async fn layout_change_is_reported_per_source() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingSink::default());
    let fetcher = CannedFetcher::new(&[
        (KA_URL, "<html><body><main>redesigned</main></body></html>".to_string()),
        (IW_URL, fixture("immowelt.html")),
    ]);
    let p = pipeline(both_sources(), fetcher, &dir.path().join("k.toml"), notifier.clone());

    let report = p.run_cycle().await;
    let err = report.source(SourceKind::Kleinanzeigen).unwrap().error.clone().unwrap();
    assert!(err.contains("l-container-row"), "{err}");
    assert_eq!(report.total_sent(), 3);
}

#[tokio::test]
async fn transient_failure_is_retried_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingSink::default());
    notifier.fail_next(SinkError::Transient("timed out".into()));
    let fetcher = CannedFetcher::new(&[(KA_URL, fixture("kleinanzeigen.html"))]);
    let p = pipeline(
        vec![source(SourceKind::Kleinanzeigen, KA_URL)],
        fetcher,
        &dir.path().join("k.toml"),
        notifier.clone(),
    );

    let first = p.run_cycle().await;
    let ka = first.source(SourceKind::Kleinanzeigen).unwrap();
    assert_eq!((ka.sent, ka.deferred), (1, 1));
    assert!(ka.error.is_none());

    let second = p.run_cycle().await;
    let ka = second.source(SourceKind::Kleinanzeigen).unwrap();
    assert_eq!((ka.sent, ka.known), (1, 4));

    let texts: Vec<String> = notifier.sent().into_iter().map(|m| m.text).collect();
    assert!(texts[0].contains("3,5 Zimmer Altbau"));
    assert!(texts[1].contains("Helle 3-Zimmer-Wohnung in Ottensen"));
}

#[tokio::test]
async fn fatal_failure_ends_cycle_and_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("k.toml");
    let notifier = Arc::new(RecordingSink::default());
    notifier.pass_next();
    notifier.fail_next(SinkError::Fatal("400 Bad Request: chat not found".into()));
    let p = pipeline(both_sources(), both_pages(), &store, notifier.clone());

    let first = p.run_cycle().await;
    let ka = first.source(SourceKind::Kleinanzeigen).unwrap();
    assert_eq!((ka.sent, ka.rejected), (1, 3));
    assert!(ka.error.as_deref().unwrap().contains("chat not found"));
    let iw = first.source(SourceKind::Immowelt).unwrap();
    assert_eq!(iw.sent, 0);
    assert!(iw.error.as_deref().unwrap().contains("aborted"));

    // Everything decided before the failure is on disk.
    assert_eq!(KnownKeys::open(&store).unwrap().len("Kleinanzeigen"), 4);

    let second = p.run_cycle().await;
    assert_eq!(second.source(SourceKind::Kleinanzeigen).unwrap().sent, 1);
    assert_eq!(second.source(SourceKind::Immowelt).unwrap().sent, 3);
    assert_eq!(notifier.sent().len(), 5);
}

#[tokio::test]
async fn corrupt_store_skips_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("k.toml");
    std::fs::write(&store, "Kleinanzeigen = [unterminated").unwrap();
    let notifier = Arc::new(RecordingSink::default());
    let p = pipeline(both_sources(), both_pages(), &store, notifier.clone());

    let report = p.run_cycle().await;
    assert_eq!(report.sources.len(), 2);
    assert!(report.sources.iter().all(|s| s.error.is_some()));
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn run_sources_limits_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingSink::default());
    let p = pipeline(both_sources(), both_pages(), &dir.path().join("k.toml"), notifier.clone());

    let report = p.run_sources(&[SourceKind::Immowelt]).await;
    assert_eq!(report.sources.len(), 1);
    assert!(report.source(SourceKind::Kleinanzeigen).is_none());
    assert_eq!(report.total_sent(), 3);
}

#[tokio::test]
async fn error_status_page_is_still_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingSink::default());
    let fetcher = CannedFetcher::with_status(&[(IW_URL, 503, fixture("immowelt.html"))]);
    let p = pipeline(
        vec![source(SourceKind::Immowelt, IW_URL)],
        fetcher,
        &dir.path().join("k.toml"),
        notifier.clone(),
    );

    let report = p.run_cycle().await;
    let iw = report.source(SourceKind::Immowelt).unwrap();
    assert_eq!(iw.status, Some(503));
    assert!(iw.error.is_none(), "{:?}", iw.error);
    assert_eq!((iw.extracted, iw.sent), (3, 3));
    assert_eq!(notifier.sent().len(), 3);
}

#[tokio::test]
async fn error_status_without_listings_is_a_structural_error() {
    let dir = tempfile::tempdir().unwrap();
    let notifier = Arc::new(RecordingSink::default());
    let fetcher = CannedFetcher::with_status(&[(
        IW_URL,
        429,
        "<html><body>Too Many Requests</body></html>".to_string(),
    )]);
    let p = pipeline(
        vec![source(SourceKind::Immowelt, IW_URL)],
        fetcher,
        &dir.path().join("k.toml"),
        notifier.clone(),
    );

    let report = p.run_cycle().await;
    let iw = report.source(SourceKind::Immowelt).unwrap();
    assert_eq!(iw.status, Some(429));
    assert!(iw.error.as_deref().unwrap().contains("SearchResults"), "{:?}", iw.error);
    assert!(notifier.sent().is_empty());
}
