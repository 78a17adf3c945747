//! Send loop: dedup, viability, format, send, commit.
//!
//! Every offer that reaches a final decision (sent, or rejected by the
//! policy) is written to the known-key store, so it is never looked at again.
//! The store is flushed after each successful send; a crash between send and
//! flush can at worst repeat that one message.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use metrics::counter;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::classify::ViabilityPolicy;
use crate::error::{DispatchError, SinkError};
use crate::format::format_offer;
use crate::known_keys::KnownKeys;
use crate::notify::{Notifier, SendOptions};
use crate::offer::Offer;

pub const DEFAULT_SEND_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Already in the known-key store.
    pub known: usize,
    pub rejected: usize,
    pub sent: usize,
    /// Transient sink failures; these offers are retried next cycle.
    pub deferred: usize,
    /// Set when the loop stopped early.
    pub aborted: Option<DispatchError>,
}

impl DispatchOutcome {
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

pub struct Dispatcher {
    notifier: Arc<dyn Notifier>,
    channel: String,
    opts: SendOptions,
    send_delay: Duration,
    last_send: Option<Instant>,
}

impl Dispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, channel: impl Into<String>) -> Self {
        Self {
            notifier,
            channel: channel.into(),
            opts: SendOptions::default(),
            send_delay: DEFAULT_SEND_DELAY,
            last_send: None,
        }
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn with_options(mut self, opts: SendOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Keep consecutive sends at least `send_delay` apart.
    async fn pace(&mut self) {
        if let Some(last) = self.last_send {
            sleep_until(last + self.send_delay).await;
        }
        self.last_send = Some(Instant::now());
    }

    /// Process the offers of one source in order.
    pub async fn dispatch(
        &mut self,
        offers: &[Offer],
        policy: &ViabilityPolicy,
        known: &mut KnownKeys,
        now: NaiveDateTime,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let sink = self.notifier.name();

        for offer in offers {
            let site = offer.source.as_str();
            if known.has_seen(site, &offer.id) {
                outcome.known += 1;
                counter!("offers_known_total", "source" => site).increment(1);
                continue;
            }

            if !policy.is_viable(offer, now) {
                known.mark_seen(site, &offer.id);
                outcome.rejected += 1;
                counter!("offers_rejected_total", "source" => site).increment(1);
                continue;
            }

            let text = format_offer(offer);
            self.pace().await;

            match self.notifier.send(&self.channel, &text, self.opts).await {
                Ok(()) => {
                    known.mark_seen(site, &offer.id);
                    outcome.sent += 1;
                    counter!("notifications_sent_total", "source" => site).increment(1);
                    info!(source = %offer.source, id = %offer.id, scam = offer.is_scam, sink, "sent offer");

                    if let Err(e) = known.persist() {
                        outcome.aborted = Some(e.into());
                        return outcome;
                    }
                }
                Err(SinkError::Transient(msg)) => {
                    outcome.deferred += 1;
                    counter!("notifications_failed_total", "source" => site, "kind" => "transient")
                        .increment(1);
                    debug!(source = %offer.source, id = %offer.id, sink, error = %msg, "transient sink error, ignored");
                }
                Err(fatal) => {
                    counter!("notifications_failed_total", "source" => site, "kind" => "fatal")
                        .increment(1);
                    warn!(source = %offer.source, id = %offer.id, sink, error = %fatal, "sink refused offer, stopping");
                    if let Err(e) = known.persist() {
                        warn!(error = %e, "could not persist known keys after sink failure");
                    }
                    outcome.aborted = Some(DispatchError::Sink(fatal));
                    return outcome;
                }
            }
        }

        if let Err(e) = known.persist() {
            outcome.aborted = Some(e.into());
        }
        outcome
    }
}
