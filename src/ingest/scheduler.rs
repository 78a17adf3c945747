// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pipeline::Pipeline;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerCfg {
    pub interval_secs: u64,
    pub first_delay_secs: u64,
    /// Cycles allowed to overlap when one overruns the interval.
    pub max_concurrent_cycles: usize,
    pub send_delay_secs: u64,
}

impl Default for SchedulerCfg {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            first_delay_secs: 2,
            max_concurrent_cycles: 5,
            send_delay_secs: 2,
        }
    }
}

/// Run `pipeline` every `interval_secs`, starting after `first_delay_secs`.
///
/// Each tick runs in its own task. When `max_concurrent_cycles` cycles are
/// still running, the tick is skipped.
pub fn spawn_scheduler(pipeline: Arc<Pipeline>, cfg: SchedulerCfg) -> JoinHandle<()> {
    let permits = Arc::new(Semaphore::new(cfg.max_concurrent_cycles.max(1)));

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(cfg.first_delay_secs)).await;

        let mut ticker = tokio::time::interval(Duration::from_secs(cfg.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Ok(permit) = permits.clone().try_acquire_owned() else {
                tracing::warn!(
                    target: "scheduler",
                    max = cfg.max_concurrent_cycles,
                    "previous cycles still running, skipping tick"
                );
                continue;
            };

            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let report = pipeline.run_cycle().await;
                tracing::debug!(target: "scheduler", sent = report.total_sent(), "cycle finished");
                drop(permit);
            });
        }
    })
}
