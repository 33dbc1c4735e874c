//! The long-lived ingestion loop.
//!
//! One task owns the whole pipeline: gate fetches to the minimum poll
//! interval, parse, route records through the dedup store, dispatch the
//! admitted ones, and feed fetch outcomes to the failure monitor. Any
//! fault inside a cycle is contained at the loop boundary; the loop only
//! stops on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::error::Error;
use crate::feed::{EntryOutcome, FeedClient, parse_feed};
use crate::monitor::FailureMonitor;
use crate::sinks::{Dispatcher, TelegramSink};
use crate::store::HistoryStore;

#[derive(Clone, Copy, Debug)]
pub struct SchedulerSettings {
    /// Minimum spacing between fetch attempts.
    pub poll_interval: Duration,
    /// Cooperative yield at the end of every loop iteration.
    pub idle_delay: Duration,
    /// Emit a liveness log line every this many iterations.
    pub liveness_every: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            idle_delay: Duration::from_millis(100),
            liveness_every: 600,
        }
    }
}

/// What one completed cycle did, for logging and tests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CycleReport {
    pub parsed: usize,
    pub skipped: usize,
    pub admitted: usize,
}

pub struct Scheduler {
    client: FeedClient,
    store: Arc<HistoryStore>,
    dispatcher: Arc<Dispatcher>,
    monitor: Arc<FailureMonitor>,
    escalation: Option<Arc<TelegramSink>>,
    settings: SchedulerSettings,
    last_fetch: Option<Instant>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        client: FeedClient,
        store: Arc<HistoryStore>,
        dispatcher: Arc<Dispatcher>,
        monitor: Arc<FailureMonitor>,
        escalation: Option<Arc<TelegramSink>>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            client,
            store,
            dispatcher,
            monitor,
            escalation,
            settings,
            last_fetch: None,
        }
    }

    /// Run the loop until a shutdown signal arrives.
    pub async fn run(mut self) {
        info!(feed = %self.client.url(), "poll loop started");
        let mut iterations: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = signal::ctrl_c() => {
                    info!("shutdown signal received, stopping poll loop");
                    break;
                }
                () = self.tick() => {}
            }

            iterations += 1;
            if self.settings.liveness_every > 0 && iterations % self.settings.liveness_every == 0 {
                info!(
                    iterations,
                    history_len = self.store.len(),
                    consecutive_failures = self.monitor.consecutive_failures(),
                    "poll loop alive"
                );
            }

            tokio::select! {
                biased;
                _ = signal::ctrl_c() => {
                    info!("shutdown signal received, stopping poll loop");
                    break;
                }
                () = sleep(self.settings.idle_delay) => {}
            }
        }
    }

    /// One gated iteration: fetch when due, contain any cycle fault.
    async fn tick(&mut self) {
        let due = self
            .last_fetch
            .is_none_or(|at| at.elapsed() >= self.settings.poll_interval);
        if !due {
            return;
        }
        self.last_fetch = Some(Instant::now());
        self.run_cycle().await;
    }

    /// One ungated cycle with full outcome accounting: reports success or
    /// failure to the monitor and sends the escalation notice when the
    /// threshold is crossed. `run` calls this on the poll cadence; tests
    /// and `--once` drive it directly.
    pub async fn run_cycle(&mut self) {
        match self.poll_once().await {
            Ok(report) => {
                self.monitor.record_success();
                if report.admitted > 0 {
                    info!(
                        admitted = report.admitted,
                        parsed = report.parsed,
                        skipped = report.skipped,
                        "cycle delivered new alerts"
                    );
                }
            }
            Err(err) if err.is_cycle_failure() => {
                warn!(error = %err, "fetch cycle failed");
                self.escalate_if_needed().await;
            }
            Err(err) => {
                // unexpected fault: logged, counted, loop continues
                error!(error = %err, "unexpected error during fetch cycle");
                self.escalate_if_needed().await;
            }
        }
    }

    /// One full fetch+parse+admit+dispatch pass, without interval gating.
    ///
    /// # Errors
    ///
    /// Returns transport or structural errors; per-entry problems are
    /// counted in the report instead.
    pub async fn poll_once(&self) -> Result<CycleReport> {
        let body = self.client.fetch().await?;
        let outcomes = parse_feed(&body).map_err(Error::from)?;

        let mut report = CycleReport::default();
        for outcome in outcomes {
            match outcome {
                EntryOutcome::Skipped(reason) => {
                    report.skipped += 1;
                    debug!(%reason, "feed entry skipped");
                }
                EntryOutcome::Record(record) => {
                    report.parsed += 1;
                    if self.store.admit(&record) {
                        info!(
                            identifier = %record.identifier,
                            title = %record.title,
                            severity = record.severity().unwrap_or("-"),
                            "new alert admitted"
                        );
                        self.dispatcher.dispatch(&record).await;
                        report.admitted += 1;
                    } else {
                        debug!(identifier = %record.identifier, "identifier already processed");
                    }
                }
            }
        }
        Ok(report)
    }

    async fn escalate_if_needed(&self) {
        let Some(streak) = self.monitor.record_failure() else {
            return;
        };
        warn!(consecutive_failures = streak, "failure threshold crossed");
        let Some(sink) = &self.escalation else {
            return;
        };
        let text = format!(
            "caprelay: {streak} consecutive feed fetch failures, upstream may be down"
        );
        if let Err(err) = sink.send_text(&text).await {
            warn!(error = %err, "failed to send escalation notice");
        }
    }
}
