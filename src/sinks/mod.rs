//! Downstream delivery targets and the fan-out dispatcher.

pub(crate) mod broadcast;
pub(crate) mod push;
pub(crate) mod telegram;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use broadcast::BroadcastSink;
pub use push::PushSink;
pub use telegram::TelegramSink;

use crate::error::SinkError;
use crate::model::AlertRecord;

/// One delivery capability. Implementations must contain their own
/// failures; the dispatcher guarantees a failing sink never prevents the
/// remaining ones from being attempted.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, record: &AlertRecord) -> Result<(), SinkError>;

    /// Whether simulated (injected) records are routed to this sink.
    fn handles_injected(&self) -> bool {
        false
    }
}

/// Best-effort fan-out: each configured sink is attempted exactly once
/// per record, inside its own timeout, with failures logged and isolated.
/// No retries; a failure for one alert never blocks the next.
pub struct Dispatcher {
    sinks: Vec<Arc<dyn Sink>>,
    sink_timeout: Duration,
    dry_run: bool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn Sink>>, sink_timeout: Duration, dry_run: bool) -> Self {
        Self {
            sinks,
            sink_timeout,
            dry_run,
        }
    }

    /// Deliver a newly admitted record to every sink.
    pub async fn dispatch(&self, record: &AlertRecord) {
        for sink in &self.sinks {
            self.deliver_one(sink.as_ref(), record).await;
        }
    }

    /// Deliver a simulated record to injection-capable sinks only. The
    /// dedup store is never consulted for these.
    pub async fn inject(&self, record: &AlertRecord) {
        for sink in self.sinks.iter().filter(|s| s.handles_injected()) {
            self.deliver_one(sink.as_ref(), record).await;
        }
    }

    async fn deliver_one(&self, sink: &dyn Sink, record: &AlertRecord) {
        if self.dry_run {
            info!(
                sink = sink.name(),
                identifier = %record.identifier,
                "dry-run: would deliver record"
            );
            return;
        }
        match tokio::time::timeout(self.sink_timeout, sink.deliver(record)).await {
            Ok(Ok(())) => debug!(
                sink = sink.name(),
                identifier = %record.identifier,
                "record delivered"
            ),
            Ok(Err(err)) => warn!(
                sink = sink.name(),
                identifier = %record.identifier,
                error = %err,
                "sink delivery failed"
            ),
            Err(_) => warn!(
                sink = sink.name(),
                identifier = %record.identifier,
                timeout_ms = self.sink_timeout.as_millis(),
                "sink delivery timed out"
            ),
        }
    }
}
