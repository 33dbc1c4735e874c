use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::Sink;
use crate::error::SinkError;
use crate::model::AlertRecord;

/// Realtime fan-in to connected clients through a tokio broadcast
/// channel. Each WebSocket session holds a receiver; delivery is
/// fire-and-forget and an empty audience is not a failure.
pub struct BroadcastSink {
    tx: broadcast::Sender<AlertRecord>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertRecord> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn sender(&self) -> broadcast::Sender<AlertRecord> {
        self.tx.clone()
    }
}

#[async_trait]
impl Sink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn deliver(&self, record: &AlertRecord) -> Result<(), SinkError> {
        match self.tx.send(record.clone()) {
            Ok(receivers) => debug!(
                identifier = %record.identifier,
                receivers,
                "record broadcast to connected clients"
            ),
            // send only errors when nobody is subscribed
            Err(_) => debug!(
                identifier = %record.identifier,
                "no clients connected, broadcast dropped"
            ),
        }
        Ok(())
    }

    fn handles_injected(&self) -> bool {
        true
    }
}
