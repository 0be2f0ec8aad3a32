#![forbid(unsafe_code)]

use std::sync::Arc;

use tokio::sync::broadcast;

/// Untyped, best-effort, broadcast-style message transport between two contexts.
///
/// Every subscriber sees every message, including ones it posted itself, so
/// receivers must filter by envelope type and correlation id.
pub trait Transport: Send + Sync {
    fn post(&self, msg: serde_json::Value);
    fn subscribe(&self) -> broadcast::Receiver<serde_json::Value>;
}

/// In-process transport backed by a tokio broadcast channel.
pub struct BroadcastTransport {
    tx: broadcast::Sender<serde_json::Value>,
}

impl BroadcastTransport {
    pub fn new(cap: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(cap.max(1));
        Arc::new(Self { tx })
    }

    pub fn subscribers(&self) -> usize { self.tx.receiver_count() }
}

impl Transport for BroadcastTransport {
    fn post(&self, msg: serde_json::Value) {
        // No subscribers means nobody is listening; the message is dropped.
        let _ = self.tx.send(msg);
    }

    fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.tx.subscribe()
    }
}
