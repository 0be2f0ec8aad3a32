//! kpal bridge: correlated request/response over an untyped broadcast transport.
//!
//! One request yields exactly one outcome: the matching response, a remote
//! error, or a timeout. The pending entry for a request is removed on every
//! path, including when the caller drops the future.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use kpal_core::{Envelope, RequestKind, Resource};
use rustc_hash::FxHashMap;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

pub mod backoff;
pub mod responder;
pub mod transport;

pub use backoff::Backoff;
pub use responder::{CancelHandle, Responder};
pub use transport::{BroadcastTransport, Transport};

/// Default bound for one round trip.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("request {request_id} timed out after {after_ms} ms")]
    Timeout { request_id: String, after_ms: u64 },
    #[error("{0}")]
    Remote(String),
    #[error("bridge closed")]
    Closed,
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

struct Pending {
    /// Response type tag this request accepts.
    expects: &'static str,
    reply: oneshot::Sender<Envelope>,
}

type PendingMap = Arc<Mutex<FxHashMap<String, Pending>>>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the pending entry when the request settles or is abandoned.
struct PendingGuard {
    map: PendingMap,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        lock(&self.map).remove(&self.request_id);
    }
}

fn response_tag(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::GetResources => "resources-response",
        RequestKind::DeleteResource => "delete-response",
        RequestKind::OpenLogs => "logs-response",
    }
}

/// Palette-side endpoint for one context.
pub struct Bridge {
    transport: Arc<dyn Transport>,
    pending: PendingMap,
    router: CancelHandle,
}

impl Bridge {
    /// Subscribe to the transport and start routing responses. Requires a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let pending: PendingMap = Arc::new(Mutex::new(FxHashMap::default()));
        let rx = transport.subscribe();
        let task = tokio::spawn(route_responses(rx, pending.clone()));
        Self { transport, pending, router: CancelHandle::new(task) }
    }

    pub fn transport(&self) -> Arc<dyn Transport> { self.transport.clone() }

    /// Number of requests still awaiting an outcome.
    pub fn pending_len(&self) -> usize { lock(&self.pending).len() }

    /// Fire-and-forget post; no response is expected.
    pub fn post(&self, env: &Envelope) {
        debug!(kind = env.type_tag(), "bridge: post");
        self.transport.post(env.to_value());
    }

    /// Issue one request built from a fresh correlation id and await its single outcome.
    pub async fn request<F>(&self, kind: RequestKind, build: F, timeout: Duration) -> BridgeResult<Envelope>
    where
        F: FnOnce(String) -> Envelope,
    {
        let (tx, rx) = oneshot::channel();
        let request_id = {
            let mut map = lock(&self.pending);
            let mut id = new_request_id();
            while map.contains_key(&id) {
                id = new_request_id();
            }
            map.insert(id.clone(), Pending { expects: response_tag(kind), reply: tx });
            id
        };
        let _guard = PendingGuard { map: self.pending.clone(), request_id: request_id.clone() };
        let env = build(request_id.clone());
        metrics::counter!("bridge_requests_total", 1u64, "type" => kind.type_tag());
        debug!(request_id = %request_id, kind = kind.type_tag(), "bridge: request sent");
        let started = Instant::now();
        self.transport.post(env.to_value());
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => match resp.error() {
                Some(e) => {
                    metrics::counter!("bridge_remote_errors_total", 1u64);
                    info!(request_id = %request_id, error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "bridge: remote error");
                    Err(BridgeError::Remote(e.to_string()))
                }
                None => Ok(resp),
            },
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                metrics::counter!("bridge_timeouts_total", 1u64);
                warn!(request_id = %request_id, kind = kind.type_tag(), after_ms = %timeout.as_millis(), "bridge: request timed out");
                Err(BridgeError::Timeout { request_id, after_ms: timeout.as_millis() as u64 })
            }
        }
    }

    pub async fn get_resources(&self, timeout: Duration) -> BridgeResult<Vec<Resource>> {
        let resp = self
            .request(RequestKind::GetResources, |request_id| Envelope::GetResources { request_id }, timeout)
            .await?;
        match resp {
            Envelope::ResourcesResponse { resources, .. } => Ok(resources.unwrap_or_default()),
            other => Err(BridgeError::UnexpectedResponse(other.type_tag().to_string())),
        }
    }

    pub async fn delete_resource(&self, resource: Resource, timeout: Duration) -> BridgeResult<()> {
        self.request(RequestKind::DeleteResource, |request_id| Envelope::DeleteResource { request_id, resource }, timeout)
            .await
            .map(|_| ())
    }

    pub async fn open_logs(&self, resource: Resource, timeout: Duration) -> BridgeResult<()> {
        self.request(RequestKind::OpenLogs, |request_id| Envelope::OpenLogs { request_id, resource }, timeout)
            .await
            .map(|_| ())
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.router.abort();
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

async fn route_responses(mut rx: broadcast::Receiver<serde_json::Value>, pending: PendingMap) {
    loop {
        let msg = match rx.recv().await {
            Ok(v) => v,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "bridge: transport lagged; responses may time out");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(env) = Envelope::from_value(&msg) else { continue };
        if !env.is_response() {
            continue;
        }
        let Some(request_id) = env.request_id() else { continue };
        let entry = {
            let mut map = lock(&pending);
            match map.get(request_id) {
                Some(p) if p.expects == env.type_tag() => map.remove(request_id),
                Some(_) => {
                    debug!(request_id = %request_id, kind = env.type_tag(), "bridge: response type mismatch ignored");
                    None
                }
                None => None,
            }
        };
        match entry {
            Some(p) => {
                let _ = p.reply.send(env);
            }
            None => debug!(kind = env.type_tag(), "bridge: response without pending request ignored"),
        }
    }
    debug!("bridge: router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(new_request_id()));
        }
    }

    #[tokio::test]
    async fn response_type_must_match_request() {
        let t = BroadcastTransport::new(64);
        let bridge = Bridge::new(t.clone());
        let mut rx = t.subscribe();
        let fut = bridge.get_resources(Duration::from_millis(200));
        let responder = async {
            // Answer with the wrong response type first, then the right one.
            loop {
                let v = rx.recv().await.unwrap();
                if let Some(Envelope::GetResources { request_id }) = Envelope::from_value(&v) {
                    t.post(Envelope::DeleteResponse { request_id: request_id.clone(), error: None }.to_value());
                    t.post(
                        Envelope::ResourcesResponse {
                            request_id,
                            resources: Some(vec![Resource::new("Pod", "a", Some("ns1"))]),
                            error: None,
                        }
                        .to_value(),
                    );
                    break;
                }
            }
        };
        let (out, _) = tokio::join!(fut, responder);
        assert_eq!(out.unwrap().len(), 1);
        assert_eq!(bridge.pending_len(), 0);
    }
}
