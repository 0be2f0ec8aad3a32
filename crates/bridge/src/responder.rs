//! Receiving side of the channel: typed request handlers that always answer.

#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use kpal_core::{Envelope, Reply, RequestKind};
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::transport::Transport;

type Handler = Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<Reply, String>> + Send + Sync>;
type Notify = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Cancellation handle that aborts the underlying task.
pub struct CancelHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CancelHandle {
    pub(crate) fn new(task: tokio::task::JoinHandle<()>) -> Self { Self { task: Some(task) } }

    pub fn cancel(mut self) { self.abort(); }

    pub(crate) fn abort(&mut self) {
        if let Some(h) = self.task.take() {
            h.abort();
        }
    }
}

/// Registry of request handlers keyed by request type.
#[derive(Default)]
pub struct Responder {
    handlers: FxHashMap<RequestKind, Handler>,
    notify: Option<Notify>,
}

impl Responder {
    pub fn new() -> Self { Self::default() }

    /// Register the handler for one request type. The handler's error string is
    /// sent back verbatim in the response's `error` field.
    pub fn on_request<F, Fut>(mut self, kind: RequestKind, handler: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, String>> + Send + 'static,
    {
        let h: Handler = Arc::new(move |env| Box::pin(handler(env)));
        self.handlers.insert(kind, h);
        self
    }

    /// Callback for fire-and-forget envelopes addressed to this side (`navigate-to-resource`).
    pub fn on_notify<F>(mut self, f: F) -> Self
    where
        F: Fn(Envelope) + Send + Sync + 'static,
    {
        self.notify = Some(Arc::new(f));
        self
    }

    /// Start serving requests from `transport`. Each request runs on its own task;
    /// a failing or panicking handler still produces an error response.
    pub fn serve(self, transport: Arc<dyn Transport>) -> CancelHandle {
        let rx = transport.subscribe();
        CancelHandle::new(tokio::spawn(serve_loop(rx, transport, self.handlers, self.notify)))
    }
}

async fn serve_loop(
    mut rx: broadcast::Receiver<serde_json::Value>,
    transport: Arc<dyn Transport>,
    handlers: FxHashMap<RequestKind, Handler>,
    notify: Option<Notify>,
) {
    loop {
        let msg = match rx.recv().await {
            Ok(v) => v,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "responder: transport lagged; senders will time out");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let Some(env) = Envelope::from_value(&msg) else { continue };
        if let Envelope::NavigateToResource { .. } = env {
            if let Some(cb) = &notify {
                cb(env);
            }
            continue;
        }
        let Some(kind) = env.request_kind() else { continue };
        let Some(handler) = handlers.get(&kind).cloned() else {
            debug!(kind = kind.type_tag(), "responder: no handler registered");
            continue;
        };
        let Some(request_id) = env.request_id().map(|s| s.to_string()) else { continue };
        let transport = transport.clone();
        tokio::spawn(async move {
            let outcome = match tokio::spawn(handler(env)).await {
                Ok(res) => res,
                Err(e) => Err(format!("{} handler failed: {}", kind.type_tag(), e)),
            };
            if let Err(e) = &outcome {
                debug!(request_id = %request_id, kind = kind.type_tag(), error = %e, "responder: handler error");
            }
            transport.post(kind.respond(request_id, outcome).to_value());
        });
    }
    debug!("responder: stopped");
}
