#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use kpal_api::PaletteError;
use kpal_bridge::{Bridge, Transport};
use kpal_core::{ContextId, Envelope};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::Effect;
use crate::model::{PaletteUpdate, ToastKind};
use crate::Palette;

fn send_toast(tx: &mpsc::UnboundedSender<PaletteUpdate>, text: String, kind: ToastKind) {
    let _ = tx.send(PaletteUpdate::Toast { text, kind });
}

impl Palette {
    /// Fetch resources of `ctx`; a success lands in the cache before the update is sent.
    pub(crate) fn spawn_fetch(&mut self, ctx: ContextId, bridge: Arc<Bridge>, background: bool) {
        let tx = self.updates_tx.clone();
        let cache = self.cache.clone();
        let generation = self.generation;
        let timeout = self.cfg.request_timeout;
        info!(context = %ctx, generation, background, "palette: fetch start");
        tokio::spawn(async move {
            let t0 = Instant::now();
            let result = bridge.get_resources(timeout).await.map_err(PaletteError::from);
            match &result {
                Ok(items) => {
                    cache.put(&ctx, items.clone());
                    info!(context = %ctx, items = items.len(), ms = %t0.elapsed().as_millis(), "palette: fetch ok");
                }
                Err(e) => warn!(context = %ctx, error = %e, background, "palette: fetch failed"),
            }
            let _ = tx.send(PaletteUpdate::Resources { generation, context_id: ctx, background, result });
        });
    }

    pub(crate) fn spawn_catalog(&mut self) {
        let tx = self.updates_tx.clone();
        let catalog = self.hosts.catalog.clone();
        let generation = self.generation;
        tokio::spawn(async move {
            let result = catalog.list_clusters().await;
            let _ = tx.send(PaletteUpdate::Clusters { generation, result });
        });
    }

    /// Run an accepted command's effect in the background; failures come back as toasts.
    pub(crate) fn spawn_effect(&mut self, effect: Effect) {
        let tx = self.updates_tx.clone();
        let timeout = self.cfg.request_timeout;
        match effect {
            Effect::Navigate(path) => {
                let navigator = self.hosts.navigator.clone();
                tokio::spawn(async move {
                    match navigator.navigate(&path).await {
                        Ok(()) => info!(path = %path, "palette: navigated"),
                        Err(e) => send_toast(&tx, format!("navigate: {e}"), ToastKind::Error),
                    }
                });
            }
            Effect::NavigateToResource(resource) => match self.active_peer() {
                Some((context_id, bridge)) => bridge.post(&Envelope::NavigateToResource { context_id, resource }),
                None => {
                    let navigator = self.hosts.navigator.clone();
                    tokio::spawn(async move {
                        if let Err(e) = navigator.show_details(&resource.reference()).await {
                            send_toast(&tx, format!("describe: {e}"), ToastKind::Error);
                        }
                    });
                }
            },
            Effect::OpenLogs(resource) => {
                let Some((ctx, bridge)) = self.active_peer() else {
                    self.toast("no active cluster", ToastKind::Warn);
                    return;
                };
                tokio::spawn(async move {
                    let shown = resource.display();
                    match bridge.open_logs(resource, timeout).await.map_err(PaletteError::from) {
                        Ok(()) => info!(context = %ctx, resource = %shown, "palette: logs opened"),
                        Err(e) => send_toast(&tx, e.to_string(), ToastKind::Error),
                    }
                });
            }
            Effect::DeleteResource(resource) => {
                let Some((ctx, bridge)) = self.active_peer() else {
                    self.toast("no active cluster", ToastKind::Warn);
                    return;
                };
                let confirmer = self.hosts.confirmer.clone();
                let cache = self.cache.clone();
                tokio::spawn(async move {
                    let shown = resource.display();
                    if !confirmer.confirm(&format!("Delete {shown}?")).await {
                        info!(resource = %shown, "palette: delete declined");
                        send_toast(&tx, "delete cancelled".to_string(), ToastKind::Info);
                        return;
                    }
                    match bridge.delete_resource(resource, timeout).await.map_err(PaletteError::from) {
                        Ok(()) => {
                            cache.invalidate(&ctx);
                            info!(context = %ctx, resource = %shown, "palette: deleted");
                            send_toast(&tx, format!("deleted {shown}"), ToastKind::Success);
                        }
                        Err(e) => send_toast(&tx, e.to_string(), ToastKind::Error),
                    }
                });
            }
            Effect::Refresh => {
                let Some((ctx, bridge)) = self.active_peer() else {
                    self.toast("no active cluster", ToastKind::Warn);
                    return;
                };
                let cache = self.cache.clone();
                tokio::spawn(async move {
                    match bridge.get_resources(timeout).await.map_err(PaletteError::from) {
                        Ok(items) => {
                            let n = items.len();
                            cache.put(&ctx, items);
                            send_toast(&tx, format!("refreshed {n} resources"), ToastKind::Success);
                        }
                        Err(e) => send_toast(&tx, format!("refresh: {e}"), ToastKind::Error),
                    }
                });
            }
        }
    }

    /// Forward `toggle` envelopes seen on `transport` to this palette.
    pub fn listen_toggle(&mut self, transport: Arc<dyn Transport>) {
        let mut rx = transport.subscribe();
        let tx = self.updates_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(v) => {
                        let Some(Envelope::Toggle { context_id }) = Envelope::from_value(&v) else { continue };
                        debug!(context = ?context_id, "palette: toggle received");
                        if tx.send(PaletteUpdate::Toggle { context_id }).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "palette: toggle listener lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.listeners.push(task);
    }
}
