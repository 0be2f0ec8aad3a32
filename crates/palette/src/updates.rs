#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::model::{InputState, PaletteUpdate, ToastKind};
use crate::{commands, Palette};

impl Palette {
    /// Apply every update already delivered by background tasks. Returns how many were applied.
    pub fn poll_updates(&mut self) -> usize {
        let mut n = 0usize;
        while let Ok(u) = self.updates_rx.try_recv() {
            self.apply_update(u);
            n += 1;
        }
        n
    }

    /// Wait for the next background update and apply it.
    pub async fn next_update(&mut self) {
        if let Some(u) = self.updates_rx.recv().await {
            self.apply_update(u);
        }
    }

    pub fn apply_update(&mut self, update: PaletteUpdate) {
        match update {
            PaletteUpdate::Resources { generation, context_id, background, result } => {
                if !self.open || generation != self.generation || self.active.as_deref() != Some(context_id.as_str()) {
                    debug!(generation, current = self.generation, context = %context_id, "palette: stale resources dropped");
                    return;
                }
                self.loading = false;
                match result {
                    Ok(items) => {
                        self.resources = self.cache.get(&context_id).unwrap_or_else(|| Arc::new(items));
                        self.status = None;
                        info!(context = %context_id, items = self.resources.len(), background, "palette: resources applied");
                    }
                    Err(e) if background => {
                        warn!(context = %context_id, error = %e, "palette: refresh failed, keeping snapshot");
                        self.status = Some(format!("showing cached results: {e}"));
                    }
                    Err(e) => {
                        self.resources = Arc::new(Vec::new());
                        self.status = Some(format!("failed to load resources: {e}"));
                        self.toast(format!("resources: {e}"), ToastKind::Warn);
                    }
                }
                // a background refresh must not move the highlight under the user
                self.rebuild(!background);
            }
            PaletteUpdate::Clusters { generation, result } => match result {
                Ok(clusters) => {
                    debug!(clusters = clusters.len(), "palette: clusters");
                    self.clusters = clusters;
                    if self.open && generation == self.generation {
                        self.commands = commands::build(&self.clusters);
                        self.reclassify();
                        if matches!(self.classified.state, InputState::CommandList | InputState::CommandSearching { .. }) {
                            self.rebuild(false);
                        }
                    }
                }
                Err(e) => debug!(error = %e, "palette: cluster catalog unavailable"),
            },
            PaletteUpdate::Toggle { context_id } => {
                // opening from a context scopes the session to it
                if let (false, Some(id)) = (self.open, context_id.as_deref()) {
                    self.set_active(Some(id));
                }
                self.toggle();
            }
            PaletteUpdate::Toast { text, kind } => self.toast(text, kind),
        }
    }
}
