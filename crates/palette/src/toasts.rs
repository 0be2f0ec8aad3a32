#![forbid(unsafe_code)]

use std::time::Instant;

use tracing::debug;

use crate::model::{Toast, ToastKind, ToastView};
use crate::Palette;

impl Palette {
    pub(crate) fn toast(&mut self, text: impl Into<String>, kind: ToastKind) {
        let base = self.cfg.toast_ms;
        let dur = match kind {
            ToastKind::Error => base + 2000,
            ToastKind::Warn => base + 1000,
            _ => base,
        };
        let text = text.into();
        debug!(kind = ?kind, text = %text, "palette: toast");
        self.toasts.push(Toast { text, kind, created: Instant::now(), duration_ms: dur });
    }

    pub(crate) fn prune_toasts(&mut self, now: Instant) {
        self.toasts.retain(|t| now.saturating_duration_since(t.created).as_millis() < t.duration_ms as u128);
    }

    /// Live toasts, oldest first.
    pub fn toasts(&self) -> Vec<ToastView> {
        self.toasts.iter().map(|t| ToastView { kind: t.kind, text: t.text.clone() }).collect()
    }
}
