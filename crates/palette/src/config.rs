#![forbid(unsafe_code)]

use std::time::Duration;

/// Palette tunables, read from the environment with defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteConfig {
    /// Bound for one cross-context round trip (`KPAL_REQUEST_TIMEOUT_MS`).
    pub request_timeout: Duration,
    /// Keystroke to re-rank delay (`KPAL_DEBOUNCE_MS`).
    pub debounce: Duration,
    /// Leading text that switches to command mode (`KPAL_COMMAND_PREFIX`).
    pub command_prefix: String,
    /// Base toast lifetime (`KPAL_TOAST_MS`); warnings and errors stay longer.
    pub toast_ms: u64,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            request_timeout: kpal_bridge::DEFAULT_TIMEOUT,
            debounce: Duration::from_millis(150),
            command_prefix: "/".to_string(),
            toast_ms: 3000,
        }
    }
}

impl PaletteConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let request_timeout = std::env::var("KPAL_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.request_timeout);
        let debounce = std::env::var("KPAL_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.debounce);
        let command_prefix = std::env::var("KPAL_COMMAND_PREFIX")
            .ok()
            .filter(|s| !s.is_empty() && !s.chars().any(char::is_whitespace))
            .unwrap_or(d.command_prefix);
        let toast_ms = std::env::var("KPAL_TOAST_MS").ok().and_then(|s| s.parse::<u64>().ok()).unwrap_or(d.toast_ms);
        Self { request_timeout, debounce, command_prefix, toast_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PaletteConfig::default();
        assert_eq!(c.request_timeout, Duration::from_millis(10_000));
        assert_eq!(c.debounce, Duration::from_millis(150));
        assert_eq!(c.command_prefix, "/");
        assert_eq!(c.toast_ms, 3000);
    }
}
