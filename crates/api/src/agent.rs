//! Context-side agent: answers palette requests from the host capabilities.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use kpal_bridge::{Backoff, CancelHandle, Responder, Transport};
use kpal_core::{ContextId, Envelope, Reply, RequestKind, Resource};
use tracing::{debug, info, warn};

use crate::{LogViewer, Navigator, PaletteError, PaletteResult, ResourceSource};

/// Listing retry policy, from `KPAL_LIST_RETRIES`, `KPAL_BACKOFF_BASE_MS`, `KPAL_BACKOFF_MAX_MS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    pub backoff: Backoff,
}

impl Default for AgentConfig {
    fn default() -> Self { Self { backoff: Backoff::default() } }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        let d = Backoff::default();
        let attempts = std::env::var("KPAL_LIST_RETRIES").ok().and_then(|s| s.parse::<u32>().ok()).unwrap_or(d.attempts);
        let base_ms = std::env::var("KPAL_BACKOFF_BASE_MS").ok().and_then(|s| s.parse::<u64>().ok());
        let max_ms = std::env::var("KPAL_BACKOFF_MAX_MS").ok().and_then(|s| s.parse::<u64>().ok());
        let base = base_ms.map(Duration::from_millis).unwrap_or(d.base);
        let max = max_ms.map(Duration::from_millis).unwrap_or(d.max);
        Self { backoff: Backoff::new(attempts, base, max) }
    }
}

/// Outcome of a full listing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collected {
    pub resources: Vec<Resource>,
    /// Kinds skipped after exhausting retries.
    pub failed_kinds: Vec<String>,
}

pub struct ContextAgent {
    context_id: ContextId,
    source: Arc<dyn ResourceSource>,
    navigator: Arc<dyn Navigator>,
    logs: Arc<dyn LogViewer>,
    config: AgentConfig,
}

impl ContextAgent {
    pub fn new(
        context_id: impl Into<ContextId>,
        source: Arc<dyn ResourceSource>,
        navigator: Arc<dyn Navigator>,
        logs: Arc<dyn LogViewer>,
        config: AgentConfig,
    ) -> Arc<Self> {
        Arc::new(Self { context_id: context_id.into(), source, navigator, logs, config })
    }

    pub fn context_id(&self) -> &str { &self.context_id }

    /// List every kind. Kinds failing after retries are skipped and counted;
    /// only failing to enumerate kinds at all is an error.
    pub async fn collect(&self) -> PaletteResult<Collected> {
        let t0 = Instant::now();
        let kinds = self.source.kinds().await?;
        let mut out = Collected::default();
        for kind in kinds.iter() {
            let label = format!("list {kind}");
            match self.config.backoff.retry(&label, |_| self.source.list_kind(kind)).await {
                Ok(mut items) => out.resources.append(&mut items),
                Err(e) => {
                    metrics::counter!("agent_kind_failures_total", 1u64, "kind" => kind.clone());
                    warn!(context = %self.context_id, kind = %kind, error = %e, "agent: kind listing failed; skipped");
                    out.failed_kinds.push(kind.clone());
                }
            }
        }
        info!(
            context = %self.context_id,
            kinds = kinds.len(),
            failed = out.failed_kinds.len(),
            items = out.resources.len(),
            took_ms = %t0.elapsed().as_millis(),
            "agent: collected"
        );
        Ok(out)
    }

    pub async fn delete(&self, resource: &Resource) -> PaletteResult<()> {
        info!(context = %self.context_id, resource = %resource.display(), "agent: delete");
        self.source.delete(&resource.kind, &resource.name, resource.namespace.as_deref()).await
    }

    pub async fn open_logs(&self, resource: &Resource) -> PaletteResult<()> {
        if !resource.is_kind("Pod") {
            return Err(PaletteError::Validation(format!("logs are only available for pods, not {}", resource.kind)));
        }
        self.logs.open_logs(resource, None).await
    }

    /// Register handlers for every request type and serve them on `transport`.
    pub fn serve(self: &Arc<Self>, transport: Arc<dyn Transport>) -> CancelHandle {
        let list_agent = self.clone();
        let delete_agent = self.clone();
        let logs_agent = self.clone();
        let nav_agent = self.clone();
        Responder::new()
            .on_request(RequestKind::GetResources, move |_env| {
                let agent = list_agent.clone();
                async move {
                    let collected = agent.collect().await.map_err(|e| e.to_string())?;
                    Ok(Reply::Resources(collected.resources))
                }
            })
            .on_request(RequestKind::DeleteResource, move |env| {
                let agent = delete_agent.clone();
                async move {
                    let Envelope::DeleteResource { resource, .. } = env else {
                        return Err("malformed delete-resource".to_string());
                    };
                    agent.delete(&resource).await.map_err(|e| e.to_string())?;
                    Ok(Reply::Done)
                }
            })
            .on_request(RequestKind::OpenLogs, move |env| {
                let agent = logs_agent.clone();
                async move {
                    let Envelope::OpenLogs { resource, .. } = env else {
                        return Err("malformed open-logs".to_string());
                    };
                    agent.open_logs(&resource).await.map_err(|e| e.to_string())?;
                    Ok(Reply::Done)
                }
            })
            .on_notify(move |env| {
                let Envelope::NavigateToResource { context_id, resource } = env else { return };
                if context_id != nav_agent.context_id {
                    debug!(target_context = %context_id, context = %nav_agent.context_id, "agent: navigate for another context ignored");
                    return;
                }
                let navigator = nav_agent.navigator.clone();
                tokio::spawn(async move {
                    if let Err(e) = navigator.show_details(&resource.reference()).await {
                        warn!(resource = %resource.display(), error = %e, "agent: show details failed");
                    }
                });
            })
            .serve(transport)
    }

    /// Ask the palette to open or close, scoped to this context.
    pub fn toggle(&self, transport: &dyn Transport) {
        debug!(context = %self.context_id, "agent: toggle");
        transport.post(Envelope::Toggle { context_id: Some(self.context_id.clone()) }.to_value());
    }
}
