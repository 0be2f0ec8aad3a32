//! kpal API surface: the error taxonomy and the narrow collaborator traits the
//! palette core calls into. Hosts (kube-backed, mock, embedding application)
//! implement these; the core never reaches past them.

#![forbid(unsafe_code)]

use kpal_bridge::BridgeError;
use kpal_core::{ClusterInfo, Resource, ResourceRef};
use serde::{Deserialize, Serialize};

pub mod agent;
pub mod mock;

pub use agent::{AgentConfig, ContextAgent};
pub use mock::{MockContextHost, MockPaletteHost};

/// Errors surfaced to the palette and its hosts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PaletteError {
    /// No response within the bound; retried only by explicit user action.
    #[error("timeout: {0}")]
    Timeout(String),
    /// The remote handler ran and reported failure; shown verbatim.
    #[error("{0}")]
    Remote(String),
    /// Command/resource mismatch, rejected before any side effect.
    #[error("{0}")]
    Validation(String),
    /// A collaborator capability is not available right now.
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type PaletteResult<T> = Result<T, PaletteError>;

impl From<BridgeError> for PaletteError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Timeout { .. } => PaletteError::Timeout(e.to_string()),
            BridgeError::Remote(msg) => PaletteError::Remote(msg),
            BridgeError::Closed => PaletteError::Transport(e.to_string()),
            BridgeError::UnexpectedResponse(_) => PaletteError::Internal(e.to_string()),
        }
    }
}

/// Per-kind listing and deletion inside one context.
#[async_trait::async_trait]
pub trait ResourceSource: Send + Sync {
    /// Kinds that can be listed; each is fetched independently.
    async fn kinds(&self) -> PaletteResult<Vec<String>>;

    async fn list_kind(&self, kind: &str) -> PaletteResult<Vec<Resource>>;

    async fn delete(&self, kind: &str, name: &str, namespace: Option<&str>) -> PaletteResult<()>;
}

/// Host navigation: route changes and the details view.
#[async_trait::async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, path: &str) -> PaletteResult<()>;

    async fn show_details(&self, reference: &ResourceRef) -> PaletteResult<()>;
}

#[async_trait::async_trait]
pub trait LogViewer: Send + Sync {
    /// Open the log view for `pod`; `None` selects the default container.
    async fn open_logs(&self, pod: &Resource, container: Option<&str>) -> PaletteResult<()>;
}

#[async_trait::async_trait]
pub trait ClusterCatalog: Send + Sync {
    async fn list_clusters(&self) -> PaletteResult<Vec<ClusterInfo>>;
}

/// Explicit user confirmation for destructive actions.
#[async_trait::async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;
}
