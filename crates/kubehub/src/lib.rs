//! kpal kubehub: a context host backed by a Kubernetes cluster.
//!
//! Listing walks every discovered kind that supports `list`; delete goes through
//! the dynamic API; the cluster catalog is read from kubeconfig.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::time::Instant;

use kpal_api::{ClusterCatalog, LogViewer, Navigator, PaletteError, PaletteResult, ResourceSource};
use kpal_core::{ClusterInfo, Resource, ResourceRef};
use kube::{
    api::{Api, DeleteParams, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject},
    discovery::{verbs, Discovery, Scope},
    Client, Config,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// One listable kind as served by the API server.
#[derive(Debug, Clone)]
pub struct KindEntry {
    pub ar: ApiResource,
    pub namespaced: bool,
}

pub struct KubeHost {
    client: Client,
    context: Option<String>,
    kinds: OnceCell<BTreeMap<String, KindEntry>>,
}

fn unavailable(e: impl std::fmt::Display) -> PaletteError { PaletteError::Unavailable(e.to_string()) }

fn remote(e: kube::Error) -> PaletteError {
    match e {
        kube::Error::Api(resp) => PaletteError::Remote(resp.message),
        other => PaletteError::Unavailable(other.to_string()),
    }
}

impl KubeHost {
    /// Connect using the given kubeconfig context, or the default client config.
    pub async fn connect(context: Option<&str>) -> PaletteResult<Self> {
        let client = match context {
            Some(name) => {
                let opts = KubeConfigOptions { context: Some(name.to_string()), ..Default::default() };
                let cfg = Config::from_kubeconfig(&opts).await.map_err(unavailable)?;
                Client::try_from(cfg).map_err(unavailable)?
            }
            None => Client::try_default().await.map_err(unavailable)?,
        };
        info!(context = %context.unwrap_or("(default)"), "kubehub: connected");
        Ok(Self { client, context: context.map(|s| s.to_string()), kinds: OnceCell::new() })
    }

    pub fn context(&self) -> Option<&str> { self.context.as_deref() }

    async fn discovered(&self) -> PaletteResult<&BTreeMap<String, KindEntry>> {
        self.kinds
            .get_or_try_init(|| async {
                let t0 = Instant::now();
                let discovery = Discovery::new(self.client.clone()).run().await.map_err(unavailable)?;
                let mut found = Vec::new();
                for group in discovery.groups() {
                    for (ar, caps) in group.recommended_resources() {
                        if !caps.supports_operation(verbs::LIST) {
                            continue;
                        }
                        found.push(KindEntry { ar, namespaced: matches!(caps.scope, Scope::Namespaced) });
                    }
                }
                let kinds = index_kinds(found);
                info!(kinds = kinds.len(), took_ms = %t0.elapsed().as_millis(), "kubehub: discovery ok");
                Ok(kinds)
            })
            .await
    }

    async fn entry(&self, kind: &str) -> PaletteResult<KindEntry> {
        self.discovered()
            .await?
            .get(kind)
            .cloned()
            .ok_or_else(|| PaletteError::Validation(format!("kind not served: {kind}")))
    }
}

/// Key discovered kinds by kind name; the first group wins (core before named groups).
pub fn index_kinds(mut found: Vec<KindEntry>) -> BTreeMap<String, KindEntry> {
    found.sort_by(|a, b| a.ar.group.cmp(&b.ar.group).then(a.ar.version.cmp(&b.ar.version)));
    let mut out = BTreeMap::new();
    for e in found {
        out.entry(e.ar.kind.clone()).or_insert(e);
    }
    out
}

/// Shape one listed object into a palette resource.
pub fn resource_from(obj: &DynamicObject, ar: &ApiResource) -> Resource {
    let mut r = Resource::new(
        ar.kind.as_str(),
        obj.metadata.name.clone().unwrap_or_default(),
        obj.metadata.namespace.as_deref(),
    );
    r.uid = obj.metadata.uid.clone().unwrap_or_default();
    r.api_version = ar.api_version.clone();
    r
}

/// One catalog entry per kubeconfig context, in file order.
pub fn clusters_from(kubeconfig: &Kubeconfig) -> Vec<ClusterInfo> {
    kubeconfig
        .contexts
        .iter()
        .map(|c| {
            let cluster = c.context.as_ref().map(|ctx| ctx.cluster.clone()).filter(|s| !s.is_empty());
            let name = match cluster {
                Some(cl) if cl != c.name => format!("{} ({})", c.name, cl),
                _ => c.name.clone(),
            };
            ClusterInfo { id: c.name.clone(), name }
        })
        .collect()
}

#[async_trait::async_trait]
impl ResourceSource for KubeHost {
    async fn kinds(&self) -> PaletteResult<Vec<String>> {
        Ok(self.discovered().await?.keys().cloned().collect())
    }

    async fn list_kind(&self, kind: &str) -> PaletteResult<Vec<Resource>> {
        let t0 = Instant::now();
        let entry = self.entry(kind).await?;
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &entry.ar);
        let list = api.list(&ListParams::default()).await.map_err(remote)?;
        let items: Vec<Resource> = list.items.iter().map(|o| resource_from(o, &entry.ar)).collect();
        debug!(kind = %kind, items = items.len(), took_ms = %t0.elapsed().as_millis(), "kubehub: list ok");
        Ok(items)
    }

    async fn delete(&self, kind: &str, name: &str, namespace: Option<&str>) -> PaletteResult<()> {
        let entry = self.entry(kind).await?;
        let api: Api<DynamicObject> = match (entry.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &entry.ar),
            (true, None) => return Err(PaletteError::Validation(format!("{kind} {name}: namespace required"))),
            (false, _) => Api::all_with(self.client.clone(), &entry.ar),
        };
        api.delete(name, &DeleteParams::default()).await.map_err(remote)?;
        metrics::counter!("kubehub_deletes_total", 1u64, "kind" => kind.to_string());
        info!(kind = %kind, name = %name, ns = %namespace.unwrap_or("-"), "kubehub: deleted");
        Ok(())
    }
}

// A terminal host has no views; navigation and logs are reported as intents.
#[async_trait::async_trait]
impl Navigator for KubeHost {
    async fn navigate(&self, path: &str) -> PaletteResult<()> {
        info!(path = %path, "kubehub: navigate");
        Ok(())
    }

    async fn show_details(&self, reference: &ResourceRef) -> PaletteResult<()> {
        info!(kind = %reference.kind, name = %reference.name, ns = %reference.namespace.as_deref().unwrap_or("-"), "kubehub: show details");
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogViewer for KubeHost {
    async fn open_logs(&self, pod: &Resource, container: Option<&str>) -> PaletteResult<()> {
        info!(pod = %pod.display(), container = %container.unwrap_or("(default)"), "kubehub: open logs");
        Ok(())
    }
}

/// Cluster catalog read from the local kubeconfig on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct KubeconfigCatalog;

#[async_trait::async_trait]
impl ClusterCatalog for KubeconfigCatalog {
    async fn list_clusters(&self) -> PaletteResult<Vec<ClusterInfo>> {
        let kc = Kubeconfig::read().map_err(unavailable)?;
        Ok(clusters_from(&kc))
    }
}
