//! In-memory hosts for tests and the CLI `--file` mode. Every call is recorded.

#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use kpal_core::{ClusterInfo, Resource, ResourceRef};

use crate::{ClusterCatalog, Confirmer, LogViewer, Navigator, PaletteError, PaletteResult, ResourceSource};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Context-side host backed by a resource vector.
#[derive(Default)]
pub struct MockContextHost {
    resources: Mutex<Vec<Resource>>,
    /// kind -> remaining failures (`u32::MAX` fails forever)
    failing: Mutex<HashMap<String, u32>>,
    delete_error: Mutex<Option<String>>,
    logs_error: Mutex<Option<String>>,
    clusters: Vec<ClusterInfo>,
    calls: Mutex<Vec<String>>,
}

impl MockContextHost {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources: Mutex::new(resources), ..Self::default() }
    }

    pub fn with_clusters(mut self, clusters: Vec<ClusterInfo>) -> Self {
        self.clusters = clusters;
        self
    }

    /// Make listing `kind` fail `times` times before succeeding.
    pub fn fail_kind(&self, kind: &str, times: u32) {
        lock(&self.failing).insert(kind.to_string(), times);
    }

    pub fn fail_deletes(&self, msg: &str) {
        *lock(&self.delete_error) = Some(msg.to_string());
    }

    pub fn fail_logs(&self, msg: &str) {
        *lock(&self.logs_error) = Some(msg.to_string());
    }

    pub fn set_resources(&self, resources: Vec<Resource>) {
        *lock(&self.resources) = resources;
    }

    pub fn resources(&self) -> Vec<Resource> { lock(&self.resources).clone() }

    /// Recorded calls, e.g. `list:Pod`, `delete:Pod/ns1/a`, `logs:Pod/ns1/a`.
    pub fn calls(&self) -> Vec<String> { lock(&self.calls).clone() }

    fn record(&self, call: String) { lock(&self.calls).push(call); }
}

#[async_trait::async_trait]
impl ResourceSource for MockContextHost {
    async fn kinds(&self) -> PaletteResult<Vec<String>> {
        let mut kinds: BTreeSet<String> = lock(&self.resources).iter().map(|r| r.kind.clone()).collect();
        kinds.extend(lock(&self.failing).keys().cloned());
        Ok(kinds.into_iter().collect())
    }

    async fn list_kind(&self, kind: &str) -> PaletteResult<Vec<Resource>> {
        self.record(format!("list:{kind}"));
        {
            let mut failing = lock(&self.failing);
            if let Some(left) = failing.get_mut(kind) {
                if *left > 0 {
                    if *left != u32::MAX {
                        *left -= 1;
                    }
                    return Err(PaletteError::Unavailable(format!("listing {kind} failed")));
                }
            }
        }
        Ok(lock(&self.resources).iter().filter(|r| r.kind == kind).cloned().collect())
    }

    async fn delete(&self, kind: &str, name: &str, namespace: Option<&str>) -> PaletteResult<()> {
        let target = Resource::new(kind, name, namespace);
        self.record(format!("delete:{}", target.display()));
        if let Some(msg) = lock(&self.delete_error).clone() {
            return Err(PaletteError::Remote(msg));
        }
        lock(&self.resources).retain(|r| !(r.kind == kind && r.name == name && r.namespace.as_deref() == namespace));
        Ok(())
    }
}

#[async_trait::async_trait]
impl Navigator for MockContextHost {
    async fn navigate(&self, path: &str) -> PaletteResult<()> {
        self.record(format!("navigate:{path}"));
        Ok(())
    }

    async fn show_details(&self, reference: &ResourceRef) -> PaletteResult<()> {
        let r = Resource::new(reference.kind.as_str(), reference.name.as_str(), reference.namespace.as_deref());
        self.record(format!("details:{}", r.display()));
        Ok(())
    }
}

#[async_trait::async_trait]
impl LogViewer for MockContextHost {
    async fn open_logs(&self, pod: &Resource, container: Option<&str>) -> PaletteResult<()> {
        self.record(format!("logs:{}{}", pod.display(), container.map(|c| format!(":{c}")).unwrap_or_default()));
        match lock(&self.logs_error).clone() {
            Some(msg) => Err(PaletteError::Remote(msg)),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl ClusterCatalog for MockContextHost {
    async fn list_clusters(&self) -> PaletteResult<Vec<ClusterInfo>> { Ok(self.clusters.clone()) }
}

/// Palette-side host: navigation, cluster catalog and a scripted confirmation prompt.
pub struct MockPaletteHost {
    clusters: Mutex<Option<Vec<ClusterInfo>>>,
    confirm_answer: Mutex<bool>,
    prompts: Mutex<Vec<String>>,
    navigations: Mutex<Vec<String>>,
}

impl Default for MockPaletteHost {
    fn default() -> Self {
        Self {
            clusters: Mutex::new(Some(Vec::new())),
            confirm_answer: Mutex::new(true),
            prompts: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
        }
    }
}

impl MockPaletteHost {
    pub fn new(clusters: Vec<ClusterInfo>) -> Self {
        Self { clusters: Mutex::new(Some(clusters)), ..Self::default() }
    }

    /// Catalog reports unavailable until clusters are set again.
    pub fn catalog_unavailable(&self) { *lock(&self.clusters) = None; }

    pub fn set_clusters(&self, clusters: Vec<ClusterInfo>) { *lock(&self.clusters) = Some(clusters); }

    pub fn answer_confirm(&self, yes: bool) { *lock(&self.confirm_answer) = yes; }

    pub fn prompts(&self) -> Vec<String> { lock(&self.prompts).clone() }

    pub fn navigations(&self) -> Vec<String> { lock(&self.navigations).clone() }
}

#[async_trait::async_trait]
impl Navigator for MockPaletteHost {
    async fn navigate(&self, path: &str) -> PaletteResult<()> {
        lock(&self.navigations).push(path.to_string());
        Ok(())
    }

    async fn show_details(&self, reference: &ResourceRef) -> PaletteResult<()> {
        lock(&self.navigations).push(format!("details:{}/{}", reference.kind, reference.name));
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterCatalog for MockPaletteHost {
    async fn list_clusters(&self) -> PaletteResult<Vec<ClusterInfo>> {
        lock(&self.clusters).clone().ok_or_else(|| PaletteError::Unavailable("cluster catalog not ready".into()))
    }
}

#[async_trait::async_trait]
impl Confirmer for MockPaletteHost {
    async fn confirm(&self, message: &str) -> bool {
        lock(&self.prompts).push(message.to_string());
        *lock(&self.confirm_answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_kind_recovers_after_scripted_failures() {
        let host = MockContextHost::new(vec![Resource::new("Pod", "a", Some("ns1"))]);
        host.fail_kind("Pod", 1);
        assert!(host.list_kind("Pod").await.is_err());
        assert_eq!(host.list_kind("Pod").await.unwrap().len(), 1);
        assert_eq!(host.calls(), vec!["list:Pod", "list:Pod"]);
    }

    #[tokio::test]
    async fn delete_removes_matching_resource() {
        let host = MockContextHost::new(vec![Resource::new("Pod", "a", Some("ns1")), Resource::new("Pod", "a", Some("ns2"))]);
        host.delete("Pod", "a", Some("ns1")).await.unwrap();
        assert_eq!(host.resources(), vec![Resource::new("Pod", "a", Some("ns2"))]);
        host.fail_deletes("forbidden");
        assert_eq!(host.delete("Pod", "a", Some("ns2")).await, Err(PaletteError::Remote("forbidden".into())));
    }

    #[tokio::test]
    async fn palette_host_records_prompts_and_answers() {
        let host = MockPaletteHost::default();
        host.answer_confirm(false);
        assert!(!host.confirm("Delete Pod/ns1/a?").await);
        assert_eq!(host.prompts(), vec!["Delete Pod/ns1/a?"]);
        host.catalog_unavailable();
        assert!(host.list_clusters().await.is_err());
    }
}
