#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use kpal_api::{
    AgentConfig, ClusterCatalog, Confirmer, ContextAgent, MockContextHost, Navigator, PaletteResult,
};
use kpal_bridge::{Bridge, BroadcastTransport};
use kpal_core::{ClusterInfo, ResourceRef};
use kpal_kubehub::{KubeHost, KubeconfigCatalog};
use kpal_palette::{Key, Palette, PaletteConfig, PaletteHosts, RenderModel};
use kpal_store::ResourceCache;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::{load_resources, Output};

pub(crate) enum Source {
    File(PathBuf),
    Kube(Option<String>),
}

/// Palette-side host for the terminal: navigation is printed, confirmation follows `--yes`.
struct ReplHost {
    catalog: Option<KubeconfigCatalog>,
    yes: bool,
}

#[async_trait::async_trait]
impl Navigator for ReplHost {
    async fn navigate(&self, path: &str) -> PaletteResult<()> {
        eprintln!("navigate -> {path}");
        Ok(())
    }

    async fn show_details(&self, reference: &ResourceRef) -> PaletteResult<()> {
        eprintln!("details -> {}/{}", reference.kind, reference.name);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterCatalog for ReplHost {
    async fn list_clusters(&self) -> PaletteResult<Vec<ClusterInfo>> {
        match &self.catalog {
            Some(c) => c.list_clusters().await,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Confirmer for ReplHost {
    async fn confirm(&self, message: &str) -> bool {
        if !self.yes {
            eprintln!("{message} declined (pass --yes to confirm)");
        }
        self.yes
    }
}

pub(crate) async fn run(source: Source, cfg: PaletteConfig, yes: bool, output: Output) -> Result<()> {
    let transport = BroadcastTransport::new(256);
    let agent_cfg = AgentConfig::from_env();
    let (agent, catalog) = match source {
        Source::File(path) => {
            let host = Arc::new(MockContextHost::new(load_resources(&path)?));
            (ContextAgent::new("file", host.clone(), host.clone(), host, agent_cfg), None)
        }
        Source::Kube(context) => {
            let host = Arc::new(KubeHost::connect(context.as_deref()).await?);
            let id = host.context().unwrap_or("default").to_string();
            (ContextAgent::new(id, host.clone(), host.clone(), host, agent_cfg), Some(KubeconfigCatalog))
        }
    };
    let serving = agent.serve(transport.clone());
    info!(context = %agent.context_id(), "repl: agent serving");

    let settle_for = cfg.request_timeout + cfg.debounce;
    let ui = Arc::new(ReplHost { catalog, yes });
    let mut palette = Palette::new(cfg, PaletteHosts::shared(ui), ResourceCache::new());
    palette.register_peer(agent.context_id(), Arc::new(Bridge::new(transport.clone())));
    palette.listen_toggle(transport.clone());
    palette.open();
    settle(&mut palette, settle_for).await;
    print(&palette.render(), output)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !apply_line(&mut palette, &line) {
            break;
        }
        settle(&mut palette, settle_for).await;
        print(&palette.render(), output)?;
    }
    serving.cancel();
    Ok(())
}

/// Apply one input line; returns false on `:quit`.
fn apply_line(palette: &mut Palette, line: &str) -> bool {
    let line = line.trim_end_matches(['\r', '\n']);
    match line {
        ":quit" | ":q" => return false,
        ":open" => palette.open(),
        ":close" => palette.close(),
        _ => match Key::parse(line).filter(|_| line.starts_with(':')) {
            Some(key) => palette.key(key),
            None => {
                if !palette.is_open() {
                    palette.open();
                }
                palette.on_input(line);
            }
        },
    }
    true
}

/// Run updates and the debounce until the palette is idle, then wait out late effect updates.
async fn settle(palette: &mut Palette, limit: Duration) {
    let deadline = Instant::now() + limit;
    let mut quiet = 0u32;
    while Instant::now() < deadline {
        let applied = palette.poll_updates();
        palette.tick();
        let busy = palette.is_loading() || palette.has_pending_input();
        quiet = if busy || applied > 0 { 0 } else { quiet + 1 };
        if quiet >= 5 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn print(model: &RenderModel, output: Output) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string(model)?),
        Output::Human => print_human(model),
    }
    Ok(())
}

fn print_human(m: &RenderModel) {
    if !m.open {
        println!("(closed)");
    } else {
        let ctx = m.context.as_deref().unwrap_or("-");
        let hint = m.hint.as_deref().map(|h| format!("  [tab: {h}]")).unwrap_or_default();
        println!("[{}] {} > {}{}", ctx, m.state.name(), m.buffer, hint);
        if !m.filters.is_empty() {
            println!("filters: {}", m.filters.join(" "));
        }
        if m.loading {
            println!("loading...");
        }
        if let Some(s) = &m.status {
            println!("status: {s}");
        }
        for (i, s) in m.suggestions.iter().enumerate() {
            let mark = if m.suggestion_selected == Some(i) { '*' } else { ' ' };
            println!(" {mark} {s}");
        }
        for (i, r) in m.rows.iter().enumerate() {
            let mark = if m.selected == Some(i) { '>' } else { ' ' };
            println!("{mark} {:<50} {:<30} {:.2}", r.title, r.detail, r.score);
        }
    }
    for t in m.toasts.iter() {
        println!("! {:?}: {}", t.kind, t.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpal_core::Resource;
    use kpal_palette::InputState;

    #[tokio::test]
    async fn lines_drive_the_palette() {
        let host = Arc::new(MockContextHost::new(vec![
            Resource::new("Pod", "nginx-1", Some("web")),
            Resource::new("Service", "nginx", Some("web")),
        ]));
        let transport = BroadcastTransport::new(16);
        let agent = ContextAgent::new("file", host.clone(), host.clone(), host, AgentConfig::default());
        let _serving = agent.serve(transport.clone());
        let ui = Arc::new(ReplHost { catalog: None, yes: false });
        let mut palette = Palette::new(PaletteConfig::default(), PaletteHosts::shared(ui), ResourceCache::new());
        palette.register_peer("file", Arc::new(Bridge::new(transport)));
        palette.open();
        settle(&mut palette, Duration::from_secs(2)).await;
        assert_eq!(palette.resources().len(), 2);

        assert!(apply_line(&mut palette, "/logs ng"));
        settle(&mut palette, Duration::from_secs(2)).await;
        assert_eq!(palette.state(), &InputState::CommandResourceSelect { command: "logs".into() });
        assert_eq!(palette.rows().len(), 1);

        assert!(apply_line(&mut palette, ":esc"));
        assert_eq!(palette.buffer(), "/");
        assert!(apply_line(&mut palette, ":close"));
        assert!(!palette.is_open());
        assert!(!apply_line(&mut palette, ":quit"));
    }
}
