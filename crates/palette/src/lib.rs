//! kpal palette: the in-process command palette engine.
//!
//! A [`Palette`] owns the text buffer, the active filters and the ranked rows.
//! It talks to one [`Bridge`] per browsing context, reads resource snapshots
//! through the shared [`ResourceCache`] and runs command effects on background
//! tasks whose results come back as [`PaletteUpdate`]s. The embedding
//! application drives it with `on_input`, `key`, `tick` and `poll_updates` and
//! draws whatever `render` returns.

#![forbid(unsafe_code)]

pub mod commands;
pub mod config;
pub mod input;
pub mod keys;
pub mod model;
mod tasks;
mod toasts;
mod updates;

pub use commands::{Command, CommandAction, Effect};
pub use config::PaletteConfig;
pub use keys::Key;
pub use model::{InputState, PaletteUpdate, RenderModel, Row, RowTarget, ToastKind, ToastView};

use std::sync::Arc;
use std::time::Instant;

use kpal_api::{ClusterCatalog, Confirmer, Navigator, PaletteError, PaletteResult};
use kpal_bridge::Bridge;
use kpal_core::{ClusterInfo, ContextId, Filter, FilterAttribute, Resource};
use kpal_search::{highlight, rank, suggest, FilterSet};
use kpal_store::ResourceCache;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use input::Classified;
use model::Toast;

/// Palette-side collaborators.
#[derive(Clone)]
pub struct PaletteHosts {
    pub navigator: Arc<dyn Navigator>,
    pub catalog: Arc<dyn ClusterCatalog>,
    pub confirmer: Arc<dyn Confirmer>,
}

impl PaletteHosts {
    pub fn new(navigator: Arc<dyn Navigator>, catalog: Arc<dyn ClusterCatalog>, confirmer: Arc<dyn Confirmer>) -> Self {
        Self { navigator, catalog, confirmer }
    }

    /// One host object playing every role.
    pub fn shared<H>(host: Arc<H>) -> Self
    where
        H: Navigator + ClusterCatalog + Confirmer + 'static,
    {
        Self { navigator: host.clone(), catalog: host.clone(), confirmer: host }
    }
}

pub struct Palette {
    cfg: PaletteConfig,
    hosts: PaletteHosts,
    cache: ResourceCache,
    peers: FxHashMap<ContextId, Arc<Bridge>>,
    active: Option<ContextId>,
    open: bool,
    /// Bumped on every open; updates from older sessions are dropped.
    generation: u64,
    buffer: String,
    classified: Classified,
    filters: FilterSet,
    resources: Arc<Vec<Resource>>,
    loading: bool,
    status: Option<String>,
    clusters: Vec<ClusterInfo>,
    commands: Vec<Command>,
    rows: Vec<Row>,
    selected: usize,
    suggestions: Vec<String>,
    suggestion_sel: usize,
    /// Time of the last edit still waiting for its debounced re-rank.
    changed_at: Option<Instant>,
    toasts: Vec<Toast>,
    updates_tx: mpsc::UnboundedSender<PaletteUpdate>,
    updates_rx: mpsc::UnboundedReceiver<PaletteUpdate>,
    listeners: Vec<JoinHandle<()>>,
}

impl Palette {
    pub fn new(cfg: PaletteConfig, hosts: PaletteHosts, cache: ResourceCache) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let classified = input::classify("", &cfg.command_prefix, &[]);
        Self {
            cfg,
            hosts,
            cache,
            peers: FxHashMap::default(),
            active: None,
            open: false,
            generation: 0,
            buffer: String::new(),
            classified,
            filters: FilterSet::new(),
            resources: Arc::new(Vec::new()),
            loading: false,
            status: None,
            clusters: Vec::new(),
            commands: commands::build(&[]),
            rows: Vec::new(),
            selected: 0,
            suggestions: Vec::new(),
            suggestion_sel: 0,
            changed_at: None,
            toasts: Vec::new(),
            updates_tx,
            updates_rx,
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> &PaletteConfig { &self.cfg }

    pub fn cache(&self) -> &ResourceCache { &self.cache }

    /// Register the bridge for a context. The first registered context becomes active.
    pub fn register_peer(&mut self, context_id: impl Into<ContextId>, bridge: Arc<Bridge>) {
        let id = context_id.into();
        info!(context = %id, "palette: peer registered");
        self.peers.insert(id.clone(), bridge);
        if self.active.is_none() {
            self.set_active(Some(&id));
        }
    }

    /// Switch the context resources are loaded from; `None` leaves command-only mode.
    /// Returns false for an unregistered context.
    pub fn set_active(&mut self, context_id: Option<&str>) -> bool {
        let next = match context_id {
            Some(id) if self.peers.contains_key(id) => Some(id.to_string()),
            Some(id) => {
                debug!(context = %id, "palette: unknown context");
                return false;
            }
            None => None,
        };
        if next == self.active {
            return true;
        }
        info!(from = ?self.active, to = ?next, "palette: active context");
        self.active = next;
        if self.open {
            self.load_resources();
            self.rebuild(true);
        }
        true
    }

    pub fn active_context(&self) -> Option<&str> { self.active.as_deref() }

    pub(crate) fn active_peer(&self) -> Option<(ContextId, Arc<Bridge>)> {
        let id = self.active.as_ref()?;
        self.peers.get(id).map(|b| (id.clone(), b.clone()))
    }

    pub fn is_open(&self) -> bool { self.open }

    pub fn generation(&self) -> u64 { self.generation }

    pub fn state(&self) -> &InputState { &self.classified.state }

    pub fn buffer(&self) -> &str { &self.buffer }

    pub fn filters(&self) -> &FilterSet { &self.filters }

    pub fn rows(&self) -> &[Row] { &self.rows }

    pub fn selected(&self) -> Option<usize> { (!self.rows.is_empty()).then_some(self.selected) }

    pub fn commands(&self) -> &[Command] { &self.commands }

    pub fn resources(&self) -> &[Resource] { &self.resources }

    pub fn suggestions(&self) -> &[String] { &self.suggestions }

    pub fn is_loading(&self) -> bool { self.loading }

    pub fn status(&self) -> Option<&str> { self.status.as_deref() }

    /// Edit waiting for its debounced re-rank.
    pub fn has_pending_input(&self) -> bool { self.changed_at.is_some() }

    /// Start a new session: empty buffer and filters, fresh commands, cached or fetched resources.
    pub fn open(&mut self) {
        self.generation += 1;
        self.open = true;
        self.buffer.clear();
        self.filters.clear();
        self.selected = 0;
        self.suggestion_sel = 0;
        self.changed_at = None;
        self.status = None;
        self.commands = commands::build(&self.clusters);
        self.reclassify();
        info!(generation = self.generation, context = ?self.active, "palette: open");
        self.spawn_catalog();
        self.load_resources();
        self.rebuild(true);
    }

    /// Close the session; filters and any pending re-rank are discarded.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.buffer.clear();
        self.filters.clear();
        self.changed_at = None;
        self.rows.clear();
        self.suggestions.clear();
        self.selected = 0;
        self.loading = false;
        self.reclassify();
        info!(generation = self.generation, "palette: close");
    }

    pub fn toggle(&mut self) {
        if self.open {
            self.close();
        } else {
            self.open();
        }
    }

    fn load_resources(&mut self) {
        let Some((ctx, bridge)) = self.active_peer() else {
            debug!("palette: no active context, commands only");
            self.resources = Arc::new(Vec::new());
            self.loading = false;
            return;
        };
        match self.cache.get(&ctx) {
            Some(snapshot) => {
                debug!(context = %ctx, items = snapshot.len(), "palette: cache hit");
                self.resources = snapshot;
                self.loading = false;
                self.spawn_fetch(ctx, bridge, true);
            }
            None => {
                debug!(context = %ctx, "palette: cache miss");
                self.resources = Arc::new(Vec::new());
                self.loading = true;
                self.spawn_fetch(ctx, bridge, false);
            }
        }
    }

    pub fn on_input(&mut self, text: &str) { self.on_input_at(text, Instant::now()) }

    /// Replace the buffer. The mode changes at once; resource ranking waits for the debounce.
    pub fn on_input_at(&mut self, text: &str, now: Instant) {
        if !self.open {
            return;
        }
        self.buffer = text.to_string();
        self.reclassify();
        match self.classified.state {
            InputState::Idle | InputState::CommandList | InputState::CommandSearching { .. } => {
                self.changed_at = None;
                self.rebuild(true);
            }
            _ => self.changed_at = Some(now),
        }
    }

    pub fn tick(&mut self) -> bool { self.tick_at(Instant::now()) }

    /// Expire toasts and run the debounced re-rank when due. Returns true when rows were rebuilt.
    pub fn tick_at(&mut self, now: Instant) -> bool {
        self.prune_toasts(now);
        match self.changed_at {
            Some(at) if now.saturating_duration_since(at) >= self.cfg.debounce => {
                self.changed_at = None;
                self.rebuild(true);
                true
            }
            _ => false,
        }
    }

    fn flush(&mut self) {
        if self.changed_at.take().is_some() {
            self.rebuild(true);
        }
    }

    fn reclassify(&mut self) {
        let next = input::classify(&self.buffer, &self.cfg.command_prefix, &self.commands);
        if next.state != self.classified.state {
            debug!(from = self.classified.state.name(), to = next.state.name(), "palette: state");
            self.suggestion_sel = 0;
        }
        self.classified = next;
    }

    fn set_buffer(&mut self, text: String) {
        self.buffer = text;
        self.changed_at = None;
        self.reclassify();
        self.rebuild(true);
    }

    pub(crate) fn rebuild(&mut self, reset_selection: bool) {
        let t0 = Instant::now();
        let query = self.classified.query.clone();
        let state = self.classified.state.clone();
        let suggestions = match &state {
            InputState::AttributeSuggest { attribute, command } => {
                let accepted = command.as_deref().and_then(|id| self.command(id)).and_then(|c| c.accepted_kinds.as_deref());
                let partial = self.classified.attr.as_ref().map(|a| a.partial.as_str()).unwrap_or("");
                suggest(&self.resources, *attribute, partial, accepted)
            }
            _ => Vec::new(),
        };
        let rows = match &state {
            InputState::Idle | InputState::Searching => self.resource_rows(&query, None),
            InputState::AttributeSuggest { command, .. } => {
                let cmd = command.as_deref().and_then(|id| self.command(id));
                self.resource_rows(&query, cmd)
            }
            InputState::CommandList | InputState::CommandSearching { .. } => self.command_rows(&query),
            InputState::CommandResourceSelect { command } => match self.command(command) {
                Some(cmd) => self.resource_rows(&query, Some(cmd)),
                None => Vec::new(),
            },
        };
        self.suggestions = suggestions;
        self.rows = rows;
        if reset_selection {
            self.selected = 0;
        } else {
            self.selected = self.selected.min(self.rows.len().saturating_sub(1));
        }
        if self.suggestion_sel >= self.suggestions.len() {
            self.suggestion_sel = 0;
        }
        let ms = t0.elapsed().as_secs_f64() * 1000.0;
        histogram!("palette_rank_ms", ms);
        debug!(state = state.name(), query = %query, rows = self.rows.len(), ms = %format!("{:.2}", ms), "palette: ranked");
    }

    /// Filtered, ranked resources. With a command, only kinds it accepts whose display contains the query.
    fn resource_rows(&self, query: &str, command: Option<&Command>) -> Vec<Row> {
        let resources = self.resources.as_slice();
        let mut idx = self.filters.apply_indices(resources);
        if let Some(cmd) = command {
            let needle = query.to_lowercase();
            idx.retain(|&i| {
                let r = &resources[i];
                cmd.accepts(&r.kind) && (needle.is_empty() || r.display().to_lowercase().contains(&needle))
            });
        }
        let visible: Vec<&Resource> = idx.iter().map(|&i| &resources[i]).collect();
        rank(&visible, query)
            .into_iter()
            .map(|h| {
                let r = visible[h.idx];
                let title = r.display();
                Row {
                    target: RowTarget::Resource(idx[h.idx]),
                    highlight: highlight(&title, query),
                    title,
                    detail: r.api_version.clone(),
                    score: h.score,
                }
            })
            .collect()
    }

    fn command_rows(&self, query: &str) -> Vec<Row> {
        rank(&self.commands, query)
            .into_iter()
            .map(|h| {
                let c = &self.commands[h.idx];
                Row {
                    target: RowTarget::Command(h.idx),
                    title: c.label.clone(),
                    detail: format!("{}{}  {}", self.cfg.command_prefix, c.id, c.description),
                    score: h.score,
                    highlight: highlight(&c.label, query),
                }
            })
            .collect()
    }

    pub fn command(&self, id: &str) -> Option<&Command> { self.commands.iter().find(|c| c.id == id) }

    pub fn selected_resource(&self) -> Option<Resource> {
        match self.rows.get(self.selected)?.target {
            RowTarget::Resource(i) => self.resources.get(i).cloned(),
            RowTarget::Command(_) => None,
        }
    }

    pub fn selected_command(&self) -> Option<&Command> {
        match self.rows.get(self.selected)?.target {
            RowTarget::Command(i) => self.commands.get(i),
            RowTarget::Resource(_) => None,
        }
    }

    /// Add a filter directly; duplicates are ignored. Returns true if it was added.
    pub fn add_filter(&mut self, filter: Filter) -> bool {
        let label = filter.to_string();
        let added = self.filters.add(filter);
        if added {
            info!(filter = %label, "palette: filter added");
            self.rebuild(true);
        } else {
            debug!(filter = %label, "palette: filter already active");
        }
        added
    }

    pub fn remove_filter(&mut self, attribute: FilterAttribute, value: &str) -> bool {
        let removed = self.filters.remove(attribute, value);
        if removed {
            info!(attribute = attribute.name(), value = %value, "palette: filter removed");
            self.rebuild(true);
        }
        removed
    }

    pub fn key(&mut self, key: Key) {
        if !self.open {
            return;
        }
        self.flush();
        match key {
            Key::Up => self.selected = self.selected.saturating_sub(1),
            Key::Down => {
                if !self.rows.is_empty() {
                    self.selected = (self.selected + 1).min(self.rows.len() - 1);
                }
            }
            Key::Tab => self.tab(),
            Key::Enter => self.enter(),
            Key::Escape => self.escape(),
        }
    }

    fn tab(&mut self) {
        if matches!(self.classified.state, InputState::AttributeSuggest { .. }) && !self.suggestions.is_empty() {
            self.suggestion_sel = (self.suggestion_sel + 1) % self.suggestions.len();
            return;
        }
        if let Some(next) = input::complete(&self.buffer, &self.cfg.command_prefix) {
            self.set_buffer(next);
        }
    }

    fn enter(&mut self) {
        match self.classified.state.clone() {
            InputState::AttributeSuggest { attribute, .. } => self.commit_filter(attribute),
            InputState::CommandList | InputState::CommandSearching { .. } => {
                let Some(cmd) = self.selected_command().cloned() else {
                    self.no_results();
                    return;
                };
                if cmd.requires_resource {
                    self.set_buffer(format!("{}{} ", self.cfg.command_prefix, cmd.id));
                } else {
                    let _ = self.run(&cmd, None);
                }
            }
            InputState::CommandResourceSelect { command } => {
                let Some(cmd) = self.command(&command).cloned() else { return };
                let Some(resource) = self.selected_resource() else {
                    self.no_results();
                    return;
                };
                let _ = self.run(&cmd, Some(&resource));
            }
            InputState::Idle | InputState::Searching => {
                let Some(resource) = self.selected_resource() else {
                    self.no_results();
                    return;
                };
                let Some(cmd) = self.command(commands::DESCRIBE).cloned() else { return };
                let _ = self.run(&cmd, Some(&resource));
            }
        }
    }

    fn no_results(&mut self) {
        self.toast("no results", ToastKind::Info);
    }

    fn commit_filter(&mut self, attribute: FilterAttribute) {
        let typed = self.classified.attr.as_ref().map(|a| a.partial.clone()).unwrap_or_default();
        let value = self.suggestions.get(self.suggestion_sel).cloned().unwrap_or(typed);
        if value.is_empty() {
            self.toast(format!("type a value for {}:", attribute.name()), ToastKind::Info);
            return;
        }
        let filter = Filter::new(attribute, value);
        let label = filter.to_string();
        if self.filters.add(filter) {
            info!(filter = %label, "palette: filter added");
        } else {
            debug!(filter = %label, "palette: filter already active");
        }
        let keep = self.classified.keep.clone();
        self.set_buffer(keep);
    }

    fn escape(&mut self) {
        let next = match self.classified.state.clone() {
            InputState::AttributeSuggest { .. } => self.classified.keep.clone(),
            InputState::CommandSearching { .. } | InputState::CommandResourceSelect { .. } => self.cfg.command_prefix.clone(),
            InputState::CommandList => String::new(),
            InputState::Idle | InputState::Searching => {
                self.close();
                return;
            }
        };
        self.set_buffer(next);
    }

    /// Run a command by id against an optional resource.
    pub fn execute(&mut self, command_id: &str, resource: Option<&Resource>) -> PaletteResult<()> {
        let Some(cmd) = self.command(command_id).cloned() else {
            let err = PaletteError::Validation(format!("unknown command: {command_id}"));
            self.toast(err.to_string(), ToastKind::Warn);
            return Err(err);
        };
        self.run(&cmd, resource)
    }

    /// A rejected command keeps the palette open with no side effects; an accepted one
    /// closes it before its effect starts.
    fn run(&mut self, cmd: &Command, resource: Option<&Resource>) -> PaletteResult<()> {
        let effect = match commands::execute(cmd, resource) {
            Ok(effect) => effect,
            Err(e) => {
                info!(command = %cmd.id, error = %e, "palette: command rejected");
                self.toast(e.to_string(), ToastKind::Warn);
                return Err(e);
            }
        };
        counter!("palette_commands_executed_total", 1u64, "command" => cmd.id.clone());
        info!(
            command = %cmd.id,
            resource = %resource.map(|r| r.display()).unwrap_or_else(|| "-".into()),
            destructive = cmd.is_destructive(),
            "palette: execute"
        );
        self.close();
        self.spawn_effect(effect);
        Ok(())
    }

    pub fn render(&self) -> RenderModel {
        let attr_mode = matches!(self.classified.state, InputState::AttributeSuggest { .. });
        RenderModel {
            open: self.open,
            context: self.active.clone(),
            state: self.classified.state.clone(),
            buffer: self.buffer.clone(),
            hint: if attr_mode { None } else { input::hint(&self.buffer, &self.cfg.command_prefix) },
            filters: self.filters.iter().map(|f| f.to_string()).collect(),
            rows: self.rows.clone(),
            selected: self.selected(),
            suggestions: self.suggestions.clone(),
            suggestion_selected: (!self.suggestions.is_empty()).then_some(self.suggestion_sel),
            loading: self.loading,
            status: self.status.clone(),
            toasts: self.toasts(),
        }
    }
}

impl Drop for Palette {
    fn drop(&mut self) {
        for h in self.listeners.drain(..) {
            h.abort();
        }
    }
}
