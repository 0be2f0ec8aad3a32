use std::sync::Arc;
use std::time::{Duration, Instant};

use kpal_api::{AgentConfig, ContextAgent, MockContextHost, MockPaletteHost, PaletteError};
use kpal_bridge::{Backoff, Bridge, BroadcastTransport};
use kpal_core::{ClusterInfo, FilterAttribute, Resource};
use kpal_palette::{InputState, Key, Palette, PaletteConfig, PaletteHosts, PaletteUpdate, ToastKind};
use kpal_store::ResourceCache;

struct Fixture {
    palette: Palette,
    host: Arc<MockContextHost>,
    ui: Arc<MockPaletteHost>,
    transport: Arc<BroadcastTransport>,
    agent: Arc<ContextAgent>,
}

fn resources() -> Vec<Resource> {
    vec![
        Resource::new("Pod", "nginx-1", Some("web")),
        Resource::new("Pod", "api-0", Some("web")),
        Resource::new("Service", "nginx", Some("web")),
        Resource::new("Pod", "coredns", Some("kube-system")),
    ]
}

fn fixture(cfg: PaletteConfig, cache: ResourceCache, serve: bool) -> Fixture {
    let host = Arc::new(MockContextHost::new(resources()));
    let transport = BroadcastTransport::new(64);
    let agent = ContextAgent::new("dev", host.clone(), host.clone(), host.clone(), AgentConfig { backoff: Backoff::none() });
    if serve {
        let _ = agent.serve(transport.clone());
    }
    let ui = Arc::new(MockPaletteHost::new(vec![ClusterInfo { id: "prod".into(), name: "prod".into() }]));
    let mut palette = Palette::new(cfg, PaletteHosts::shared(ui.clone()), cache);
    palette.register_peer("dev", Arc::new(Bridge::new(transport.clone())));
    Fixture { palette, host, ui, transport, agent }
}

async fn settle(p: &mut Palette, mut done: impl FnMut(&Palette) -> bool) {
    for _ in 0..400 {
        p.poll_updates();
        if done(p) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("palette did not settle");
}

async fn opened() -> Fixture {
    let mut f = fixture(PaletteConfig::default(), ResourceCache::new(), true);
    f.palette.open();
    assert!(f.palette.is_loading());
    settle(&mut f.palette, |p| !p.is_loading() && p.resources().len() == 4).await;
    f
}

fn titles(p: &Palette) -> Vec<String> {
    p.rows().iter().map(|r| r.title.clone()).collect()
}

fn has_toast(p: &Palette, kind: ToastKind, text: &str) -> bool {
    p.toasts().iter().any(|t| t.kind == kind && t.text.contains(text))
}

#[tokio::test]
async fn logs_command_selects_matching_pod_and_opens_its_logs() {
    let mut f = opened().await;
    f.palette.on_input("/logs nginx");
    assert_eq!(f.palette.state(), &InputState::CommandResourceSelect { command: "logs".into() });
    f.palette.tick_at(Instant::now() + Duration::from_secs(1));
    // the Service also contains "nginx" but logs accept pods only
    assert_eq!(titles(&f.palette), vec!["Pod/web/nginx-1"]);

    f.palette.key(Key::Enter);
    assert!(!f.palette.is_open());
    assert!(f.palette.filters().is_empty());
    let host = f.host.clone();
    settle(&mut f.palette, |_| host.calls().iter().any(|c| c == "logs:Pod/web/nginx-1")).await;
}

#[tokio::test]
async fn enter_on_empty_results_keeps_palette_open() {
    let mut f = opened().await;
    f.palette.on_input("/logs zzz");
    f.palette.key(Key::Enter);
    assert!(f.palette.is_open());
    assert!(has_toast(&f.palette, ToastKind::Info, "no results"));
}

#[tokio::test]
async fn resource_constraint_rejects_without_side_effects() {
    let mut f = opened().await;
    let err = f.palette.execute("logs", None).unwrap_err();
    assert!(matches!(err, PaletteError::Validation(_)));
    let svc = Resource::new("Service", "nginx", Some("web"));
    assert!(f.palette.execute("logs", Some(&svc)).is_err());
    assert!(f.palette.is_open());
    assert!(has_toast(&f.palette, ToastKind::Warn, "View logs"));

    tokio::time::sleep(Duration::from_millis(30)).await;
    f.palette.poll_updates();
    assert!(!f.host.calls().iter().any(|c| c.starts_with("logs:")));

    // warnings outlive the base toast lifetime
    f.palette.tick_at(Instant::now() + Duration::from_millis(3500));
    assert!(has_toast(&f.palette, ToastKind::Warn, "View logs"));
    f.palette.tick_at(Instant::now() + Duration::from_millis(4500));
    assert!(f.palette.toasts().is_empty());
}

#[tokio::test]
async fn declined_delete_never_reaches_the_context() {
    let mut f = opened().await;
    f.ui.answer_confirm(false);
    let pod = Resource::new("Pod", "nginx-1", Some("web"));
    f.palette.execute("delete", Some(&pod)).unwrap();
    assert!(!f.palette.is_open());
    settle(&mut f.palette, |p| has_toast(p, ToastKind::Info, "delete cancelled")).await;
    assert_eq!(f.ui.prompts(), vec!["Delete Pod/web/nginx-1?"]);
    assert!(!f.host.calls().iter().any(|c| c.starts_with("delete:")));
    assert!(f.palette.cache().get("dev").is_some());
}

#[tokio::test]
async fn confirmed_delete_runs_and_invalidates_the_cache() {
    let mut f = opened().await;
    assert!(f.palette.cache().get("dev").is_some());
    let pod = Resource::new("Pod", "nginx-1", Some("web"));
    f.palette.execute("delete", Some(&pod)).unwrap();
    settle(&mut f.palette, |p| has_toast(p, ToastKind::Success, "deleted Pod/web/nginx-1")).await;
    assert!(f.host.calls().iter().any(|c| c == "delete:Pod/web/nginx-1"));
    assert!(f.palette.cache().get("dev").is_none());
}

#[tokio::test]
async fn failed_delete_surfaces_the_remote_message() {
    let mut f = opened().await;
    f.host.fail_deletes("pods \"nginx-1\" is forbidden");
    let pod = Resource::new("Pod", "nginx-1", Some("web"));
    f.palette.execute("delete", Some(&pod)).unwrap();
    settle(&mut f.palette, |p| has_toast(p, ToastKind::Error, "pods \"nginx-1\" is forbidden")).await;
    assert!(f.palette.cache().get("dev").is_some());
}

#[tokio::test]
async fn failed_refresh_keeps_the_cached_snapshot() {
    let cache = ResourceCache::new();
    cache.put("dev", vec![Resource::new("Pod", "a", Some("ns1"))]);
    let cfg = PaletteConfig { request_timeout: Duration::from_millis(50), ..PaletteConfig::default() };
    let mut f = fixture(cfg, cache, false);
    f.palette.open();
    assert!(!f.palette.is_loading());
    assert_eq!(titles(&f.palette), vec!["Pod/ns1/a"]);

    settle(&mut f.palette, |p| p.status().is_some()).await;
    assert!(f.palette.status().unwrap_or_default().contains("cached"));
    assert_eq!(f.palette.resources().len(), 1);
    assert_eq!(titles(&f.palette), vec!["Pod/ns1/a"]);
    assert_eq!(f.palette.cache().get("dev").map(|s| s.len()), Some(1));
}

#[tokio::test]
async fn failed_first_load_shows_empty_set_and_warns() {
    let cfg = PaletteConfig { request_timeout: Duration::from_millis(50), ..PaletteConfig::default() };
    let mut f = fixture(cfg, ResourceCache::new(), false);
    f.palette.open();
    assert!(f.palette.is_loading());
    settle(&mut f.palette, |p| !p.is_loading()).await;
    assert!(f.palette.resources().is_empty());
    assert!(f.palette.status().is_some());
    assert!(has_toast(&f.palette, ToastKind::Warn, "timeout"));
    // commands still work without resources
    f.palette.on_input("/");
    assert!(!f.palette.rows().is_empty());
}

#[tokio::test]
async fn search_ranking_waits_for_the_debounce() {
    let mut f = opened().await;
    let idle = f.palette.rows().len();
    assert_eq!(idle, 4);

    let t0 = Instant::now();
    f.palette.on_input_at("ngin", t0);
    assert_eq!(f.palette.state(), &InputState::Searching);
    f.palette.on_input_at("nginx", t0 + Duration::from_millis(100));
    assert!(f.palette.has_pending_input());
    assert!(!f.palette.tick_at(t0 + Duration::from_millis(200)));
    assert_eq!(f.palette.rows().len(), idle);
    assert!(f.palette.tick_at(t0 + Duration::from_millis(250)));
    assert!(!f.palette.has_pending_input());
    // exact segment, then name substring, then the partial fuzzy match on "coredns"
    assert_eq!(titles(&f.palette), vec!["Service/web/nginx", "Pod/web/nginx-1", "Pod/kube-system/coredns"]);
}

#[tokio::test]
async fn command_list_is_not_debounced() {
    let mut f = opened().await;
    f.palette.on_input("/");
    assert_eq!(f.palette.state(), &InputState::CommandList);
    assert!(!f.palette.has_pending_input());
    assert!(f.palette.rows().iter().any(|r| r.title == "View logs"));
}

#[tokio::test]
async fn attribute_suggestions_commit_as_filters() {
    let mut f = opened().await;
    f.palette.on_input("ns:");
    f.palette.key(Key::Tab);
    assert_eq!(f.palette.suggestions(), ["kube-system", "web"]);
    assert_eq!(f.palette.render().suggestion_selected, Some(1));

    f.palette.key(Key::Enter);
    assert!(f.palette.filters().contains(FilterAttribute::Namespace, "web"));
    assert_eq!(f.palette.buffer(), "");
    assert_eq!(f.palette.state(), &InputState::Idle);
    assert_eq!(f.palette.rows().len(), 3);
    assert!(titles(&f.palette).iter().all(|t| t.contains("/web/")));

    // committing the same filter again is a no-op
    f.palette.on_input("namespace:web");
    f.palette.key(Key::Enter);
    assert_eq!(f.palette.filters().len(), 1);
}

#[tokio::test]
async fn escape_unwinds_one_level_at_a_time() {
    let mut f = opened().await;
    f.palette.on_input("/logs ng");
    f.palette.key(Key::Escape);
    assert_eq!((f.palette.buffer(), f.palette.state()), ("/", &InputState::CommandList));
    f.palette.key(Key::Escape);
    assert_eq!((f.palette.buffer(), f.palette.state()), ("", &InputState::Idle));

    f.palette.on_input("nginx ns:we");
    f.palette.key(Key::Escape);
    assert_eq!((f.palette.buffer(), f.palette.state()), ("nginx ", &InputState::Searching));
    assert!(f.palette.is_open());
    f.palette.key(Key::Escape);
    assert!(!f.palette.is_open());
}

#[tokio::test]
async fn tab_completes_attribute_names() {
    let mut f = opened().await;
    f.palette.on_input("nginx na");
    assert_eq!(f.palette.render().hint.as_deref(), Some("namespace:"));
    f.palette.key(Key::Tab);
    assert_eq!(f.palette.buffer(), "nginx namespace:");
    assert!(matches!(f.palette.state(), InputState::AttributeSuggest { attribute: FilterAttribute::Namespace, .. }));
}

#[tokio::test]
async fn up_and_down_are_clamped() {
    let mut f = opened().await;
    f.palette.key(Key::Up);
    assert_eq!(f.palette.selected(), Some(0));
    for _ in 0..10 {
        f.palette.key(Key::Down);
    }
    assert_eq!(f.palette.selected(), Some(3));
}

#[tokio::test]
async fn resource_command_from_list_switches_to_resource_select() {
    let mut f = opened().await;
    f.palette.on_input("/logs");
    assert_eq!(f.palette.selected_command().map(|c| c.id.as_str()), Some("logs"));
    f.palette.key(Key::Enter);
    assert!(f.palette.is_open());
    assert_eq!(f.palette.buffer(), "/logs ");
    assert_eq!(f.palette.state(), &InputState::CommandResourceSelect { command: "logs".into() });
}

#[tokio::test]
async fn enter_on_search_result_describes_it_in_the_context() {
    let mut f = opened().await;
    f.palette.on_input("api");
    f.palette.key(Key::Enter);
    assert!(!f.palette.is_open());
    let host = f.host.clone();
    settle(&mut f.palette, |_| host.calls().iter().any(|c| c == "details:Pod/web/api-0")).await;
}

#[tokio::test]
async fn cluster_navigation_commands_come_from_the_catalog() {
    let mut f = opened().await;
    settle(&mut f.palette, |p| p.command("cluster-prod").is_some()).await;
    f.palette.execute("cluster-prod", None).unwrap();
    let ui = f.ui.clone();
    settle(&mut f.palette, |_| ui.navigations() == vec!["/c/prod".to_string()]).await;
}

#[tokio::test]
async fn refresh_command_reloads_the_cache() {
    let mut f = opened().await;
    f.host.set_resources(vec![Resource::new("Pod", "only", Some("web"))]);
    f.palette.execute("refresh", None).unwrap();
    settle(&mut f.palette, |p| has_toast(p, ToastKind::Success, "refreshed 1 resources")).await;
    assert_eq!(f.palette.cache().get("dev").map(|s| s.len()), Some(1));
}

#[tokio::test]
async fn updates_from_an_older_session_are_dropped() {
    let mut f = opened().await;
    let stale = PaletteUpdate::Resources {
        generation: f.palette.generation() - 1,
        context_id: "dev".into(),
        background: false,
        result: Ok(vec![]),
    };
    f.palette.apply_update(stale);
    let other = PaletteUpdate::Resources {
        generation: f.palette.generation(),
        context_id: "other".into(),
        background: false,
        result: Ok(vec![]),
    };
    f.palette.apply_update(other);
    assert_eq!(f.palette.resources().len(), 4);
}

#[tokio::test]
async fn close_clears_filters_and_reopen_starts_fresh() {
    let mut f = opened().await;
    f.palette.on_input("kind:Pod");
    f.palette.key(Key::Enter);
    assert_eq!(f.palette.filters().len(), 1);
    let g = f.palette.generation();
    f.palette.close();
    assert!(f.palette.filters().is_empty());
    f.palette.open();
    assert_eq!(f.palette.generation(), g + 1);
    // second open is served from the cache
    assert!(!f.palette.is_loading());
    assert_eq!(f.palette.rows().len(), 4);
}

#[tokio::test]
async fn toggle_envelope_from_a_context_opens_the_palette() {
    let mut f = fixture(PaletteConfig::default(), ResourceCache::new(), true);
    f.palette.listen_toggle(f.transport.clone());
    f.agent.toggle(f.transport.as_ref());
    tokio::time::timeout(Duration::from_secs(2), f.palette.next_update()).await.unwrap();
    assert!(f.palette.is_open());
    assert_eq!(f.palette.active_context(), Some("dev"));
}
