//! Command registry and dispatcher. Commands are rebuilt on every open; execution
//! validates the resource constraint and yields an [`Effect`] for the palette to run.

#![forbid(unsafe_code)]

use kpal_api::{PaletteError, PaletteResult};
use kpal_core::{ClusterInfo, Resource};
use kpal_search::{kind_accepted, Rankable};
use serde::{Deserialize, Serialize};

pub const LOGS: &str = "logs";
pub const DESCRIBE: &str = "describe";
pub const DELETE: &str = "delete";
pub const REFRESH: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "path", rename_all = "kebab-case")]
pub enum CommandAction {
    /// Route change in the host, e.g. to another cluster.
    Navigate(String),
    Describe,
    Logs,
    Delete,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub label: String,
    pub description: String,
    pub requires_resource: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_kinds: Option<Vec<String>>,
    pub action: CommandAction,
}

impl Command {
    fn resource_action(id: &str, label: &str, description: &str, accepted: Option<&[&str]>, action: CommandAction) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            requires_resource: true,
            accepted_kinds: accepted.map(|ks| ks.iter().map(|k| k.to_string()).collect()),
            action,
        }
    }

    pub fn accepts(&self, kind: &str) -> bool { kind_accepted(self.accepted_kinds.as_deref(), kind) }

    pub fn is_destructive(&self) -> bool { self.action == CommandAction::Delete }
}

impl Rankable for Command {
    fn display_text(&self) -> String { format!("{} {}", self.id, self.label) }
    fn primary(&self) -> &str { &self.label }
    fn kind_text(&self) -> &str { &self.id }
    fn scope(&self) -> Option<&str> { Some(self.description.as_str()) }
}

/// Side effect of an executed command, run by the palette after it closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Navigate(String),
    /// Fire-and-forget `navigate-to-resource` to the active context.
    NavigateToResource(Resource),
    OpenLogs(Resource),
    /// Runs only after explicit confirmation.
    DeleteResource(Resource),
    Refresh,
}

/// Fixed resource actions followed by one navigation target per cluster, sorted by label.
pub fn build(clusters: &[ClusterInfo]) -> Vec<Command> {
    let mut out = vec![
        Command::resource_action(LOGS, "View logs", "Open the log viewer for a pod", Some(&["Pod"]), CommandAction::Logs),
        Command::resource_action(DESCRIBE, "Describe", "Open the details view of a resource", None, CommandAction::Describe),
        Command::resource_action(DELETE, "Delete", "Delete a resource after confirmation", None, CommandAction::Delete),
        Command {
            id: REFRESH.to_string(),
            label: "Refresh".to_string(),
            description: "Reload resources of the active cluster".to_string(),
            requires_resource: false,
            accepted_kinds: None,
            action: CommandAction::Refresh,
        },
    ];
    let mut nav: Vec<Command> = clusters
        .iter()
        .map(|c| Command {
            id: format!("cluster-{}", c.id),
            label: format!("Go to cluster {}", c.name),
            description: format!("Switch to cluster {}", c.id),
            requires_resource: false,
            accepted_kinds: None,
            action: CommandAction::Navigate(format!("/c/{}", c.id)),
        })
        .collect();
    nav.sort_by(|a, b| a.label.cmp(&b.label));
    out.extend(nav);
    out
}

/// Active command for a token typed after the prefix: first id prefix match, else first label prefix match.
pub fn find_by_token<'a>(commands: &'a [Command], token: &str) -> Option<&'a Command> {
    let t = token.to_lowercase();
    if t.is_empty() {
        return None;
    }
    commands
        .iter()
        .find(|c| c.id.to_lowercase().starts_with(&t))
        .or_else(|| commands.iter().find(|c| c.label.to_lowercase().starts_with(&t)))
}

/// Validate the resource constraint and produce the command's effect. A rejection has no side effects.
pub fn execute(command: &Command, resource: Option<&Resource>) -> PaletteResult<Effect> {
    if command.requires_resource {
        let Some(r) = resource else {
            return Err(PaletteError::Validation(format!("{}: select a resource first", command.label)));
        };
        if !command.accepts(&r.kind) {
            let kinds = command.accepted_kinds.as_deref().unwrap_or_default().join(", ");
            return Err(PaletteError::Validation(format!("{}: {} is not supported (expects {})", command.label, r.kind, kinds)));
        }
    }
    let needs = |r: Option<&Resource>| {
        r.cloned().ok_or_else(|| PaletteError::Validation(format!("{}: select a resource first", command.label)))
    };
    Ok(match &command.action {
        CommandAction::Navigate(path) => Effect::Navigate(path.clone()),
        CommandAction::Describe => Effect::NavigateToResource(needs(resource)?),
        CommandAction::Logs => Effect::OpenLogs(needs(resource)?),
        CommandAction::Delete => Effect::DeleteResource(needs(resource)?),
        CommandAction::Refresh => Effect::Refresh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters() -> Vec<ClusterInfo> {
        vec![
            ClusterInfo { id: "prod".into(), name: "prod".into() },
            ClusterInfo { id: "dev".into(), name: "dev".into() },
        ]
    }

    #[test]
    fn build_has_fixed_actions_then_sorted_navigation() {
        let cmds = build(&clusters());
        let ids: Vec<&str> = cmds.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["logs", "describe", "delete", "refresh", "cluster-dev", "cluster-prod"]);
        assert_eq!(cmds[4].action, CommandAction::Navigate("/c/dev".into()));
        assert_eq!(build(&[]).len(), 4);
    }

    #[test]
    fn token_prefers_id_over_label() {
        let cmds = build(&clusters());
        assert_eq!(find_by_token(&cmds, "de").map(|c| c.id.as_str()), Some("describe"));
        assert_eq!(find_by_token(&cmds, "DEL").map(|c| c.id.as_str()), Some("delete"));
        assert_eq!(find_by_token(&cmds, "view").map(|c| c.id.as_str()), Some("logs"));
        assert_eq!(find_by_token(&cmds, "go").map(|c| c.id.as_str()), Some("cluster-dev"));
        assert!(find_by_token(&cmds, "zzz").is_none());
        assert!(find_by_token(&cmds, "").is_none());
    }

    #[test]
    fn requires_resource_is_validated_before_effect() {
        let cmds = build(&[]);
        let logs = &cmds[0];
        let err = execute(logs, None).unwrap_err();
        assert!(matches!(err, PaletteError::Validation(ref m) if m.contains("select a resource")));
        let svc = Resource::new("Service", "web", Some("ns1"));
        let err = execute(logs, Some(&svc)).unwrap_err();
        assert!(matches!(err, PaletteError::Validation(ref m) if m.contains("Service")));
        let pod = Resource::new("pod", "web-1", Some("ns1"));
        assert_eq!(execute(logs, Some(&pod)).unwrap(), Effect::OpenLogs(pod.clone()));
        assert_eq!(execute(&cmds[2], Some(&svc)).unwrap(), Effect::DeleteResource(svc));
        assert_eq!(execute(&cmds[3], None).unwrap(), Effect::Refresh);
    }
}
