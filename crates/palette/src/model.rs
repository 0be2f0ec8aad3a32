#![forbid(unsafe_code)]

use std::time::Instant;

use kpal_api::PaletteError;
use kpal_core::{ClusterInfo, ContextId, FilterAttribute, Resource};
use serde::{Deserialize, Serialize};

/// Interaction mode derived from the text buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum InputState {
    #[default]
    Idle,
    Searching,
    AttributeSuggest {
        attribute: FilterAttribute,
        /// Active resource command, when the filter is typed after one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    CommandList,
    CommandSearching { command: String },
    CommandResourceSelect { command: String },
}

impl InputState {
    pub fn name(&self) -> &'static str {
        match self {
            InputState::Idle => "idle",
            InputState::Searching => "searching",
            InputState::AttributeSuggest { .. } => "attribute-suggest",
            InputState::CommandList => "command-list",
            InputState::CommandSearching { .. } => "command-searching",
            InputState::CommandResourceSelect { .. } => "command-resource-select",
        }
    }
}

/// Results delivered from background tasks; applied by `Palette::poll_updates`.
#[derive(Debug)]
pub enum PaletteUpdate {
    Resources {
        generation: u64,
        context_id: ContextId,
        /// Refresh of an already cached snapshot.
        background: bool,
        result: Result<Vec<Resource>, PaletteError>,
    },
    Clusters { generation: u64, result: Result<Vec<ClusterInfo>, PaletteError> },
    /// `toggle` envelope from a context.
    Toggle { context_id: Option<ContextId> },
    Toast { text: String, kind: ToastKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Info,
    Success,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub text: String,
    pub kind: ToastKind,
    pub created: Instant,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "index", rename_all = "lowercase")]
pub enum RowTarget {
    /// Index into the palette's resource snapshot.
    Resource(usize),
    /// Index into the command list.
    Command(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub target: RowTarget,
    pub title: String,
    pub detail: String,
    pub score: f32,
    /// Character indices of `title` matched by the query.
    pub highlight: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToastView {
    pub kind: ToastKind,
    pub text: String,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderModel {
    pub open: bool,
    pub context: Option<ContextId>,
    pub state: InputState,
    pub buffer: String,
    /// Attribute-name completion for the last token, shown inline.
    pub hint: Option<String>,
    pub filters: Vec<String>,
    pub rows: Vec<Row>,
    pub selected: Option<usize>,
    pub suggestions: Vec<String>,
    pub suggestion_selected: Option<usize>,
    pub loading: bool,
    pub status: Option<String>,
    pub toasts: Vec<ToastView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_state_serializes_with_kebab_tag() {
        let v = serde_json::to_value(InputState::CommandResourceSelect { command: "logs".into() }).unwrap();
        assert_eq!(v, serde_json::json!({"state": "command-resource-select", "command": "logs"}));
        let v = serde_json::to_value(InputState::AttributeSuggest { attribute: FilterAttribute::Kind, command: None }).unwrap();
        assert_eq!(v["state"], "attribute-suggest");
        assert!(v.get("command").is_none());
    }

    #[test]
    fn row_targets_carry_their_index() {
        let v = serde_json::to_value(RowTarget::Command(3)).unwrap();
        assert_eq!(v, serde_json::json!({"type": "command", "index": 3}));
    }
}
