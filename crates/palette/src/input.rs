//! Buffer classification: maps the raw text to an [`InputState`] plus the query
//! each mode ranks with. Pure; the palette calls it on every edit.

#![forbid(unsafe_code)]

use kpal_core::FilterAttribute;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::commands::{find_by_token, Command};
use crate::model::InputState;

static ATTR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)((?i:kind|namespace|node|k|ns)):(\S*)$").expect("attribute filter regex"));

/// Trailing `attr:partial` token of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrToken {
    pub attribute: FilterAttribute,
    pub partial: String,
    /// Byte offset where the token starts.
    pub start: usize,
}

pub fn attribute_token(buffer: &str) -> Option<AttrToken> {
    let caps = ATTR_RE.captures(buffer)?;
    let name = caps.get(1)?;
    let attribute = FilterAttribute::parse(name.as_str())?;
    let partial = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
    Some(AttrToken { attribute, partial, start: name.start() })
}

/// Classified buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub state: InputState,
    /// Text the current mode ranks or filters with.
    pub query: String,
    pub attr: Option<AttrToken>,
    /// Buffer left after the filter token is committed or dismissed.
    pub keep: String,
}

impl Classified {
    fn plain(state: InputState, query: &str) -> Self {
        Self { state, query: query.trim().to_string(), attr: None, keep: String::new() }
    }
}

pub fn classify(buffer: &str, prefix: &str, commands: &[Command]) -> Classified {
    if !prefix.is_empty() {
        if let Some(after) = buffer.strip_prefix(prefix) {
            return classify_command(buffer, prefix.len(), after, commands);
        }
    }
    if let Some(tok) = attribute_token(buffer) {
        let keep = buffer[..tok.start].to_string();
        let state = InputState::AttributeSuggest { attribute: tok.attribute, command: None };
        return Classified { state, query: keep.trim().to_string(), attr: Some(tok), keep };
    }
    if buffer.trim().is_empty() {
        return Classified::plain(InputState::Idle, "");
    }
    Classified::plain(InputState::Searching, buffer)
}

fn classify_command(buffer: &str, prefix_len: usize, after: &str, commands: &[Command]) -> Classified {
    let Some(split) = after.find(char::is_whitespace) else {
        return Classified::plain(InputState::CommandList, after);
    };
    let (token, rest) = after.split_at(split);
    let Some(cmd) = find_by_token(commands, token) else {
        return Classified::plain(InputState::CommandList, after);
    };
    if !cmd.requires_resource {
        return Classified::plain(InputState::CommandSearching { command: cmd.id.clone() }, after);
    }
    let rest_start = prefix_len + split;
    if let Some(tok) = attribute_token(buffer).filter(|t| t.start >= rest_start) {
        let keep = buffer[..tok.start].to_string();
        let query = buffer[rest_start..tok.start].trim().to_string();
        let state = InputState::AttributeSuggest { attribute: tok.attribute, command: Some(cmd.id.clone()) };
        return Classified { state, query, attr: Some(tok), keep };
    }
    let ws_len = rest.chars().next().map(char::len_utf8).unwrap_or(0);
    let mut c = Classified::plain(InputState::CommandResourceSelect { command: cmd.id.clone() }, rest);
    c.keep = buffer[..rest_start + ws_len].to_string();
    c
}

/// Attribute name completing `token`: canonical-name prefix (first lexicographic match) or exact alias.
pub fn attribute_completion(token: &str) -> Option<FilterAttribute> {
    let t = token.to_lowercase();
    if t.is_empty() || t.contains(':') {
        return None;
    }
    FilterAttribute::ALL
        .iter()
        .copied()
        .find(|a| a.name().starts_with(&t))
        .or_else(|| FilterAttribute::parse(&t))
}

fn last_token(buffer: &str) -> (usize, &str) {
    let start = buffer
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    (start, &buffer[start..])
}

fn completable<'a>(buffer: &'a str, prefix: &str) -> Option<(usize, &'a str)> {
    // the command token itself is never completed
    if !prefix.is_empty() && buffer.starts_with(prefix) && !buffer.contains(char::is_whitespace) {
        return None;
    }
    let (start, tok) = last_token(buffer);
    if tok.is_empty() || tok.contains(':') {
        return None;
    }
    Some((start, tok))
}

/// Inline hint for the last token, e.g. `"na"` -> `namespace:`.
pub fn hint(buffer: &str, prefix: &str) -> Option<String> {
    let (_, tok) = completable(buffer, prefix)?;
    attribute_completion(tok).map(|a| format!("{}:", a.name()))
}

/// Buffer after Tab completion of the last token, if anything completes.
pub fn complete(buffer: &str, prefix: &str) -> Option<String> {
    let (start, tok) = completable(buffer, prefix)?;
    let attr = attribute_completion(tok)?;
    Some(format!("{}{}:", &buffer[..start], attr.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build;
    use kpal_core::ClusterInfo;

    fn cmds() -> Vec<Command> {
        build(&[ClusterInfo { id: "prod".into(), name: "prod".into() }])
    }

    fn state(buffer: &str) -> InputState {
        classify(buffer, "/", &cmds()).state
    }

    #[test]
    fn plain_text_and_empty_buffer() {
        assert_eq!(state(""), InputState::Idle);
        assert_eq!(state("   "), InputState::Idle);
        let c = classify("  nginx web ", "/", &cmds());
        assert_eq!(c.state, InputState::Searching);
        assert_eq!(c.query, "nginx web");
    }

    #[test]
    fn attribute_token_on_last_word_only() {
        let c = classify("nginx ns:we", "/", &cmds());
        assert_eq!(c.state, InputState::AttributeSuggest { attribute: FilterAttribute::Namespace, command: None });
        assert_eq!(c.query, "nginx");
        assert_eq!(c.keep, "nginx ");
        assert_eq!(c.attr.as_ref().unwrap().partial, "we");
        assert_eq!(state("KIND:"), InputState::AttributeSuggest { attribute: FilterAttribute::Kind, command: None });
        // a finished filter followed by more text is plain search
        assert_eq!(state("kind:Pod nginx"), InputState::Searching);
        assert_eq!(state("label:app"), InputState::Searching);
    }

    #[test]
    fn command_buffers() {
        assert_eq!(state("/"), InputState::CommandList);
        let c = classify("/lo", "/", &cmds());
        assert_eq!((c.state, c.query.as_str()), (InputState::CommandList, "lo"));

        let c = classify("/logs nginx", "/", &cmds());
        assert_eq!(c.state, InputState::CommandResourceSelect { command: "logs".into() });
        assert_eq!(c.query, "nginx");
        assert_eq!(c.keep, "/logs ");
        assert_eq!(state("/logs "), InputState::CommandResourceSelect { command: "logs".into() });

        let c = classify("/del nginx kind:Po", "/", &cmds());
        assert_eq!(c.state, InputState::AttributeSuggest { attribute: FilterAttribute::Kind, command: Some("delete".into()) });
        assert_eq!(c.query, "nginx");
        assert_eq!(c.keep, "/del nginx ");

        let c = classify("/cluster prod", "/", &cmds());
        assert_eq!(c.state, InputState::CommandSearching { command: "cluster-prod".into() });
        assert_eq!(c.query, "cluster prod");

        // unknown command token keeps listing commands
        assert_eq!(state("/zzz abc"), InputState::CommandList);
    }

    #[test]
    fn custom_prefix() {
        assert_eq!(classify(">logs a", ">", &cmds()).state, InputState::CommandResourceSelect { command: "logs".into() });
        assert_eq!(classify("/logs a", ">", &cmds()).state, InputState::Searching);
    }

    #[test]
    fn completion_and_hint() {
        assert_eq!(complete("n", "/"), Some("namespace:".into()));
        assert_eq!(complete("nginx no", "/"), Some("nginx node:".into()));
        assert_eq!(complete("/logs k", "/"), Some("/logs kind:".into()));
        assert_eq!(complete("ns", "/"), Some("namespace:".into()));
        assert_eq!(complete("nginx ", "/"), None);
        assert_eq!(complete("kind:Pod", "/"), None);
        assert_eq!(complete("/lo", "/"), None);
        assert_eq!(complete("zz", "/"), None);
        assert_eq!(hint("ki", "/"), Some("kind:".into()));
        assert_eq!(hint("", "/"), None);
    }

    #[test]
    fn multibyte_whitespace_splits_tokens() {
        assert_eq!(hint("nginx\u{3000}na", "/"), Some("namespace:".into()));
        assert_eq!(hint("nginx\u{a0}ki", "/"), Some("kind:".into()));
        assert_eq!(complete("nginx\u{a0}na", "/"), Some("nginx\u{a0}namespace:".into()));
        assert_eq!(complete("/logs\u{3000}k", "/"), Some("/logs\u{3000}kind:".into()));
        assert_eq!(complete("nginx\u{3000}", "/"), None);
    }

    #[test]
    fn command_with_trailing_space_selects_resources() {
        // Enter on a resource command rewrites the buffer to this form
        let c = classify("/logs ", "/", &cmds());
        assert_eq!(c.state, InputState::CommandResourceSelect { command: "logs".into() });
        assert_eq!(c.query, "");
        assert_eq!(c.keep, "/logs ");
        assert_eq!(state("/logs"), InputState::CommandList);
    }
}
