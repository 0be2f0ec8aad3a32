//! kpal core types: resources surfaced by a context, filter predicates, and the
//! envelopes exchanged between the palette and its data-owning contexts.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod envelope;

pub use envelope::{Envelope, Reply, RequestKind};

/// Opaque identifier of one data-owning context (a cluster/session).
pub type ContextId = String;

/// Kind whose instances act as the grouping attribute (`node:`).
pub const GROUPING_KIND: &str = "Node";

/// Immutable snapshot of one record surfaced by a context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Host-assigned id, passed through untouched.
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub api_version: String,
}

impl Resource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.map(|s| s.to_string()),
            uid: String::new(),
            api_version: String::new(),
        }
    }

    /// `Kind/namespace/name`, or `Kind/name` for cluster-scoped records.
    pub fn display(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => format!("{}/{}/{}", self.kind, ns, self.name),
            _ => format!("{}/{}", self.kind, self.name),
        }
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            kind: self.kind.clone(),
            api_version: self.api_version.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Addressing data handed to a host's details view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub kind: String,
    pub api_version: String,
    pub namespace: Option<String>,
    pub name: String,
}

/// Attribute a filter tests against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FilterAttribute {
    Kind,
    Namespace,
    /// Grouping attribute; see [`GROUPING_KIND`].
    Node,
}

impl FilterAttribute {
    /// Canonical attributes in lexicographic order of their names.
    pub const ALL: [FilterAttribute; 3] = [FilterAttribute::Kind, FilterAttribute::Namespace, FilterAttribute::Node];

    pub fn name(self) -> &'static str {
        match self {
            FilterAttribute::Kind => "kind",
            FilterAttribute::Namespace => "namespace",
            FilterAttribute::Node => "node",
        }
    }

    /// Parse a canonical name or short alias (`k`, `ns`), case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kind" | "k" => Some(FilterAttribute::Kind),
            "namespace" | "ns" => Some(FilterAttribute::Namespace),
            "node" => Some(FilterAttribute::Node),
            _ => None,
        }
    }
}

impl std::fmt::Display for FilterAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Attribute-equality predicate narrowing the resource set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Filter {
    pub attribute: FilterAttribute,
    pub value: String,
}

impl Filter {
    pub fn new(attribute: FilterAttribute, value: impl Into<String>) -> Self {
        Self { attribute, value: value.into() }
    }

    /// Parse `attr:value`; empty values are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let (attr, value) = s.split_once(':')?;
        let attribute = FilterAttribute::parse(attr.trim())?;
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        Some(Self::new(attribute, value))
    }

    /// Case-insensitive equality of both attribute and value.
    pub fn same_as(&self, attribute: FilterAttribute, value: &str) -> bool {
        self.attribute == attribute && self.value.eq_ignore_ascii_case(value)
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.attribute.name(), self.value)
    }
}

/// One entry of a host's cluster catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
}

pub mod prelude {
    pub use super::{ClusterInfo, ContextId, Envelope, Filter, FilterAttribute, Reply, RequestKind, Resource, ResourceRef, GROUPING_KIND};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_namespace_when_present() {
        assert_eq!(Resource::new("Pod", "a", Some("ns1")).display(), "Pod/ns1/a");
        assert_eq!(Resource::new("Node", "worker-1", None).display(), "Node/worker-1");
        assert_eq!(Resource::new("Node", "worker-1", Some("")).display(), "Node/worker-1");
    }

    #[test]
    fn filter_parse_accepts_aliases() {
        assert_eq!(Filter::parse("k:Pod"), Some(Filter::new(FilterAttribute::Kind, "Pod")));
        assert_eq!(Filter::parse("ns:prod"), Some(Filter::new(FilterAttribute::Namespace, "prod")));
        assert_eq!(Filter::parse("NODE:w1"), Some(Filter::new(FilterAttribute::Node, "w1")));
        assert_eq!(Filter::parse("kind:"), None);
        assert_eq!(Filter::parse("label:app"), None);
        assert_eq!(Filter::new(FilterAttribute::Kind, "Pod").to_string(), "kind:Pod");
    }

    #[test]
    fn resource_serializes_camel_case() {
        let mut r = Resource::new("Pod", "a", Some("ns1"));
        r.api_version = "v1".into();
        r.uid = "u-1".into();
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["apiVersion"], "v1");
        assert_eq!(v["namespace"], "ns1");
        let cluster = serde_json::to_value(Resource::new("Node", "w1", None)).unwrap();
        assert!(cluster.get("namespace").is_none());
    }
}
