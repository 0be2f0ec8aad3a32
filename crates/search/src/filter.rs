//! Attribute filters applied before ranking, and suggestion values for `attr:` input.

#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use kpal_core::{Filter, FilterAttribute, Resource, GROUPING_KIND};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Suggestions shown for a bare `attr:` prefix.
pub const SUGGESTION_LIMIT: usize = 10;
/// Suggestions shown once the user typed part of a value.
pub const PARTIAL_SUGGESTION_LIMIT: usize = 8;

/// Accumulated filters, insertion order preserved, no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    filters: SmallVec<[Filter; 4]>,
}

impl FilterSet {
    pub fn new() -> Self { Self::default() }

    /// Add a filter; returns false when an equal (attribute, value) pair is already present.
    pub fn add(&mut self, filter: Filter) -> bool {
        if self.contains(filter.attribute, &filter.value) {
            return false;
        }
        self.filters.push(filter);
        true
    }

    pub fn remove(&mut self, attribute: FilterAttribute, value: &str) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| !f.same_as(attribute, value));
        self.filters.len() != before
    }

    pub fn clear(&mut self) { self.filters.clear(); }

    pub fn contains(&self, attribute: FilterAttribute, value: &str) -> bool {
        self.filters.iter().any(|f| f.same_as(attribute, value))
    }

    pub fn len(&self) -> usize { self.filters.len() }

    pub fn is_empty(&self) -> bool { self.filters.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> { self.filters.iter() }

    /// True when `r` passes every filter.
    pub fn matches(&self, r: &Resource) -> bool {
        self.filters.iter().all(|f| filter_matches(f, r))
    }

    pub fn apply<'a>(&self, items: &'a [Resource]) -> Vec<&'a Resource> {
        items.iter().filter(|r| self.matches(r)).collect()
    }

    /// Indices of `items` passing every filter, in input order.
    pub fn apply_indices(&self, items: &[Resource]) -> Vec<usize> {
        items.iter().enumerate().filter(|(_, r)| self.matches(r)).map(|(i, _)| i).collect()
    }
}

/// Single-filter predicate. The grouping attribute only matches resources of the
/// grouping kind itself whose name equals the value.
pub fn filter_matches(f: &Filter, r: &Resource) -> bool {
    match f.attribute {
        FilterAttribute::Kind => r.kind.eq_ignore_ascii_case(&f.value),
        FilterAttribute::Namespace => r.namespace.as_deref().is_some_and(|ns| ns.eq_ignore_ascii_case(&f.value)),
        FilterAttribute::Node => r.is_kind(GROUPING_KIND) && r.name.eq_ignore_ascii_case(&f.value),
    }
}

/// Kind containment check for a command's accepted kinds; `None` accepts everything.
pub fn kind_accepted(accepted: Option<&[String]>, kind: &str) -> bool {
    match accepted {
        None => true,
        Some(kinds) => kinds.iter().any(|k| k.eq_ignore_ascii_case(kind)),
    }
}

fn value_of(attr: FilterAttribute, r: &Resource) -> Option<&str> {
    match attr {
        FilterAttribute::Kind => Some(r.kind.as_str()),
        FilterAttribute::Namespace => r.namespace.as_deref().filter(|s| !s.is_empty()),
        FilterAttribute::Node => r.is_kind(GROUPING_KIND).then_some(r.name.as_str()),
    }
}

/// Distinct values of `attr` over `items`, sorted, filtered by case-insensitive
/// substring of `partial`. `accepted_kinds` narrows kind suggestions only.
pub fn suggest(items: &[Resource], attr: FilterAttribute, partial: &str, accepted_kinds: Option<&[String]>) -> Vec<String> {
    let needle = partial.trim().to_lowercase();
    let limit = if needle.is_empty() { SUGGESTION_LIMIT } else { PARTIAL_SUGGESTION_LIMIT };
    let values: BTreeSet<&str> = items
        .iter()
        .filter(|r| attr != FilterAttribute::Kind || kind_accepted(accepted_kinds, &r.kind))
        .filter_map(|r| value_of(attr, r))
        .collect();
    values
        .into_iter()
        .filter(|v| needle.is_empty() || v.to_lowercase().contains(&needle))
        .take(limit)
        .map(|v| v.to_string())
        .collect()
}
