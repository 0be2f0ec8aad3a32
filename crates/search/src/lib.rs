//! kpal search: tiered substring/fuzzy ranking over resources and commands,
//! plus the attribute filter engine applied before ranking.

#![forbid(unsafe_code)]

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use kpal_core::Resource;
use tracing::debug;

pub mod filter;

pub use filter::{kind_accepted, suggest, FilterSet, PARTIAL_SUGGESTION_LIMIT, SUGGESTION_LIMIT};

/// Maximum number of ranked results returned.
pub const RESULT_LIMIT: usize = 50;

pub const SCORE_EXACT: f32 = 10.0;
pub const SCORE_NAME: f32 = 8.0;
pub const SCORE_KIND: f32 = 6.0;
pub const SCORE_SCOPE: f32 = 5.0;
pub const FUZZY_WEIGHT: f32 = 2.0;
/// Nominal score for every item when the query is empty.
pub const UNRANKED_SCORE: f32 = 1.0;

/// Text fields the ranking tiers look at.
pub trait Rankable {
    /// Full display string (tier 1 and fuzzy fallback).
    fn display_text(&self) -> String;
    /// Primary name field (tier 2).
    fn primary(&self) -> &str;
    /// Kind/type field (tier 3).
    fn kind_text(&self) -> &str;
    /// Secondary scope field such as a namespace (tier 4).
    fn scope(&self) -> Option<&str>;
}

impl Rankable for Resource {
    fn display_text(&self) -> String { self.display() }
    fn primary(&self) -> &str { &self.name }
    fn kind_text(&self) -> &str { &self.kind }
    fn scope(&self) -> Option<&str> { self.namespace.as_deref() }
}

impl<T: Rankable + ?Sized> Rankable for &T {
    fn display_text(&self) -> String { (**self).display_text() }
    fn primary(&self) -> &str { (**self).primary() }
    fn kind_text(&self) -> &str { (**self).kind_text() }
    fn scope(&self) -> Option<&str> { (**self).scope() }
}

/// A ranked item: index into the ranked slice and its total score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub idx: usize,
    pub score: f32,
}

// Lowercased views of one item.
struct Fields {
    display: String,
    name: String,
    kind: String,
    scope: String,
}

impl Fields {
    fn of<T: Rankable>(item: &T) -> Self {
        Self {
            display: item.display_text().to_lowercase(),
            name: item.primary().to_lowercase(),
            kind: item.kind_text().to_lowercase(),
            scope: item.scope().unwrap_or("").to_lowercase(),
        }
    }

    fn exact(&self, term: &str) -> bool {
        self.display == term || self.display.split(|c: char| c == '/' || c.is_whitespace()).any(|seg| seg == term)
    }
}

fn terms_of(query: &str) -> Vec<String> {
    query.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// Fraction of `needle` characters found in order within `hay` (greedy).
pub fn subsequence_ratio(hay: &str, needle: &str) -> f32 {
    let total = needle.chars().count();
    if total == 0 {
        return 0.0;
    }
    let mut hay_chars = hay.chars();
    let mut matched = 0usize;
    for nc in needle.chars() {
        if hay_chars.by_ref().any(|hc| hc == nc) {
            matched += 1;
        } else {
            break;
        }
    }
    matched as f32 / total as f32
}

// Score one lowercased term against one item; None excludes the item.
fn term_score(fields: &Fields, term: &str) -> Option<f32> {
    if fields.exact(term) {
        return Some(SCORE_EXACT);
    }
    if fields.name.contains(term) {
        return Some(SCORE_NAME);
    }
    if fields.kind.contains(term) {
        return Some(SCORE_KIND);
    }
    if !fields.scope.is_empty() && fields.scope.contains(term) {
        return Some(SCORE_SCOPE);
    }
    let ratio = subsequence_ratio(&fields.display, term);
    if ratio > 0.0 {
        Some(ratio * FUZZY_WEIGHT)
    } else {
        None
    }
}

/// Score a single item against a query. Every term must match (AND).
pub fn score<T: Rankable>(item: &T, query: &str) -> Option<f32> {
    let terms = terms_of(query);
    if terms.is_empty() {
        return Some(UNRANKED_SCORE);
    }
    let fields = Fields::of(item);
    terms.iter().map(|t| term_score(&fields, t)).sum::<Option<f32>>()
}

/// Rank `items` against `query`, best first, ties in input order, capped at [`RESULT_LIMIT`].
pub fn rank<T: Rankable>(items: &[T], query: &str) -> Vec<Hit> {
    rank_with_limit(items, query, RESULT_LIMIT)
}

pub fn rank_with_limit<T: Rankable>(items: &[T], query: &str, limit: usize) -> Vec<Hit> {
    let started = std::time::Instant::now();
    let terms = terms_of(query);
    if terms.is_empty() {
        return (0..items.len().min(limit)).map(|idx| Hit { idx, score: UNRANKED_SCORE }).collect();
    }
    let mut hits: Vec<Hit> = Vec::new();
    'item: for (idx, it) in items.iter().enumerate() {
        let fields = Fields::of(it);
        let mut total = 0.0f32;
        for t in terms.iter() {
            match term_score(&fields, t) {
                Some(s) => total += s,
                None => continue 'item,
            }
        }
        hits.push(Hit { idx, score: total });
    }
    // sort_by is stable: equal scores keep input order
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    let matched = hits.len();
    hits.truncate(limit);
    let elapsed = started.elapsed();
    metrics::histogram!("search_rank_ms", elapsed.as_secs_f64() * 1_000.0);
    debug!(items = items.len(), matched, terms = terms.len(), "search: ranked");
    hits
}

/// Character indices in `text` to highlight for `query` (skim fuzzy match over the whole query).
pub fn highlight(text: &str, query: &str) -> Vec<usize> {
    let q: String = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if q.is_empty() {
        return Vec::new();
    }
    let matcher = SkimMatcherV2::default().ignore_case();
    if let Some((_, idx)) = matcher.fuzzy_indices(text, &q) {
        return idx;
    }
    // Multi-term queries rarely match as one pattern; merge per-term indices.
    let mut all: Vec<usize> = query
        .split_whitespace()
        .filter_map(|t| matcher.fuzzy_indices(text, t).map(|(_, idx)| idx))
        .flatten()
        .collect();
    all.sort_unstable();
    all.dedup();
    all
}
