//! kpal store: per-context resource snapshots that outlive a palette session.
//!
//! Readers never block and never trigger I/O; refresh policy lives with the caller.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use kpal_core::{ContextId, Resource};
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::debug;

/// One cached snapshot for a context.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub resources: Arc<Vec<Resource>>,
    pub fetched_at: Instant,
    /// Cache-wide write counter at the time this entry was stored.
    pub epoch: u64,
}

impl CacheEntry {
    pub fn age(&self) -> Duration { self.fetched_at.elapsed() }

    pub fn is_stale(&self, max_age: Duration) -> bool { self.age() > max_age }
}

type Entries = FxHashMap<ContextId, Arc<CacheEntry>>;

/// Context id -> last successful fetch. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ResourceCache {
    entries: Arc<ArcSwap<Entries>>,
    epoch_tx: Arc<watch::Sender<u64>>,
    epoch_rx: watch::Receiver<u64>,
}

impl Default for ResourceCache {
    fn default() -> Self { Self::new() }
}

impl ResourceCache {
    pub fn new() -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self { entries: Arc::new(ArcSwap::from_pointee(Entries::default())), epoch_tx: Arc::new(epoch_tx), epoch_rx }
    }

    /// Last stored snapshot for `ctx`, if any.
    pub fn get(&self, ctx: &str) -> Option<Arc<Vec<Resource>>> {
        self.entry(ctx).map(|e| e.resources.clone())
    }

    pub fn entry(&self, ctx: &str) -> Option<Arc<CacheEntry>> {
        self.entries.load().get(ctx).cloned()
    }

    /// Replace the snapshot for `ctx`. Concurrent writers for one key: last writer wins.
    pub fn put(&self, ctx: &str, resources: Vec<Resource>) -> u64 {
        let mut epoch = 0u64;
        self.epoch_tx.send_modify(|e| {
            *e += 1;
            epoch = *e;
        });
        let count = resources.len();
        let entry = Arc::new(CacheEntry { resources: Arc::new(resources), fetched_at: Instant::now(), epoch });
        let key: ContextId = ctx.to_string();
        self.entries.rcu(|cur| {
            let mut next = Entries::clone(cur);
            next.insert(key.clone(), entry.clone());
            next
        });
        metrics::counter!("cache_puts_total", 1u64);
        metrics::gauge!("cache_contexts", self.len() as f64);
        debug!(context = %ctx, items = count, epoch, "cache: put");
        epoch
    }

    /// Drop the snapshot for `ctx`; returns whether one existed.
    pub fn invalidate(&self, ctx: &str) -> bool {
        let existed = self.entries.load().contains_key(ctx);
        if existed {
            self.entries.rcu(|cur| {
                let mut next = Entries::clone(cur);
                next.remove(ctx);
                next
            });
            metrics::gauge!("cache_contexts", self.len() as f64);
            debug!(context = %ctx, "cache: invalidated");
        }
        existed
    }

    pub fn contexts(&self) -> Vec<ContextId> {
        let mut ids: Vec<ContextId> = self.entries.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize { self.entries.load().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Write counter, bumped on every `put`.
    pub fn epoch(&self) -> u64 { *self.epoch_rx.borrow() }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
}
