//! Results store: the per-run memoization tables the scheduler consults
//!
//! `spec.md` §4.5/§4.6 describe two distinct "only run once" guarantees:
//!
//! - **at-most-once per compiled node, per run** — every compiled node's
//!   handler (if it has one) is invoked at most once even if several other
//!   nodes depend on it. `node_futures` is keyed by the node's index into
//!   `CompiledPlan::nodes`.
//! - **at-most-once per `nonImportantHash`, per run** — two distinct
//!   compiled nodes (the rewriter's dedup pass only merges nodes with equal
//!   *complete* hashes; nodes that differ only in an important guard keep
//!   separate identities) that would do identical non-important work share
//!   one actual invocation. `hash_memo` is keyed by `non_important_hash`.
//!
//! Both tables store [`futures::future::Shared`] futures rather than plain
//! cells: a `Shared` future already caches its output after first poll and
//! hands every clone the same `Arc`-wrapped result, which is exactly the
//! "compute once, read many times" shape this crate needs — no separate
//! value cache or manual polling state machine required.

use crate::error::GraphError;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What every node future and memo entry resolves to: the node's value, or
/// the (already-contextualized) error it failed with.
pub type NodeResult = Result<Arc<Value>, Arc<GraphError>>;
pub type NodeFut = Shared<BoxFuture<'static, NodeResult>>;

/// Counters sampled at a configurable frequency (`RunOptions::profile_every`)
/// rather than on every single memo lookup, so profiling a hot run doesn't
/// itself become the bottleneck.
#[derive(Debug, Default)]
pub struct RunMetrics {
    pub memo_hits: AtomicU64,
    pub memo_misses: AtomicU64,
    pub nodes_invoked: AtomicU64,
}

impl RunMetrics {
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.memo_hits.load(Ordering::Relaxed) as f64;
        let misses = self.memo_misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

#[derive(Default)]
pub struct ResultsStore {
    node_futures: DashMap<usize, NodeFut>,
    hash_memo: DashMap<u64, NodeFut>,
    pub metrics: RunMetrics,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get this node's in-flight or completed future, constructing it via
    /// `make` exactly once if absent.
    pub fn node_future(&self, idx: usize, make: impl FnOnce() -> NodeFut) -> NodeFut {
        self.node_futures.entry(idx).or_insert_with(make).clone()
    }

    /// Get the shared invocation future for a `nonImportantHash`,
    /// constructing it via `make` exactly once if absent. Records a
    /// hit/miss against `metrics` either way.
    pub fn hash_memo(&self, hash: u64, make: impl FnOnce() -> NodeFut) -> NodeFut {
        let mut inserted = false;
        let fut = self
            .hash_memo
            .entry(hash)
            .or_insert_with(|| {
                inserted = true;
                make()
            })
            .clone();
        if inserted {
            self.metrics.memo_misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.memo_hits.fetch_add(1, Ordering::Relaxed);
        }
        fut
    }
}
