//! Metrics/tracing hooks.
//!
//! Operators log through `tracing` themselves; this module adds the per-run
//! span and a post-run walk that reports cache counters per node.

use serde::Serialize;
use tracing::{debug, info_span, Span};

use rasq_core::dag::OperatorKind;
use rasq_core::hash::Hash256;
use rasq_operators::cache::CacheStats;
use rasq_operators::traits::Operator;

pub fn run_span(plan_hash: &Hash256) -> Span {
    info_span!("rasq_run", plan = %plan_hash.to_hex())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorStats {
    /// Preorder position, matching the physical `OpId`.
    pub position: usize,
    pub kind: OperatorKind,
    pub cache: Option<CacheStats>,
}

/// Preorder walk collecting per-operator counters.
pub fn collect_stats(root: &dyn Operator) -> Vec<OperatorStats> {
    fn walk(op: &dyn Operator, out: &mut Vec<OperatorStats>) {
        out.push(OperatorStats {
            position: out.len(),
            kind: op.kind(),
            cache: op.cache_stats(),
        });
        for child in op.children() {
            walk(child, out);
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

pub fn emit_stats(stats: &[OperatorStats]) {
    for s in stats {
        if let Some(c) = s.cache {
            debug!(position = s.position, operator = %s.kind, hits = c.hits, misses = c.misses, "cache counters");
        }
    }
}
