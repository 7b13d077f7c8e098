//! Weighted Reciprocal Rank Fusion: score = Σ w / (k + rank)
//!
//! Each (route, sub-query) list contributes `route_weight * sub_query_weight`
//! divided by `k + rank` for every document it ranks.

use std::collections::HashMap;

use hotelrag_core::types::{FusedCandidate, RetrievalCandidate, Route, RouteHit};

/// One ranked list from one route for one sub-query.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub route: Route,
    pub sub_query: usize,
    pub weight: f64,
    pub hits: Vec<RetrievalCandidate>,
}

/// Fuse ranked lists and keep the best `pool` documents.
///
/// Per-document contributions are summed in a canonical order, so the result
/// does not depend on the order lists arrive in.
pub fn fuse(lists: &[RankedList], k: f64, pool: usize) -> Vec<FusedCandidate> {
    let mut contributions: HashMap<&str, (Vec<f64>, Vec<RouteHit>)> = HashMap::new();
    for list in lists {
        if !(list.weight.is_finite() && list.weight > 0.0) {
            continue;
        }
        for hit in &list.hits {
            let entry = contributions.entry(hit.doc_id.as_str()).or_default();
            entry.0.push(list.weight / (k + hit.rank as f64));
            entry.1.push(RouteHit { route: list.route, sub_query: list.sub_query, rank: hit.rank });
        }
    }

    let mut fused: Vec<FusedCandidate> = contributions
        .into_iter()
        .map(|(doc_id, (mut parts, mut hits))| {
            parts.sort_by(f64::total_cmp);
            hits.sort_by(|a, b| (a.route, a.sub_query, a.rank).cmp(&(b.route, b.sub_query, b.rank)));
            FusedCandidate { doc_id: doc_id.to_string(), fused_score: parts.iter().sum(), fused_rank: 0, hits }
        })
        .collect();

    fused.sort_by(|a, b| b.fused_score.total_cmp(&a.fused_score).then_with(|| a.doc_id.cmp(&b.doc_id)));
    fused.truncate(pool);
    for (i, c) in fused.iter_mut().enumerate() {
        c.fused_rank = i + 1;
    }
    fused
}

/// Keep the best rank per document, then renumber ranks densely from 1.
/// Input ranks are 1-indexed; ties on rank prefer the higher raw score.
pub fn dedupe_best_rank(mut hits: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
    hits.sort_by(|a, b| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| b.raw_score.total_cmp(&a.raw_score))
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<RetrievalCandidate> = hits.into_iter().filter(|h| seen.insert(h.doc_id.clone())).collect();
    for (i, h) in out.iter_mut().enumerate() {
        h.rank = i + 1;
    }
    out
}
