use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::RetrievalConfig;
use hotelrag_core::types::{FusedCandidate, Intent, MatchedSummary, Route};
use hotelrag_core::{Error, ModelError};

use crate::fusion::{fuse, RankedList};
use crate::routes::{Retrieve, RetrievalSources, RouteOutput, RouteScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Ok,
    Failed,
    TimedOut,
}

/// Outcome of one (route, sub-query) unit.
#[derive(Debug, Clone, Serialize)]
pub struct RouteReport {
    pub route: Route,
    pub sub_query: usize,
    pub status: RouteStatus,
    pub hits: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub candidates: Vec<FusedCandidate>,
    pub summaries: Vec<MatchedSummary>,
    /// Generated documents keyed by sub-query index.
    pub hypotheticals: BTreeMap<usize, Vec<String>>,
    pub reports: Vec<RouteReport>,
    pub all_routes_failed: bool,
}

impl RetrievalOutcome {
    pub fn no_relevant_data(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The retrieval failure when no route produced a usable result.
    pub fn failure(&self) -> Option<Error> {
        self.all_routes_failed.then(|| Error::AllRoutesFailed { attempts: self.reports.len() })
    }

    /// Slowest unit per route, in milliseconds.
    pub fn route_timings(&self) -> BTreeMap<Route, u64> {
        let mut timings = BTreeMap::new();
        for r in &self.reports {
            let slot = timings.entry(r.route).or_insert(0);
            *slot = (*slot).max(r.elapsed_ms);
        }
        timings
    }
}

/// Fans every enabled route out over every sub-query and fuses the results.
pub struct HybridRetriever {
    sources: RetrievalSources,
    cfg: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(sources: RetrievalSources, cfg: RetrievalConfig) -> Self {
        Self { sources, cfg }
    }

    pub fn sources(&self) -> &RetrievalSources { &self.sources }

    pub fn config(&self) -> &RetrievalConfig { &self.cfg }

    /// Individual route failures and timeouts degrade the result; only
    /// cancellation is returned as an error.
    pub async fn retrieve(&self, intent: &Intent, cancel: &CancellationToken) -> Result<RetrievalOutcome, Error> {
        if intent.sub_queries.is_empty() {
            return Ok(RetrievalOutcome::default());
        }
        let routes = self.cfg.enabled_routes();
        let scope = RouteScope::new(&self.sources, &intent.sub_queries, intent.room_type.as_ref(), self.cfg.route_top_k, cancel);
        let budget = Duration::from_millis(self.cfg.route_timeout_ms);

        let units: Vec<(Route, usize)> = routes
            .iter()
            .flat_map(|&route| (0..intent.sub_queries.len()).map(move |sub| (route, sub)))
            .collect();

        let runs = units.iter().map(|&(route, sub)| {
            let scope = &scope;
            async move {
                let started = Instant::now();
                let (result, timed_out) = match tokio::time::timeout(budget, route.retrieve(scope, sub)).await {
                    Ok(r) => (r, false),
                    Err(_) => (Err(Error::route_timeout(route, budget)), true),
                };
                (route, sub, started.elapsed(), timed_out, result)
            }
        });
        let results = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Model(ModelError::Cancelled)),
            r = futures::future::join_all(runs) => r,
        };
        if cancel.is_cancelled() {
            return Err(Error::Model(ModelError::Cancelled));
        }

        let mut outcome = RetrievalOutcome::default();
        let mut lists = Vec::new();
        let mut summary_hits: BTreeMap<usize, (f32, Vec<usize>)> = BTreeMap::new();
        for (route, sub, elapsed, timed_out, result) in results {
            let elapsed_ms = elapsed.as_millis() as u64;
            match result {
                Ok(RouteOutput { candidates, summary, hypotheticals }) => {
                    tracing::debug!(%route, sub_query = sub, hits = candidates.len(), elapsed_ms, "route finished");
                    outcome.reports.push(RouteReport { route, sub_query: sub, status: RouteStatus::Ok, hits: candidates.len(), elapsed_ms, error: None });
                    if let Some((idx, similarity)) = summary {
                        let entry = summary_hits.entry(idx).or_insert((f32::MIN, Vec::new()));
                        entry.0 = entry.0.max(similarity);
                        entry.1.push(sub);
                    }
                    if !hypotheticals.is_empty() {
                        outcome.hypotheticals.insert(sub, hypotheticals);
                    }
                    let weight = intent.sub_queries[sub].weight * self.cfg.route_weights.weight(route);
                    lists.push(RankedList { route, sub_query: sub, weight, hits: candidates });
                }
                Err(e) => {
                    tracing::warn!(%route, sub_query = sub, error = %e, "retrieval route degraded");
                    outcome.reports.push(RouteReport {
                        route,
                        sub_query: sub,
                        status: if timed_out { RouteStatus::TimedOut } else { RouteStatus::Failed },
                        hits: 0,
                        elapsed_ms,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        outcome.all_routes_failed = lists.is_empty();
        if outcome.all_routes_failed {
            tracing::warn!(units = units.len(), "every retrieval route failed");
        }
        outcome.candidates = fuse(&lists, self.cfg.rrf_k, self.cfg.candidate_pool);
        outcome.summaries = summary_hits
            .into_iter()
            .filter_map(|(idx, (similarity, mut subs))| {
                let s = self.sources.summaries.get(idx)?;
                subs.sort_unstable();
                subs.dedup();
                Some(MatchedSummary {
                    category: s.category.clone(),
                    keywords: s.keywords.clone(),
                    summary: s.summary.clone(),
                    comment_count: s.comment_count,
                    similarity,
                    sub_queries: subs,
                })
            })
            .collect();
        outcome.summaries.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        tracing::info!(candidates = outcome.candidates.len(), lists = lists.len(), "hybrid retrieval done");
        Ok(outcome)
    }
}
