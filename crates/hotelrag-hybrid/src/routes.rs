use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{Embedder, VectorCollection};
use hotelrag_core::types::{CategorySummary, RetrievalCandidate, RoomTypeConstraint, Route, SubQuery, VectorHit};
use hotelrag_core::{CommentStore, Error, ModelError};
use hotelrag_intent::HypotheticalWriter;
use hotelrag_text::InvertedIndex;
use hotelrag_vector::memory::cosine;

use crate::fusion::dedupe_best_rank;

/// Read-only data and clients every route draws from; built once at startup.
pub struct RetrievalSources {
    pub index: Arc<InvertedIndex>,
    pub store: Arc<CommentStore>,
    pub comments: Arc<dyn VectorCollection>,
    pub reverse_queries: Arc<dyn VectorCollection>,
    pub summaries: Arc<Vec<CategorySummary>>,
    pub embedder: Arc<dyn Embedder>,
    pub hypothetical: Arc<HypotheticalWriter>,
}

/// Per-request state shared by the concurrently running routes.
pub struct RouteScope<'a> {
    pub sources: &'a RetrievalSources,
    pub sub_queries: &'a [SubQuery],
    pub constraint: Option<&'a RoomTypeConstraint>,
    pub top_k: usize,
    pub cancel: &'a CancellationToken,
    query_vectors: OnceCell<Result<Vec<Vec<f32>>, ModelError>>,
}

impl<'a> RouteScope<'a> {
    pub fn new(
        sources: &'a RetrievalSources,
        sub_queries: &'a [SubQuery],
        constraint: Option<&'a RoomTypeConstraint>,
        top_k: usize,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { sources, sub_queries, constraint, top_k, cancel, query_vectors: OnceCell::new() }
    }

    /// Embeddings of all sub-queries, computed once by whichever route asks first.
    async fn query_vector(&self, sub_query: usize) -> Result<&[f32], ModelError> {
        let vectors = self
            .query_vectors
            .get_or_init(|| async {
                let texts: Vec<String> = self.sub_queries.iter().map(|s| s.text.clone()).collect();
                self.sources.embedder.embed_batch(&texts, self.cancel).await
            })
            .await;
        match vectors {
            Ok(v) => v.get(sub_query).map(Vec::as_slice).ok_or_else(|| ModelError::Decode("missing sub-query embedding".into())),
            Err(e) => Err(e.clone()),
        }
    }

    fn admits(&self, doc_id: &str) -> bool {
        self.sources.store.get(doc_id).is_some_and(|c| c.matches_room(self.constraint))
    }

    /// Vector hits mapped back to comments known to the snapshot, best rank per comment.
    fn comment_candidates(&self, route: Route, hits: Vec<VectorHit>) -> Vec<RetrievalCandidate> {
        let ranked = hits
            .into_iter()
            .filter(|h| self.admits(&h.comment_id))
            .enumerate()
            .map(|(i, h)| RetrievalCandidate { doc_id: h.comment_id, route, rank: i + 1, raw_score: f64::from(h.score) })
            .collect();
        dedupe_best_rank(ranked)
    }
}

/// What one route produced for one sub-query.
#[derive(Debug, Default)]
pub struct RouteOutput {
    pub candidates: Vec<RetrievalCandidate>,
    /// Best-matching summary index and its similarity (category route only).
    pub summary: Option<(usize, f32)>,
    /// Generated documents (hypothetical route only).
    pub hypotheticals: Vec<String>,
}

fn route_error(route: Route, e: impl std::fmt::Display) -> Error {
    Error::UpstreamRoute { route, reason: e.to_string() }
}

/// The retrieval contract every route variant implements.
#[async_trait]
pub trait Retrieve {
    async fn retrieve(&self, scope: &RouteScope<'_>, sub_query: usize) -> Result<RouteOutput, Error>;
}

#[async_trait]
impl Retrieve for Route {
    async fn retrieve(&self, scope: &RouteScope<'_>, sub_query: usize) -> Result<RouteOutput, Error> {
        let route = *self;
        let text = scope.sub_queries.get(sub_query).map(|s| s.text.as_str()).unwrap_or_default();
        match route {
            Route::Lexical => {
                let tokens = hotelrag_text::tokenize(text);
                let hits = scope.sources.index.search_filtered(&tokens, scope.top_k, |id| scope.admits(id));
                let candidates = hits
                    .into_iter()
                    .enumerate()
                    .map(|(i, h)| RetrievalCandidate { doc_id: h.doc_id, route, rank: i + 1, raw_score: h.score })
                    .collect();
                Ok(RouteOutput { candidates, ..RouteOutput::default() })
            }
            Route::Dense | Route::ReverseQuery => {
                let vector = scope.query_vector(sub_query).await.map_err(|e| route_error(route, e))?;
                let collection = if route == Route::Dense { &scope.sources.comments } else { &scope.sources.reverse_queries };
                let hits = collection
                    .nearest(vector, scope.top_k, scope.constraint, scope.cancel)
                    .await
                    .map_err(|e| route_error(route, e))?;
                Ok(RouteOutput { candidates: scope.comment_candidates(route, hits), ..RouteOutput::default() })
            }
            Route::Hypothetical => {
                let docs = scope.sources.hypothetical.write(text, scope.cancel).await.map_err(|e| route_error(route, e))?;
                let vectors = scope.sources.embedder.embed_batch(&docs, scope.cancel).await.map_err(|e| route_error(route, e))?;
                let searches = vectors
                    .iter()
                    .map(|v| scope.sources.comments.nearest(v, scope.top_k, scope.constraint, scope.cancel));
                let mut merged = Vec::new();
                for result in futures::future::join_all(searches).await {
                    let hits = result.map_err(|e| route_error(route, e))?;
                    merged.extend(scope.comment_candidates(route, hits));
                }
                Ok(RouteOutput { candidates: dedupe_best_rank(merged), hypotheticals: docs, ..RouteOutput::default() })
            }
            Route::CategorySummary => {
                let vector = scope.query_vector(sub_query).await.map_err(|e| route_error(route, e))?;
                let best = scope
                    .sources
                    .summaries
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (i, cosine(vector, &s.vector)))
                    .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
                let Some((idx, similarity)) = best else { return Ok(RouteOutput::default()) };
                let category = &scope.sources.summaries[idx].category;
                let candidates = scope
                    .sources
                    .store
                    .by_category(category, usize::MAX)
                    .into_iter()
                    .filter(|c| c.matches_room(scope.constraint))
                    .take(scope.top_k)
                    .enumerate()
                    .map(|(i, c)| RetrievalCandidate { doc_id: c.id.clone(), route, rank: i + 1, raw_score: c.quality_score })
                    .collect();
                Ok(RouteOutput { candidates, summary: Some((idx, similarity)), ..RouteOutput::default() })
            }
        }
    }
}
