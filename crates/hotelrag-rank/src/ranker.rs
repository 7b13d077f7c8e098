use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::RankingConfig;
use hotelrag_core::traits::Reranker;
use hotelrag_core::types::{Comment, FeatureScores, FusedCandidate, RankedResult, TimeSensitivity};
use hotelrag_core::{CommentStore, ModelError};

use crate::features::{quality, recency};

/// Cross-encoder relevance followed by a weighted blend with quality and recency.
pub struct Ranker {
    reranker: Arc<dyn Reranker>,
    cfg: RankingConfig,
    as_of: NaiveDate,
}

struct Scored<'a> {
    candidate: &'a FusedCandidate,
    comment: &'a Comment,
    relevance: f64,
    relevance_rank: usize,
}

impl Ranker {
    /// Recency is measured from `cfg.as_of`, or from today when unset.
    pub fn new(reranker: Arc<dyn Reranker>, cfg: RankingConfig) -> Self {
        let as_of = cfg.as_of.unwrap_or_else(|| Local::now().date_naive());
        Self { reranker, cfg, as_of }
    }

    pub fn as_of(&self) -> NaiveDate { self.as_of }

    pub fn config(&self) -> &RankingConfig { &self.cfg }

    /// Ranks the fused pool and keeps the configured evidence count.
    /// A failing cross-encoder degrades relevance to the normalized fused
    /// score; only cancellation is an error.
    pub async fn rank(
        &self,
        query: &str,
        pool: &[FusedCandidate],
        store: &CommentStore,
        sensitivity: TimeSensitivity,
        cancel: &CancellationToken,
    ) -> Result<Vec<RankedResult>, ModelError> {
        let resolved: Vec<(&FusedCandidate, &Comment)> =
            pool.iter().filter_map(|c| store.get(&c.doc_id).map(|comment| (c, comment))).collect();
        if resolved.len() < pool.len() {
            tracing::warn!(missing = pool.len() - resolved.len(), "fused candidates missing from snapshot");
        }
        if resolved.is_empty() {
            return Ok(Vec::new());
        }

        let relevance = self.relevance(query, &resolved, cancel).await?;
        let mut scored: Vec<Scored<'_>> = resolved
            .iter()
            .zip(relevance)
            .map(|(&(candidate, comment), relevance)| Scored { candidate, comment, relevance, relevance_rank: 0 })
            .collect();
        scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance).then_with(|| a.candidate.fused_rank.cmp(&b.candidate.fused_rank)));
        for (i, s) in scored.iter_mut().enumerate() {
            s.relevance_rank = i + 1;
        }

        let mut ranked: Vec<RankedResult> = scored.iter().map(|s| self.combine(s, sensitivity)).collect();
        // Stable, so equal finals keep relevance order.
        ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score).then_with(|| a.relevance_rank.cmp(&b.relevance_rank)));
        ranked.truncate(self.cfg.evidence_count);
        for (i, r) in ranked.iter_mut().enumerate() {
            r.final_rank = i + 1;
        }
        tracing::debug!(pool = pool.len(), kept = ranked.len(), "ranking done");
        Ok(ranked)
    }

    async fn relevance(&self, query: &str, resolved: &[(&FusedCandidate, &Comment)], cancel: &CancellationToken) -> Result<Vec<f64>, ModelError> {
        let documents: Vec<String> = resolved.iter().map(|(_, c)| c.text.clone()).collect();
        match self.reranker.rerank(query, &documents, cancel).await {
            Ok(scores) if scores.len() == documents.len() => {
                Ok(scores.into_iter().map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 }).collect())
            }
            Ok(scores) => {
                tracing::warn!(expected = documents.len(), got = scores.len(), "rerank score count mismatch; using fused scores");
                Ok(fused_relevance(resolved))
            }
            Err(ModelError::Cancelled) => Err(ModelError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "rerank failed; using fused scores");
                Ok(fused_relevance(resolved))
            }
        }
    }

    fn combine(&self, s: &Scored<'_>, sensitivity: TimeSensitivity) -> RankedResult {
        let q = quality(s.comment, &self.cfg.quality);
        let r = recency(s.comment.publish_date, self.as_of, sensitivity, &self.cfg);
        let final_score = self.cfg.w_relevance * s.relevance + self.cfg.w_quality * q.blended + self.cfg.w_recency * r;
        RankedResult {
            doc_id: s.candidate.doc_id.clone(),
            relevance_score: s.relevance,
            quality_score: q.blended,
            recency_score: r,
            final_score,
            relevance_rank: s.relevance_rank,
            final_rank: 0,
            fused_score: s.candidate.fused_score,
            fused_rank: s.candidate.fused_rank,
            features: FeatureScores {
                relevance: s.relevance,
                quality: q.blended,
                content_quality: q.content,
                length: q.length,
                review: q.review,
                useful: q.useful,
                recency: r,
            },
        }
    }
}

/// Fused scores divided by the pool maximum.
fn fused_relevance(resolved: &[(&FusedCandidate, &Comment)]) -> Vec<f64> {
    let max = resolved.iter().map(|(c, _)| c.fused_score).fold(0.0_f64, f64::max);
    resolved
        .iter()
        .map(|(c, _)| if max > 0.0 { (c.fused_score / max).clamp(0.0, 1.0) } else { 0.0 })
        .collect()
}
