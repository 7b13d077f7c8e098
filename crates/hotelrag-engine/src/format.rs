//! Wire payloads for evidence and the human-readable query report.

use std::fmt::Write;

use serde::Serialize;

use hotelrag_core::types::{Comment, RankedResult, Route};
use hotelrag_core::CommentStore;
use hotelrag_hybrid::RetrievalOutcome;

use crate::events::StageTimings;

/// A ranked comment as sent to clients: the stored comment fields plus its
/// final score and rank.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceItem {
    #[serde(flatten)]
    pub comment: Comment,
    pub relevance_score: f64,
    pub rank: usize,
    #[serde(skip)]
    pub detail: RankedResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRef {
    pub category: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct References {
    pub comments: Vec<EvidenceItem>,
    pub summaries: Vec<SummaryRef>,
    /// Retrieval ran and produced no evidence.
    pub no_relevant_data: bool,
    /// Set when every retrieval route failed, as opposed to nothing matching.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retrieval_failed: bool,
}

impl References {
    pub fn build(ranked: &[RankedResult], outcome: &RetrievalOutcome, store: &CommentStore) -> Self {
        let comments: Vec<EvidenceItem> = ranked
            .iter()
            .filter_map(|r| {
                store.get(&r.doc_id).map(|c| EvidenceItem {
                    comment: c.clone(),
                    relevance_score: r.final_score,
                    rank: r.final_rank,
                    detail: r.clone(),
                })
            })
            .collect();
        let summaries = outcome
            .summaries
            .iter()
            .map(|s| SummaryRef { category: s.category.clone(), content: s.summary.clone() })
            .collect();
        Self {
            no_relevant_data: outcome.no_relevant_data() || comments.is_empty(),
            retrieval_failed: outcome.all_routes_failed,
            comments,
            summaries,
        }
    }
}

fn route_label(route: Route) -> &'static str {
    match route {
        Route::Lexical => "文本",
        Route::Dense => "向量",
        Route::ReverseQuery => "反向",
        Route::Hypothetical => "HyDE",
        Route::CategorySummary => "摘要",
    }
}

/// Multi-section text report used by the command-line tools.
pub fn render_report(result: &crate::engine::QueryResult) -> String {
    let mut out = String::new();
    let t: &StageTimings = &result.timing;
    let _ = writeln!(out, "⏱️  Timing:");
    let _ = writeln!(out, "  • intent:     {} ms", t.intent_ms);
    let _ = writeln!(out, "  • retrieval:  {} ms", t.retrieval_ms);
    for (route, ms) in &t.routes {
        let _ = writeln!(out, "      - {:<16} {} ms", route.as_str(), ms);
    }
    let _ = writeln!(out, "  • ranking:    {} ms", t.ranking_ms);
    let _ = writeln!(out, "  • generation: {} ms", t.generation_ms);
    let _ = writeln!(out, "  • total:      {} ms", t.total_ms);

    let intent = &result.intent;
    if intent.needs_retrieval {
        let _ = writeln!(out, "\n🔍 Intent:");
        let room = intent.room_type.as_ref().map_or("-".to_string(), |r| format!("{r:?}"));
        let _ = writeln!(out, "  • room type: {room} | time sensitivity: {:?}", intent.time_sensitivity);
        for (i, q) in intent.sub_queries.iter().enumerate() {
            let _ = writeln!(out, "  • Q{i}: {} (weight={})", q.text, q.weight);
        }
    } else {
        let _ = writeln!(out, "\n🔍 Answered directly, no retrieval");
    }

    if !result.hypotheticals.is_empty() {
        let _ = writeln!(out, "\n🔮 Hypothetical reviews:");
        for (q, docs) in &result.hypotheticals {
            for (h, doc) in docs.iter().enumerate() {
                let _ = writeln!(out, "  • Q{q}-H{h}: {doc}");
            }
        }
    }

    if !result.summaries.is_empty() {
        let _ = writeln!(out, "\n📚 Summaries ({}):", result.summaries.len());
        for (i, s) in result.summaries.iter().enumerate() {
            let _ = writeln!(out, "  [{}] {} (Q{:?}, similarity {:.3})", i + 1, s.category, s.sub_queries, s.similarity);
            let _ = writeln!(out, "      keywords: {} | comments: {}", s.keywords, s.comment_count);
        }
    }

    let refs = &result.references;
    if refs.retrieval_failed {
        let _ = writeln!(out, "\n⚠️  Every retrieval route failed");
    }
    if refs.comments.is_empty() {
        let _ = writeln!(out, "\n🏆 No evidence");
    } else {
        let _ = writeln!(out, "\n🏆 Top {} comments:", refs.comments.len());
        for e in &refs.comments {
            let d = &e.detail;
            let c = &e.comment;
            let _ = writeln!(out, "  ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            let _ = writeln!(out, "  #{:>2} final {:.4} | fused #{} {:.4} | relevance #{} {:.3}", d.final_rank, d.final_score, d.fused_rank, d.fused_score, d.relevance_rank, d.relevance_score);
            let _ = writeln!(
                out,
                "  quality {:.3} (content {:.3}, length {:.3}, replies {:.3}, useful {:.3}) | recency {:.3}",
                d.features.quality, d.features.content_quality, d.features.length, d.features.review, d.features.useful, d.features.recency
            );
            let date = c.publish_date.map_or_else(|| "-".to_string(), |d| d.to_string());
            let room = c.room_type.as_deref().unwrap_or("-");
            let _ = writeln!(out, "  id: {} | room: {} | score: {:.1} | date: {}", c.id, room, c.score, date);
            let _ = writeln!(out, "  {}", c.text);
        }
    }

    if !result.routes.is_empty() {
        let _ = writeln!(out, "\n🧭 Route hits:");
        for r in &result.routes {
            let _ = writeln!(out, "  • {}(Q{}): {:?}, {} hits, {} ms", route_label(r.route), r.sub_query, r.status, r.hits, r.elapsed_ms);
        }
    }

    if let Some(answer) = &result.answer {
        let _ = writeln!(out, "\n💬 Answer:\n{answer}");
    }
    out
}
