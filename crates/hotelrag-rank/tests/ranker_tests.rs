use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::{QualityWeights, RankingConfig};
use hotelrag_core::types::{FusedCandidate, TimeSensitivity};
use hotelrag_core::{CommentStore, ModelError};
use hotelrag_fixtures::{hotel_corpus, CommentBuilder, FnReranker};
use hotelrag_rank::{decay_rate, quality, recency, Ranker};

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
}

fn cfg() -> RankingConfig {
    RankingConfig { as_of: Some(as_of()), ..RankingConfig::default() }
}

fn pool(ids: &[&str]) -> Vec<FusedCandidate> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| FusedCandidate {
            doc_id: (*id).into(),
            fused_score: 1.0 / (61.0 + i as f64),
            fused_rank: i + 1,
            hits: Vec::new(),
        })
        .collect()
}

#[test]
fn recency_decays_faster_for_time_sensitive_questions() {
    let c = cfg();
    let old = NaiveDate::from_ymd_opt(2024, 9, 1);
    let fresh = NaiveDate::from_ymd_opt(2025, 8, 1);
    for sensitivity in [TimeSensitivity::None, TimeSensitivity::Implied, TimeSensitivity::Clear] {
        assert!(recency(fresh, as_of(), sensitivity, &c) > recency(old, as_of(), sensitivity, &c));
    }
    let gap = |s| recency(fresh, as_of(), s, &c) - recency(old, as_of(), s, &c);
    assert!(gap(TimeSensitivity::Clear) > gap(TimeSensitivity::None));
    assert!(decay_rate(TimeSensitivity::Clear, &c) > decay_rate(TimeSensitivity::Implied, &c));
}

#[test]
fn recency_edges() {
    let c = cfg();
    assert_eq!(recency(None, as_of(), TimeSensitivity::None, &c), 0.0);
    assert_eq!(recency(Some(as_of()), as_of(), TimeSensitivity::Clear, &c), 1.0);
    let future = NaiveDate::from_ymd_opt(2026, 1, 1);
    assert_eq!(recency(future, as_of(), TimeSensitivity::None, &c), 1.0);
    // At the base rate of 0.5, two half-lives halve the score once.
    let half = as_of() - chrono::Duration::days(360);
    assert!((recency(Some(half), as_of(), TimeSensitivity::None, &c) - 0.5).abs() < 1e-9);
}

#[test]
fn quality_is_bounded_and_monotone() {
    let w = QualityWeights::default();
    let weak = CommentBuilder::new("a", "一般").quality(2.0).build();
    let strong = CommentBuilder::new("b", &"很好".repeat(200)).quality(9.5).counts(40, 600).build();
    let (qw, qs) = (quality(&weak, &w), quality(&strong, &w));
    assert!(qs.blended > qw.blended);
    for q in [qw, qs] {
        for v in [q.blended, q.content, q.length, q.review, q.useful] {
            assert!((0.0..=1.0).contains(&v));
        }
    }
    assert_eq!(qs.review, 1.0);
    assert_eq!(qs.useful, 1.0);
}

#[tokio::test]
async fn ranks_by_weighted_blend_and_truncates() {
    let store = CommentStore::from_comments(hotel_corpus());
    let ranker = Ranker::new(Arc::new(FnReranker::char_overlap()), RankingConfig { evidence_count: 2, ..cfg() });
    let ranked = ranker
        .rank("早餐种类丰富吗", &pool(&["breakfast-poor", "location", "breakfast-rich"]), &store, TimeSensitivity::None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].doc_id, "breakfast-rich");
    assert_eq!(ranked.iter().map(|r| r.final_rank).collect::<Vec<_>>(), vec![1, 2]);
    assert!(ranked[0].final_score >= ranked[1].final_score);
    let r = &ranked[0];
    let expected = 0.4 * r.relevance_score + 0.4 * r.quality_score + 0.2 * r.recency_score;
    assert!((r.final_score - expected).abs() < 1e-12);
}

#[tokio::test]
async fn ties_fall_back_to_relevance_rank() {
    let twins = [
        CommentBuilder::new("first", "同样的评论").build(),
        CommentBuilder::new("second", "同样的评论").build(),
    ];
    let store = CommentStore::from_comments(twins);
    let ranker = Ranker::new(Arc::new(FnReranker::new(|_, _| 0.5)), cfg());
    let ranked = ranker.rank("评论", &pool(&["second", "first"]), &store, TimeSensitivity::None, &CancellationToken::new()).await.unwrap();
    assert_eq!(ranked[0].final_score, ranked[1].final_score);
    assert_eq!(ranked[0].doc_id, "second");
    assert_eq!(ranked[0].relevance_rank, 1);
}

#[tokio::test]
async fn rerank_failure_falls_back_to_fused_scores() {
    let store = CommentStore::from_comments(hotel_corpus());
    let reranker = Arc::new(FnReranker::failing());
    let ranker = Ranker::new(reranker.clone(), RankingConfig { w_relevance: 1.0, w_quality: 0.0, w_recency: 0.0, ..cfg() });
    let ranked = ranker
        .rank("位置", &pool(&["location", "service", "pool"]), &store, TimeSensitivity::None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reranker.call_count(), 1);
    assert_eq!(ranked.iter().map(|r| r.doc_id.as_str()).collect::<Vec<_>>(), vec!["location", "service", "pool"]);
    assert_eq!(ranked[0].relevance_score, 1.0);
}

#[tokio::test]
async fn cancellation_propagates_and_unknown_ids_are_skipped() {
    let store = CommentStore::from_comments(hotel_corpus());
    let ranker = Ranker::new(Arc::new(FnReranker::char_overlap()), cfg());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = ranker.rank("位置", &pool(&["location"]), &store, TimeSensitivity::None, &cancel).await;
    assert_eq!(err, Err(ModelError::Cancelled));

    let ranked = ranker.rank("位置", &pool(&["ghost"]), &store, TimeSensitivity::None, &CancellationToken::new()).await.unwrap();
    assert!(ranked.is_empty());
}

#[tokio::test]
async fn time_sensitive_question_promotes_fresh_reviews() {
    let store = CommentStore::from_comments([
        CommentBuilder::new("old", "早餐不错").date(2023, 1, 1).build(),
        CommentBuilder::new("new", "早餐不错").date(2025, 8, 20).build(),
    ]);
    let ranker = Ranker::new(Arc::new(FnReranker::new(|_, _| 0.8)), cfg());
    let calm = ranker.rank("早餐", &pool(&["old", "new"]), &store, TimeSensitivity::None, &CancellationToken::new()).await.unwrap();
    let urgent = ranker.rank("早餐", &pool(&["old", "new"]), &store, TimeSensitivity::Clear, &CancellationToken::new()).await.unwrap();
    assert_eq!(urgent[0].doc_id, "new");
    let gap = |r: &[hotelrag_core::types::RankedResult]| r[0].recency_score - r[1].recency_score;
    assert!(gap(&urgent) > gap(&calm));
}
