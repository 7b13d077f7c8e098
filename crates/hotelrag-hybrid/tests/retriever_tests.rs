use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hotelrag_core::config::RetrievalConfig;
use hotelrag_core::traits::{Embedder, VectorCollection};
use hotelrag_core::types::{CategorySummary, Intent, RetrievalCandidate, RoomTypeConstraint, Route, SubQuery, TimeSensitivity};
use hotelrag_core::{CommentStore, Error, ModelError};
use hotelrag_fixtures::{hotel_corpus, FailingEmbedder, ScriptedChat, StallingCollection};
use hotelrag_hybrid::{fuse, HybridRetriever, RankedList, RetrievalSources, RouteStatus};
use hotelrag_intent::HypotheticalWriter;
use hotelrag_models::HashEmbedder;
use hotelrag_text::{Bm25Params, InvertedIndex};
use hotelrag_vector::{InMemoryCollection, VectorEntry};

const DIM: usize = 256;

fn comment_collection(embedder: &HashEmbedder) -> InMemoryCollection {
    let entries = hotel_corpus()
        .into_iter()
        .map(|c| VectorEntry {
            vector: embedder.embed_text(&c.text),
            id: c.id.clone(),
            comment_id: c.id,
            room_type: c.room_type,
            fuzzy_room_type: c.fuzzy_room_type,
            text: c.text,
        })
        .collect();
    InMemoryCollection::new(entries)
}

fn reverse_collection(embedder: &HashEmbedder) -> InMemoryCollection {
    let questions = [
        ("rq-1", "suite-space", Some(("行政套房", "套房")), "套房空间大不大"),
        ("rq-2", "suite-space", Some(("行政套房", "套房")), "客厅和卧室是分开的吗"),
        ("rq-3", "breakfast-rich", Some(("花园双床房", "双床房")), "早餐有哪些种类"),
        ("rq-4", "location", None, "离地铁站近吗"),
    ];
    let entries = questions
        .into_iter()
        .map(|(id, comment_id, room, text)| VectorEntry {
            id: id.into(),
            comment_id: comment_id.into(),
            room_type: room.map(|r| r.0.to_string()),
            fuzzy_room_type: room.map(|r| r.1.to_string()),
            text: text.into(),
            vector: embedder.embed_text(text),
        })
        .collect();
    InMemoryCollection::new(entries)
}

fn summaries(embedder: &HashEmbedder) -> Vec<CategorySummary> {
    [("早餐", "早餐种类丰富", "早餐评价两极，种类丰富但高峰期拥挤"), ("位置", "位置交通方便", "靠近地铁，周边餐饮多")]
        .into_iter()
        .map(|(category, keywords, summary)| CategorySummary {
            category: category.into(),
            keywords: keywords.into(),
            summary: summary.into(),
            comment_count: 2,
            vector: embedder.embed_text(keywords),
        })
        .collect()
}

struct Setup {
    embedder: Arc<dyn Embedder>,
    comments: Arc<dyn VectorCollection>,
    hypothetical: Arc<ScriptedChat>,
}

impl Default for Setup {
    fn default() -> Self {
        let hash = HashEmbedder::new(DIM);
        Self {
            comments: Arc::new(comment_collection(&hash)),
            embedder: Arc::new(hash),
            hypothetical: Arc::new(ScriptedChat::new(r#"{"hypothetical_responses": ["套房空间很大，住得舒服"]}"#)),
        }
    }
}

impl Setup {
    fn retriever(self, cfg: RetrievalConfig) -> HybridRetriever {
        let hash = HashEmbedder::new(DIM);
        let corpus = hotel_corpus();
        let sources = RetrievalSources {
            index: Arc::new(InvertedIndex::build(&corpus, Bm25Params::default())),
            store: Arc::new(CommentStore::from_comments(corpus)),
            comments: self.comments,
            reverse_queries: Arc::new(reverse_collection(&hash)),
            summaries: Arc::new(summaries(&hash)),
            embedder: self.embedder,
            hypothetical: Arc::new(HypotheticalWriter::new(self.hypothetical, 2)),
        };
        HybridRetriever::new(sources, cfg)
    }
}

fn routes(routes: &[Route]) -> RetrievalConfig {
    RetrievalConfig { routes: routes.to_vec(), ..RetrievalConfig::default() }
}

fn intent(query: &str, room: Option<RoomTypeConstraint>) -> Intent {
    Intent {
        needs_retrieval: true,
        room_type: room,
        time_sensitivity: TimeSensitivity::None,
        sub_queries: vec![SubQuery::new(query, 1.0)],
    }
}

fn ranked(route: Route, sub_query: usize, weight: f64, ids: &[&str]) -> RankedList {
    let hits = ids
        .iter()
        .enumerate()
        .map(|(i, id)| RetrievalCandidate { doc_id: (*id).into(), route, rank: i + 1, raw_score: 1.0 })
        .collect();
    RankedList { route, sub_query, weight, hits }
}

#[test]
fn fusion_respects_pool_and_is_order_insensitive() {
    let a = ranked(Route::Lexical, 0, 1.0, &["a", "b", "c", "d"]);
    let b = ranked(Route::Dense, 0, 0.5, &["c", "a", "e"]);
    let forward = fuse(&[a.clone(), b.clone()], 60.0, 3);
    let backward = fuse(&[b, a], 60.0, 3);
    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 3);
    assert_eq!(forward[0].doc_id, "a");
    assert_eq!(forward.iter().map(|c| c.fused_rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(forward.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
}

#[test]
fn single_list_fusion_keeps_its_order() {
    let only = ranked(Route::Lexical, 0, 0.7, &["x", "y", "z"]);
    let fused = fuse(&[only], 60.0, 10);
    assert_eq!(fused.iter().map(|c| c.doc_id.as_str()).collect::<Vec<_>>(), vec!["x", "y", "z"]);
    assert!((fused[0].fused_score - 0.7 / 61.0).abs() < 1e-12);
}

#[test]
fn zero_weight_lists_do_not_contribute() {
    let fused = fuse(&[ranked(Route::Dense, 0, 0.0, &["x"]), ranked(Route::Lexical, 0, 1.0, &["y"])], 60.0, 10);
    assert_eq!(fused.len(), 1);
    assert_eq!(fused[0].doc_id, "y");
}

#[tokio::test]
async fn suite_question_only_returns_suites() {
    let retriever = Setup::default().retriever(routes(&[Route::Lexical, Route::Dense, Route::ReverseQuery]));
    let outcome = retriever
        .retrieve(&intent("套房空间大不大", Some(RoomTypeConstraint::Fuzzy("套房".into()))), &CancellationToken::new())
        .await
        .unwrap();
    assert!(!outcome.candidates.is_empty());
    assert_eq!(outcome.candidates[0].doc_id, "suite-space");
    for c in &outcome.candidates {
        assert!(c.doc_id.starts_with("suite-"), "{} leaked past the room filter", c.doc_id);
    }
    assert!(outcome.reports.iter().all(|r| r.status == RouteStatus::Ok));
}

#[tokio::test]
async fn failing_route_degrades_instead_of_failing() {
    let setup = Setup {
        embedder: Arc::new(FailingEmbedder { dim: DIM, error: ModelError::RateLimited }),
        ..Setup::default()
    };
    let retriever = setup.retriever(routes(&[Route::Lexical, Route::Dense]));
    let outcome = retriever.retrieve(&intent("早餐种类多吗", None), &CancellationToken::new()).await.unwrap();
    assert!(!outcome.all_routes_failed);
    assert!(outcome.failure().is_none());
    assert_eq!(outcome.candidates[0].doc_id, "breakfast-rich");
    let dense = outcome.reports.iter().find(|r| r.route == Route::Dense).unwrap();
    assert_eq!(dense.status, RouteStatus::Failed);
}

#[tokio::test]
async fn stalled_route_times_out() {
    let setup = Setup { comments: Arc::new(StallingCollection), ..Setup::default() };
    let cfg = RetrievalConfig { route_timeout_ms: 50, ..routes(&[Route::Lexical, Route::Dense]) };
    let outcome = setup.retriever(cfg).retrieve(&intent("位置方便吗", None), &CancellationToken::new()).await.unwrap();
    let dense = outcome.reports.iter().find(|r| r.route == Route::Dense).unwrap();
    assert_eq!(dense.status, RouteStatus::TimedOut);
    assert_eq!(outcome.candidates[0].doc_id, "location");
}

#[tokio::test]
async fn all_routes_failing_yields_no_candidates() {
    let setup = Setup {
        embedder: Arc::new(FailingEmbedder { dim: DIM, error: ModelError::Timeout }),
        ..Setup::default()
    };
    let retriever = setup.retriever(routes(&[Route::Dense, Route::ReverseQuery, Route::CategorySummary]));
    let outcome = retriever.retrieve(&intent("早餐怎么样", None), &CancellationToken::new()).await.unwrap();
    assert!(outcome.all_routes_failed);
    assert!(outcome.no_relevant_data());
    assert_eq!(outcome.reports.len(), 3);
    assert!(matches!(outcome.failure(), Some(Error::AllRoutesFailed { attempts: 3 })));
}

#[tokio::test]
async fn category_route_matches_summary_and_orders_by_quality() {
    let retriever = Setup::default().retriever(routes(&[Route::CategorySummary]));
    let outcome = retriever.retrieve(&intent("早餐种类多吗", None), &CancellationToken::new()).await.unwrap();
    assert_eq!(outcome.summaries.len(), 1);
    assert_eq!(outcome.summaries[0].category, "早餐");
    assert_eq!(outcome.summaries[0].sub_queries, vec![0]);
    let ids: Vec<&str> = outcome.candidates.iter().map(|c| c.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["breakfast-rich", "breakfast-poor"]);
}

#[tokio::test]
async fn hypothetical_route_runs_only_when_flagged() {
    let chat = Arc::new(ScriptedChat::new(r#"{"hypothetical_responses": ["套房空间很大，住得舒服"]}"#));
    let setup = Setup { hypothetical: chat.clone(), ..Setup::default() };
    let cfg = RetrievalConfig { hypothetical_document: true, ..routes(&[Route::Lexical]) };
    let outcome = setup.retriever(cfg).retrieve(&intent("套房怎么样", None), &CancellationToken::new()).await.unwrap();
    assert_eq!(chat.call_count(), 1);
    assert_eq!(outcome.hypotheticals.get(&0).map(Vec::len), Some(1));
    let hyde = outcome.reports.iter().find(|r| r.route == Route::Hypothetical).unwrap();
    assert_eq!(hyde.status, RouteStatus::Ok);

    let chat = Arc::new(ScriptedChat::new("{}"));
    let setup = Setup { hypothetical: chat.clone(), ..Setup::default() };
    setup.retriever(routes(&[Route::Lexical, Route::Hypothetical])).retrieve(&intent("套房怎么样", None), &CancellationToken::new()).await.unwrap();
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn sub_query_weights_scale_contributions() {
    let retriever = Setup::default().retriever(routes(&[Route::Lexical]));
    let mut two = intent("早餐种类丰富", None);
    two.sub_queries.push(SubQuery::new("位置离地铁站近", 0.1));
    let outcome = retriever.retrieve(&two, &CancellationToken::new()).await.unwrap();
    let rank_of = |id: &str| outcome.candidates.iter().position(|c| c.doc_id == id).unwrap();
    assert!(rank_of("breakfast-rich") < rank_of("location"));
}

#[tokio::test]
async fn cancelled_retrieval_is_an_error() {
    let retriever = Setup::default().retriever(RetrievalConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(retriever.retrieve(&intent("早餐怎么样", None), &cancel).await.is_err());
}

#[tokio::test]
async fn no_sub_queries_means_no_retrieval() {
    let retriever = Setup::default().retriever(RetrievalConfig::default());
    let outcome = retriever.retrieve(&Intent::direct(), &CancellationToken::new()).await.unwrap();
    assert!(outcome.candidates.is_empty());
    assert!(outcome.reports.is_empty());
}
