use async_trait::async_trait;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use hotelrag_core::config::{Config, RagConfig};
use hotelrag_core::{Comment, CommentSource, CommentStore, Route, RoomTypeConstraint, TimeSensitivity};

fn comment(id: &str, quality: f64, category: Option<&str>) -> Comment {
    Comment {
        id: id.into(),
        text: format!("review {id}"),
        score: 4.5,
        star: 5,
        room_type: None,
        fuzzy_room_type: None,
        travel_type: None,
        publish_date: None,
        useful_count: 0,
        review_count: 0,
        category1: category.map(String::from),
        category2: None,
        category3: None,
        quality_score: quality,
        images: vec![],
    }
}

#[test]
fn comment_parses_store_wire_format() {
    let raw = r#"{
        "_id": "c-1",
        "comment": "房间很干净，早餐丰富",
        "score": 4.8,
        "star": 5,
        "room_type": "花园大床房",
        "fuzzy_room_type": "大床房",
        "publish_date": "2025-03-14T09:30:00Z",
        "useful_count": 3,
        "review_count": 12,
        "category1": "卫生",
        "quality_score": 8.5,
        "images": ["a.jpg"]
    }"#;
    let c: Comment = serde_json::from_str(raw).expect("parse");
    assert_eq!(c.id, "c-1");
    assert_eq!(c.publish_date, chrono::NaiveDate::from_ymd_opt(2025, 3, 14));
    assert!(c.has_category("卫生"));
    assert!(c.matches_room(Some(&RoomTypeConstraint::Fuzzy("大床房".into()))));
    assert!(c.matches_room(Some(&RoomTypeConstraint::Exact("花园大床房".into()))));
    assert!(!c.matches_room(Some(&RoomTypeConstraint::Exact("大床房".into()))));
}

#[test]
fn comment_tolerates_missing_optional_fields() {
    let c: Comment = serde_json::from_str(r#"{"_id":"x","comment":"ok","publish_date":null}"#).expect("parse");
    assert_eq!(c.publish_date, None);
    assert_eq!(c.useful_count, 0);
    assert_eq!(c.categories().count(), 0);
}

#[test]
fn default_settings_are_valid() {
    let cfg = RagConfig::default();
    cfg.validate().expect("defaults validate");
    assert_eq!(cfg.retrieval.rrf_k, 60.0);
    assert!(cfg.retrieval.candidate_pool >= cfg.ranking.evidence_count);
    assert!(!cfg.retrieval.enabled_routes().contains(&Route::Hypothetical));
}

#[test]
fn hypothetical_flag_enables_route() {
    let mut cfg = RagConfig::default();
    cfg.retrieval.hypothetical_document = true;
    assert_eq!(cfg.retrieval.enabled_routes().last(), Some(&Route::Hypothetical));
}

#[test]
fn pool_smaller_than_evidence_is_rejected() {
    let mut cfg = RagConfig::default();
    cfg.retrieval.candidate_pool = 5;
    cfg.ranking.evidence_count = 10;
    assert!(cfg.validate().is_err());
}

#[test]
fn negative_weight_is_rejected() {
    let mut cfg = RagConfig::default();
    cfg.ranking.w_recency = -0.1;
    assert!(cfg.validate().is_err());
}

#[test]
fn toml_overrides_merge_over_defaults() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        "[retrieval]\nrrf_k = 40.0\ncandidate_pool = 20\n\n[ranking]\nevidence_count = 5\n",
    )
    .unwrap();
    fs::write(tmp.path().join("config.test.toml"), "[generation]\nhotel_name = \"测试酒店\"\n").unwrap();

    let cfg = Config::load_from(tmp.path(), "test").expect("load");
    let settings = cfg.settings().expect("settings");
    assert_eq!(settings.retrieval.rrf_k, 40.0);
    assert_eq!(settings.retrieval.candidate_pool, 20);
    assert_eq!(settings.ranking.evidence_count, 5);
    assert_eq!(settings.generation.hotel_name, "测试酒店");
    assert_eq!(settings.ranking.half_life_days, 180.0);
    let k: f64 = cfg.get("retrieval.rrf_k").expect("get");
    assert_eq!(k, 40.0);
}

#[test]
fn time_sensitivity_uses_snake_case() {
    let t: TimeSensitivity = serde_json::from_str("\"implied\"").unwrap();
    assert_eq!(t, TimeSensitivity::Implied);
}

#[test]
fn snapshot_round_trips_through_disk_and_dedupes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("snap/comments.json");
    let store = CommentStore::from_comments(vec![comment("a", 1.0, None), comment("b", 2.0, None), comment("a", 3.0, None)]);
    assert_eq!(store.len(), 2);
    assert_eq!(store.get("a").unwrap().quality_score, 3.0);

    store.save_json(&path).unwrap();
    let loaded = CommentStore::load_json(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
}

#[test]
fn by_category_orders_by_quality() {
    let store = CommentStore::from_comments(vec![
        comment("low", 1.0, Some("早餐")),
        comment("high", 9.0, Some("早餐")),
        comment("other", 10.0, Some("位置")),
    ]);
    let hits: Vec<&str> = store.by_category("早餐", 5).iter().map(|c| c.id.as_str()).collect();
    assert_eq!(hits, vec!["high", "low"]);
}

struct PagedSource {
    total: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl CommentSource for PagedSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> anyhow::Result<Vec<Comment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let end = (offset + limit).min(self.total);
        Ok((offset..end).map(|i| comment(&format!("c{i}"), 0.0, None)).collect())
    }
}

#[tokio::test]
async fn paged_loading_stops_on_short_page() {
    let source = PagedSource { total: 25, calls: AtomicUsize::new(0) };
    let store = CommentStore::load_paged(&source, 10).await.unwrap();
    assert_eq!(store.len(), 25);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}
