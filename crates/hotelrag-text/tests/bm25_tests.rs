use tempfile::TempDir;

use hotelrag_text::{corpus_fingerprint, tokenize, Bm25Params, InvertedIndex};

fn index(docs: &[(&str, &str)]) -> InvertedIndex {
    InvertedIndex::build_from_texts(docs.iter().copied(), Bm25Params::default())
}

#[test]
fn tokenizer_bigrams_han_and_keeps_latin_words() {
    let tokens = tokenize("早餐很丰富, WiFi fast");
    assert_eq!(tokens, vec!["早餐", "丰富", "wifi", "fast"]);
}

#[test]
fn tokenizer_splits_on_particles_and_keeps_single_han() {
    assert_eq!(tokenize("床的"), vec!["床"]);
    assert_eq!(tokenize("隔音效果"), vec!["隔音", "音效", "效果"]);
}

#[test]
fn tokenizer_drops_stop_words() {
    assert!(tokenize("the room and the view").iter().all(|t| t != "the" && t != "and"));
    assert!(tokenize("非常").is_empty());
}

#[test]
fn single_document_matches_shared_term() {
    let idx = index(&[("d1", "房间干净，早餐丰富")]);
    let hits = idx.search_text("早餐怎么样", 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, "d1");
    assert!(hits[0].score > 0.0);
}

#[test]
fn single_document_without_overlap_is_empty() {
    let idx = index(&[("d1", "房间干净，早餐丰富")]);
    assert!(idx.search_text("停车场收费", 10).is_empty());
}

#[test]
fn empty_tokens_yield_empty_result() {
    let idx = index(&[("d1", "房间干净")]);
    assert!(idx.search(&[], 10).is_empty());
    assert!(idx.search_text("   ", 10).is_empty());
}

#[test]
fn higher_term_frequency_and_shorter_docs_rank_first() {
    let idx = index(&[
        ("long", "早餐一般 房间很大 位置方便 服务热情 停车方便 交通便利"),
        ("short", "早餐好吃"),
        ("none", "游泳池不错"),
    ]);
    let hits = idx.search_text("早餐", 10);
    let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["short", "long"]);
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn filtered_search_skips_rejected_docs_before_truncation() {
    let idx = index(&[("a", "早餐 早餐 早餐"), ("b", "早餐 早餐"), ("c", "早餐")]);
    let hits = idx.search_filtered(&tokenize("早餐"), 1, |id| id != "a");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, "b");
}

#[test]
fn index_persists_and_reloads() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("idx/inverted_index.json");
    let idx = index(&[("d1", "安静 舒适"), ("d2", "吵闹")]);
    idx.save(&path).unwrap();
    let loaded = InvertedIndex::load(&path).unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.search_text("吵闹", 5)[0].doc_id, "d2");
    assert_eq!(loaded.params(), Bm25Params::default());
}

#[test]
fn fingerprint_tracks_ids_and_texts() {
    let idx = index(&[("a", "早餐很丰富"), ("b", "房间安静")]);
    assert_eq!(idx.fingerprint(), corpus_fingerprint([("a", "早餐很丰富"), ("b", "房间安静")]));
    assert_ne!(idx.fingerprint(), corpus_fingerprint([("a", "早餐很丰富"), ("c", "房间安静")]));
    assert_ne!(idx.fingerprint(), corpus_fingerprint([("a", "早餐很丰富"), ("b", "房间很吵")]));
}
