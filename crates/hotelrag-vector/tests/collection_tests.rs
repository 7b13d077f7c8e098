use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::VectorCollection;
use hotelrag_core::types::{CategorySummary, RoomTypeConstraint};
use hotelrag_vector::search::room_filter_sql;
use hotelrag_vector::table::open_db;
use hotelrag_vector::{load_summaries, write_entries, write_summaries, InMemoryCollection, LanceCollection, VectorEntry};

const DIM: usize = 4;

fn entry(id: &str, comment_id: &str, room: Option<(&str, &str)>, vector: [f32; DIM]) -> VectorEntry {
    VectorEntry {
        id: id.into(),
        comment_id: comment_id.into(),
        room_type: room.map(|r| r.0.to_string()),
        fuzzy_room_type: room.map(|r| r.1.to_string()),
        text: format!("text for {id}"),
        vector: vector.to_vec(),
    }
}

fn sample() -> Vec<VectorEntry> {
    vec![
        entry("a", "a", Some(("花园大床房", "大床房")), [1.0, 0.0, 0.0, 0.0]),
        entry("b", "b", Some(("行政套房", "套房")), [0.9, 0.1, 0.0, 0.0]),
        entry("c", "c", None, [0.0, 1.0, 0.0, 0.0]),
        entry("q1", "b", Some(("行政套房", "套房")), [0.8, 0.2, 0.0, 0.0]),
    ]
}

#[test]
fn filter_sql_targets_the_right_column_and_escapes_quotes() {
    assert_eq!(room_filter_sql(&RoomTypeConstraint::Exact("O'Hara".into())), "room_type = 'O''Hara'");
    assert_eq!(room_filter_sql(&RoomTypeConstraint::Fuzzy("套房".into())), "fuzzy_room_type = '套房'");
}

#[tokio::test]
async fn in_memory_orders_by_cosine_and_filters() {
    let coll = InMemoryCollection::new(sample());
    let cancel = CancellationToken::new();

    let hits = coll.nearest(&[1.0, 0.0, 0.0, 0.0], 2, None, &cancel).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

    let suites = RoomTypeConstraint::Fuzzy("套房".into());
    let hits = coll.nearest(&[1.0, 0.0, 0.0, 0.0], 10, Some(&suites), &cancel).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.comment_id == "b"));
}

#[tokio::test]
async fn in_memory_refuses_cancelled_calls() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(InMemoryCollection::new(sample()).nearest(&[1.0, 0.0, 0.0, 0.0], 1, None, &cancel).await.is_err());
}

#[tokio::test]
async fn lance_round_trip_with_room_filter() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = open_db(&tmp.path().to_string_lossy()).await?;
    assert_eq!(write_entries(&conn, "comments", &sample(), DIM).await?, 4);

    let coll = LanceCollection::open(&conn, "comments").await?;
    let cancel = CancellationToken::new();
    let hits = coll.nearest(&[1.0, 0.0, 0.0, 0.0], 3, None, &cancel).await?;
    assert_eq!(hits[0].id, "a");
    assert!(hits[0].score > 0.99);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let exact = RoomTypeConstraint::Exact("行政套房".into());
    let filtered = coll.nearest(&[1.0, 0.0, 0.0, 0.0], 10, Some(&exact), &cancel).await?;
    let mut ids: Vec<&str> = filtered.iter().map(|h| h.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["b", "q1"]);
    Ok(())
}

#[tokio::test]
async fn mismatched_dimensions_are_rejected() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = open_db(&tmp.path().to_string_lossy()).await?;
    let bad = vec![VectorEntry { vector: vec![1.0; DIM + 1], ..sample().remove(0) }];
    assert!(write_entries(&conn, "comments", &bad, DIM).await.is_err());
    Ok(())
}

#[tokio::test]
async fn summaries_round_trip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let conn = open_db(&tmp.path().to_string_lossy()).await?;
    let summaries = vec![CategorySummary {
        category: "早餐".into(),
        keywords: "早餐,自助,种类".into(),
        summary: "早餐种类丰富".into(),
        comment_count: 42,
        vector: vec![0.0, 0.0, 1.0, 0.0],
    }];
    write_summaries(&conn, "summaries", &summaries, DIM).await?;
    let loaded = load_summaries(&conn, "summaries").await?;
    assert_eq!(loaded, summaries);
    Ok(())
}
