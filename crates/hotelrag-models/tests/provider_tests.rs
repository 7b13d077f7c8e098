use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{ChatModel, ChatRequest, CommentSource, Embedder, Reranker};
use hotelrag_core::{CommentStore, ModelError};
use hotelrag_models::{OpenAiChat, ProviderClient, ProviderEmbedder, RestCommentSource, RetryPolicy, TextReranker};

type Calls = Arc<AtomicUsize>;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client() -> ProviderClient {
    let retry = RetryPolicy { max_retries: 2, initial_backoff: Duration::from_millis(1), max_backoff: Duration::from_millis(5) };
    ProviderClient::new("test-key", Duration::from_secs(5), retry).unwrap()
}

fn sse(body: &'static str) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

async fn embeddings(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
    calls.fetch_add(1, Ordering::SeqCst);
    let inputs = body["input"].as_array().cloned().unwrap_or_default();
    // reversed on purpose: clients must reorder by `index`
    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .rev()
        .map(|(i, t)| json!({"index": i, "embedding": [t.as_str().unwrap().chars().count() as f32, 1.0]}))
        .collect();
    Json(json!({ "data": data }))
}

#[tokio::test]
async fn embeddings_are_batched_and_reordered() {
    let calls: Calls = Arc::default();
    let base = serve(Router::new().route("/embeddings", post(embeddings)).with_state(calls.clone())).await;
    let embedder = ProviderEmbedder::new(client(), &base, "text-embedding-v4", 2, 2);

    let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"].iter().map(|s| s.to_string()).collect();
    let vectors = embedder.embed_batch(&texts, &CancellationToken::new()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let firsts: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
    assert_eq!(firsts, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

async fn completion(Json(body): Json<Value>) -> Json<Value> {
    let format = body["response_format"]["type"].as_str().unwrap_or("text").to_string();
    Json(json!({ "choices": [{ "message": { "content": format!("  {format}  ") } }] }))
}

#[tokio::test]
async fn completion_trims_and_requests_json_mode() {
    let base = serve(Router::new().route("/chat/completions", post(completion))).await;
    let chat = OpenAiChat::new(client(), &base, "qwen-plus");
    let cancel = CancellationToken::new();

    let plain = chat.complete(&ChatRequest::prompt("hi", 0.0), &cancel).await.unwrap();
    assert_eq!(plain, "text");
    let json_mode = chat.complete(&ChatRequest::prompt("hi", 0.0).json(), &cancel).await.unwrap();
    assert_eq!(json_mode, "json_object");
}

async fn flaky(State(calls): State<Calls>) -> Response {
    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    Json(json!({ "choices": [{ "message": { "content": "ok" } }] })).into_response()
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let calls: Calls = Arc::default();
    let base = serve(Router::new().route("/chat/completions", post(flaky)).with_state(calls.clone())).await;
    let chat = OpenAiChat::new(client(), &base, "qwen-plus");

    let out = chat.complete(&ChatRequest::prompt("hi", 0.0), &CancellationToken::new()).await.unwrap();
    assert_eq!(out, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

async fn bad_request(State(calls): State<Calls>) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::BAD_REQUEST, "bad input").into_response()
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let calls: Calls = Arc::default();
    let base = serve(Router::new().route("/chat/completions", post(bad_request)).with_state(calls.clone())).await;
    let chat = OpenAiChat::new(client(), &base, "qwen-plus");

    let err = chat.complete(&ChatRequest::prompt("hi", 0.0), &CancellationToken::new()).await.unwrap_err();
    assert_eq!(err, ModelError::Provider { status: 400, message: "bad input".into() });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

async fn streamed() -> Response {
    sse(concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"早餐\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"很丰富\"}}]}\n\n",
        "data: [DONE]\n\n",
    ))
}

#[tokio::test]
async fn stream_yields_fragments_until_done() {
    let base = serve(Router::new().route("/chat/completions", post(streamed))).await;
    let chat = OpenAiChat::new(client(), &base, "qwen-plus");

    let stream = chat.stream(&ChatRequest::prompt("hi", 0.7), &CancellationToken::new()).await.unwrap();
    let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(fragments, vec!["早餐", "很丰富"]);
}

async fn stalls_after_first_chunk() -> Response {
    let first = futures::stream::once(async {
        Ok::<_, std::io::Error>("data: {\"choices\":[{\"delta\":{\"content\":\"第一段\"}}]}\n\n".to_string())
    });
    let body = Body::from_stream(first.chain(futures::stream::pending()));
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

#[tokio::test]
async fn cancelling_stream_ends_it_without_more_fragments() {
    let base = serve(Router::new().route("/chat/completions", post(stalls_after_first_chunk))).await;
    let chat = OpenAiChat::new(client(), &base, "qwen-plus");
    let cancel = CancellationToken::new();

    let mut stream = chat.stream(&ChatRequest::prompt("hi", 0.7), &cancel).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "第一段");

    cancel.cancel();
    let after = tokio::time::timeout(Duration::from_secs(2), stream.next()).await.expect("stream must end promptly");
    assert!(after.is_none());
}

async fn rerank(Json(body): Json<Value>) -> Json<Value> {
    let n = body["input"]["documents"].as_array().map_or(0, Vec::len);
    let results: Vec<Value> = (0..n).map(|i| json!({"index": i, "relevance_score": 1.0 / (i as f64 + 1.0)})).collect();
    Json(json!({ "output": { "results": results } }))
}

#[tokio::test]
async fn rerank_scores_follow_input_order() {
    let base = serve(Router::new().route("/rerank", post(rerank))).await;
    let reranker = TextReranker::new(client(), format!("{base}/rerank"), "gte-rerank-v2");
    let docs = vec!["a".to_string(), "b".to_string()];

    let scores = reranker.rerank("q", &docs, &CancellationToken::new()).await.unwrap();
    assert_eq!(scores, vec![1.0, 0.5]);
    assert!(reranker.rerank("q", &[], &CancellationToken::new()).await.unwrap().is_empty());
}

async fn records(headers: axum::http::HeaderMap) -> Response {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some("anon") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let range = headers.get("Range").and_then(|v| v.to_str().ok()).unwrap_or("0-0");
    let (from, to) = range.split_once('-').unwrap();
    let (from, to): (usize, usize) = (from.parse().unwrap(), to.parse().unwrap());
    let rows: Vec<Value> = (from..=to.min(24)).map(|i| json!({"_id": format!("c{i}"), "comment": "不错", "publish_date": "2025-01-02T08:00:00Z"})).collect();
    (StatusCode::PARTIAL_CONTENT, Json(rows)).into_response()
}

#[tokio::test]
async fn comment_store_is_read_page_by_page() {
    let base = serve(Router::new().route("/api/database/records/comments", axum::routing::get(records))).await;
    let source = RestCommentSource::new(&base, "comments", Some("anon".into())).unwrap();
    let store = CommentStore::load_paged(&source, 10).await.unwrap();
    assert_eq!(store.len(), 25);
    assert!(store.contains("c24"));

    let anonymous = RestCommentSource::new(&base, "comments", None).unwrap();
    assert!(anonymous.fetch_page(0, 10).await.is_err());
}
