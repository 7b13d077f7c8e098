use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::Embedder;
use hotelrag_core::ModelError;
use hotelrag_models::sse::{self, SseFrame};
use hotelrag_models::{HashEmbedder, RetryPolicy};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[test]
fn hash_embedder_is_deterministic_and_normalized() {
    let e = HashEmbedder::new(64);
    let a = e.embed_text("早餐很丰富");
    assert_eq!(a, e.embed_text("早餐很丰富"));
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4);
}

#[test]
fn hash_embedder_prefers_token_overlap() {
    let e = HashEmbedder::new(256);
    let q = e.embed_text("早餐丰富吗");
    let near = e.embed_text("早餐丰富，种类多");
    let far = e.embed_text("停车场很远");
    assert!(cosine(&q, &near) > cosine(&q, &far));
}

#[tokio::test]
async fn hash_embedder_honours_cancellation() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = HashEmbedder::new(8).embed_batch(&["x".to_string()], &cancel).await.unwrap_err();
    assert_eq!(err, ModelError::Cancelled);
}

fn byte_chunks(parts: &[&'static str]) -> impl futures::Stream<Item = Result<&'static [u8], ModelError>> + Send + 'static {
    futures::stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
}

#[tokio::test]
async fn sse_frames_survive_events_split_across_chunks() {
    let parts = [
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\ndata: {\"choices\":[{\"del",
        "ta\":{\"content\":\"早餐\"}}]}\n\n: keep-alive\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"很好\"}}]}\n\ndata: [DONE]\n\n",
    ];
    let frames: Vec<SseFrame> = sse::frames(byte_chunks(&parts), |e| e).map(Result::unwrap).collect().await;
    assert_eq!(
        frames,
        vec![SseFrame::Fragment("早餐".into()), SseFrame::Fragment("很好".into()), SseFrame::Done]
    );
}

#[tokio::test]
async fn sse_frames_report_malformed_payloads_and_transport_errors() {
    let frames: Vec<_> = sse::frames(byte_chunks(&["data: {not json\n\n"]), |e| e).collect().await;
    assert!(matches!(frames.as_slice(), [Err(ModelError::Decode(_))]));

    let failing = futures::stream::iter(vec![Ok(&b"data: [DONE]\n\n"[..]), Err(ModelError::Timeout)]);
    let frames: Vec<_> = sse::frames(failing, |e| e).collect().await;
    assert_eq!(frames, vec![Ok(SseFrame::Done), Err(ModelError::Timeout)]);
}

#[test]
fn sse_payload_without_content_yields_nothing() {
    assert_eq!(sse::decode_data(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
    assert_eq!(sse::decode_data(" [DONE] ").unwrap(), Some(SseFrame::Done));
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy { max_retries, initial_backoff: Duration::from_millis(1), max_backoff: Duration::from_millis(2) }
}

#[tokio::test]
async fn retry_gives_up_after_max_retries_on_transient_errors() {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let result: Result<(), ModelError> = fast_policy(2)
        .run("test", &CancellationToken::new(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::Timeout)
        })
        .await;
    assert_eq!(result, Err(ModelError::Timeout));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_stops_immediately_on_permanent_errors() {
    let attempts = AtomicUsize::new(0);
    let counter = &attempts;
    let result: Result<(), ModelError> = fast_policy(5)
        .run("test", &CancellationToken::new(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ModelError::Decode("bad".into()))
        })
        .await;
    assert!(matches!(result, Err(ModelError::Decode(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retry_aborts_in_flight_attempt_on_cancel() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let result: Result<(), ModelError> = fast_policy(0)
        .run("test", &cancel, || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
    assert_eq!(result, Err(ModelError::Cancelled));
}
