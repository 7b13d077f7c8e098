//! HTTP surface: `POST /chat` (Server-Sent Events or one JSON document) and
//! `GET /health`, also mounted under `/api/v1`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use hotelrag_core::types::PriorTurn;
use hotelrag_core::Error;
use hotelrag_engine::{QueryOptions, RagEngine};

/// Shared handler state. The engine is published once, after background
/// loading finishes; until then `/chat` answers 503.
#[derive(Clone, Default)]
pub struct AppState {
    engine: Arc<OnceCell<Arc<RagEngine>>>,
}

impl AppState {
    pub fn new() -> Self { Self::default() }

    pub fn ready(engine: Arc<RagEngine>) -> Self {
        let state = Self::new();
        state.publish(engine);
        state
    }

    /// Returns false when an engine was already published.
    pub fn publish(&self, engine: Arc<RagEngine>) -> bool {
        self.engine.set(engine).is_ok()
    }

    pub fn engine(&self) -> Result<Arc<RagEngine>, Error> {
        self.engine.get().cloned().ok_or_else(|| Error::NotReady("engine is still loading".into()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    #[serde(alias = "enable_generation")]
    pub enable_generation: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default)]
    pub history: Option<PriorTurn>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new().route("/chat", post(chat)).route("/health", get(health));
    Router::new().merge(api.clone()).nest("/api/v1", api).with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": state.engine().is_ok(),
    }))
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "detail": message.into() }))).into_response()
}

fn error_response(e: &Error) -> Response {
    match e {
        Error::Validation(m) => detail(StatusCode::BAD_REQUEST, m.clone()),
        Error::NotReady(m) => detail(StatusCode::SERVICE_UNAVAILABLE, m.clone()),
        other => detail(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Cancels the request pipeline when the response body is dropped, which
/// is what happens when the client disconnects.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    if body.query.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, "query must not be empty");
    }
    let engine = match state.engine() {
        Ok(engine) => engine,
        Err(e) => return error_response(&e),
    };
    let options = QueryOptions { enable_generation: body.options.enable_generation.unwrap_or(true) };

    if !options.enable_generation {
        let cancel = CancellationToken::new();
        let _guard = CancelOnDrop(cancel.clone());
        return match engine.query(&body.query, body.history.as_ref(), options, &cancel).await {
            Ok(result) => Json(json!({ "references": result.references, "timing": result.timing })).into_response(),
            Err(e) => error_response(&e),
        };
    }

    let cancel = CancellationToken::new();
    let rx = match engine.query_stream(&body.query, body.history, options, cancel.clone()) {
        Ok(rx) => rx,
        Err(e) => return error_response(&e),
    };
    let events = futures::stream::unfold((rx, CancelOnDrop(cancel)), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|e| json!({ "type": "error", "message": e.to_string() }).to_string());
        Some((Ok::<_, Infallible>(Event::default().data(data)), (rx, guard)))
    });
    (
        [(header::CACHE_CONTROL, "no-cache"), (header::HeaderName::from_static("x-accel-buffering"), "no")],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
        .into_response()
}
