//! Narrow seams to the external collaborators: the embedding / chat / rerank
//! provider, vector collections, and the comment store.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ModelError;
use crate::types::{Comment, RoomTypeConstraint, VectorHit};

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed_batch(&self, texts: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub json_output: bool,
}

impl ChatRequest {
    pub fn prompt(prompt: impl Into<String>, temperature: f32) -> Self {
        Self { messages: vec![ChatMessage::user(prompt)], temperature, json_output: false }
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }

    /// Concatenated message contents, handy for logging and test doubles.
    pub fn text(&self) -> String {
        self.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n")
    }
}

pub type FragmentStream = BoxStream<'static, Result<String, ModelError>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<String, ModelError>;

    /// Incremental text fragments. The stream ends early, without error, once
    /// `cancel` fires; the underlying connection is dropped at that point.
    async fn stream(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<FragmentStream, ModelError>;
}

/// Cross-encoder relevance scoring. Returns one score per document, in input order.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String], cancel: &CancellationToken) -> Result<Vec<f64>, ModelError>;
}

/// Nearest-neighbour search over a precomputed embedding collection.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    async fn nearest(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&RoomTypeConstraint>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<VectorHit>>;
}

/// Paged read-only access to the comment store.
#[async_trait]
pub trait CommentSource: Send + Sync {
    async fn fetch_page(&self, offset: usize, limit: usize) -> anyhow::Result<Vec<Comment>>;
}
