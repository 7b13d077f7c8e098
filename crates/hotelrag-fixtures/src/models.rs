use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{ChatModel, ChatRequest, Embedder, FragmentStream, Reranker, VectorCollection};
use hotelrag_core::types::{RoomTypeConstraint, VectorHit};
use hotelrag_core::ModelError;

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(ModelError),
}

/// Chat model answering from a list of (needle, reply) rules matched against
/// the request text; the first matching rule wins.
pub struct ScriptedChat {
    rules: Vec<(String, Reply)>,
    fallback: Reply,
    fragment_chars: usize,
    fragment_delay: Duration,
    fail_stream_after: Option<usize>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            fallback: Reply::Text(fallback.into()),
            fragment_chars: 4,
            fragment_delay: Duration::ZERO,
            fail_stream_after: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ModelError) -> Self {
        Self { fallback: Reply::Fail(error), ..Self::new("") }
    }

    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(reply.into())));
        self
    }

    pub fn fail_on(mut self, needle: impl Into<String>, error: ModelError) -> Self {
        self.rules.push((needle.into(), Reply::Fail(error)));
        self
    }

    /// Stream replies in fragments of `chars` characters, pausing `delay` before each.
    pub fn fragments(mut self, chars: usize, delay: Duration) -> Self {
        self.fragment_chars = chars.max(1);
        self.fragment_delay = delay;
        self
    }

    /// Streams emit `n` fragments, then a transport error.
    pub fn fail_stream_after(mut self, n: usize) -> Self {
        self.fail_stream_after = Some(n);
        self
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn reply(&self, request: &ChatRequest) -> Result<String, ModelError> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        let text = request.text();
        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map_or(&self.fallback, |(_, r)| r);
        match reply {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Fail(e) => Err(e.clone()),
        }
    }
}

struct ScriptState {
    pieces: std::vec::IntoIter<String>,
    emitted: usize,
    fail_after: Option<usize>,
    delay: Duration,
    cancel: CancellationToken,
    done: bool,
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<String, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        self.reply(request)
    }

    async fn stream(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<FragmentStream, ModelError> {
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        let text = self.reply(request)?;
        let chars: Vec<char> = text.chars().collect();
        let pieces: Vec<String> = chars.chunks(self.fragment_chars).map(|c| c.iter().collect()).collect();
        let state = ScriptState {
            pieces: pieces.into_iter(),
            emitted: 0,
            fail_after: self.fail_stream_after,
            delay: self.fragment_delay,
            cancel: cancel.clone(),
            done: false,
        };
        let stream = futures::stream::unfold(state, |mut st| async move {
            if st.done || st.cancel.is_cancelled() {
                return None;
            }
            if st.fail_after.is_some_and(|n| st.emitted >= n) {
                st.done = true;
                return Some((Err(ModelError::Transport("stream reset by peer".into())), st));
            }
            if !st.delay.is_zero() {
                tokio::select! {
                    _ = st.cancel.cancelled() => return None,
                    _ = tokio::time::sleep(st.delay) => {}
                }
            }
            let piece = st.pieces.next()?;
            st.emitted += 1;
            Some((Ok(piece), st))
        });
        Ok(stream.boxed())
    }
}

/// Reranker backed by a scoring closure, or failing outright.
pub struct FnReranker {
    score: Option<Box<dyn Fn(&str, &str) -> f64 + Send + Sync>>,
    calls: Mutex<usize>,
}

impl FnReranker {
    pub fn new(score: impl Fn(&str, &str) -> f64 + Send + Sync + 'static) -> Self {
        Self { score: Some(Box::new(score)), calls: Mutex::new(0) }
    }

    /// Scores by the share of the query's characters found in the document.
    pub fn char_overlap() -> Self {
        Self::new(|query, doc| {
            let chars: Vec<char> = query.chars().filter(|c| c.is_alphanumeric()).collect();
            if chars.is_empty() {
                return 0.0;
            }
            chars.iter().filter(|c| doc.contains(**c)).count() as f64 / chars.len() as f64
        })
    }

    pub fn failing() -> Self {
        Self { score: None, calls: Mutex::new(0) }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Reranker for FnReranker {
    async fn rerank(&self, query: &str, documents: &[String], cancel: &CancellationToken) -> Result<Vec<f64>, ModelError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if cancel.is_cancelled() {
            return Err(ModelError::Cancelled);
        }
        match &self.score {
            Some(f) => Ok(documents.iter().map(|d| f(query, d)).collect()),
            None => Err(ModelError::Provider { status: 500, message: "rerank unavailable".into() }),
        }
    }
}

pub struct FailingEmbedder {
    pub dim: usize,
    pub error: ModelError,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dim(&self) -> usize { self.dim }

    async fn embed_batch(&self, _texts: &[String], _cancel: &CancellationToken) -> Result<Vec<Vec<f32>>, ModelError> {
        Err(self.error.clone())
    }
}

/// Never answers until cancelled; exercises route timeouts.
pub struct StallingCollection;

#[async_trait]
impl VectorCollection for StallingCollection {
    async fn nearest(
        &self,
        _vector: &[f32],
        _k: usize,
        _filter: Option<&RoomTypeConstraint>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Vec<VectorHit>> {
        cancel.cancelled().await;
        anyhow::bail!("stalled search cancelled")
    }
}
