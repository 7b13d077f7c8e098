use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::Reranker;
use hotelrag_core::ModelError;

use crate::http::ProviderClient;

/// Cross-encoder scoring through the provider's native text-rerank service.
#[derive(Clone)]
pub struct TextReranker {
    client: ProviderClient,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    input: RerankInput<'a>,
    parameters: RerankParameters,
}

#[derive(Serialize)]
struct RerankInput<'a> {
    query: &'a str,
    documents: &'a [String],
}

#[derive(Serialize)]
struct RerankParameters {
    return_documents: bool,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    output: RerankOutput,
}

#[derive(Deserialize)]
struct RerankOutput {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

impl TextReranker {
    pub fn new(client: ProviderClient, endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client, endpoint: endpoint.into(), model: model.into() }
    }
}

#[async_trait]
impl Reranker for TextReranker {
    async fn rerank(&self, query: &str, documents: &[String], cancel: &CancellationToken) -> Result<Vec<f64>, ModelError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = RerankRequest {
            model: &self.model,
            input: RerankInput { query, documents },
            parameters: RerankParameters { return_documents: false, top_n: documents.len() },
        };
        let resp: RerankResponse = self.client.post_json(&self.endpoint, &body, cancel).await?;
        let mut scores = vec![0.0; documents.len()];
        for r in resp.output.results {
            match scores.get_mut(r.index) {
                Some(slot) => *slot = r.relevance_score,
                None => return Err(ModelError::Decode(format!("rerank index {} out of range", r.index))),
            }
        }
        Ok(scores)
    }
}
