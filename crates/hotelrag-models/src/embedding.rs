use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::Embedder;
use hotelrag_core::ModelError;

use crate::http::ProviderClient;

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint, sent in
/// provider-sized batches.
#[derive(Clone)]
pub struct ProviderEmbedder {
    client: ProviderClient,
    endpoint: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl ProviderEmbedder {
    pub fn new(client: ProviderClient, base_url: &str, model: impl Into<String>, dimension: usize, batch_size: usize) -> Self {
        Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.into(),
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    async fn embed_chunk(&self, texts: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>, ModelError> {
        let body = EmbedRequest { model: &self.model, input: texts, dimensions: self.dimension, encoding_format: "float" };
        let mut resp: EmbedResponse = self.client.post_json(&self.endpoint, &body, cancel).await?;
        if resp.data.len() != texts.len() {
            return Err(ModelError::Decode(format!("expected {} embeddings, got {}", texts.len(), resp.data.len())));
        }
        resp.data.sort_by_key(|d| d.index);
        resp.data
            .into_iter()
            .map(|d| {
                if d.embedding.len() == self.dimension {
                    Ok(d.embedding)
                } else {
                    Err(ModelError::Decode(format!("embedding has {} dims, expected {}", d.embedding.len(), self.dimension)))
                }
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn dim(&self) -> usize { self.dimension }

    async fn embed_batch(&self, texts: &[String], cancel: &CancellationToken) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            out.extend(self.embed_chunk(chunk, cancel).await?);
        }
        Ok(out)
    }
}
