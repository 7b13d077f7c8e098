use std::sync::Arc;

use anyhow::Result;

use hotelrag_core::config::RagConfig;
use hotelrag_core::traits::{ChatModel, Embedder, Reranker};

use crate::chat::OpenAiChat;
use crate::embedding::ProviderEmbedder;
use crate::hash::HashEmbedder;
use crate::http::ProviderClient;
use crate::rerank::TextReranker;

/// One handle per model role, built once at startup and shared by requests.
#[derive(Clone)]
pub struct ModelClients {
    pub recognizer: Arc<dyn ChatModel>,
    pub detector: Arc<dyn ChatModel>,
    pub expander: Arc<dyn ChatModel>,
    pub hypothetical: Arc<dyn ChatModel>,
    pub generator: Arc<dyn ChatModel>,
    pub embedder: Arc<dyn Embedder>,
    pub reranker: Arc<dyn Reranker>,
}

impl ModelClients {
    pub fn from_config(cfg: &RagConfig) -> Result<Self> {
        let client = ProviderClient::from_config(&cfg.provider)?;
        let base = cfg.provider.base_url.as_str();
        let models = &cfg.models;
        let chat = |model: &str| -> Arc<dyn ChatModel> { Arc::new(OpenAiChat::new(client.clone(), base, model)) };

        let embedder: Arc<dyn Embedder> = if models.hash_embeddings {
            tracing::warn!(dim = models.embedding_dimension, "using offline hash embeddings");
            Arc::new(HashEmbedder::new(models.embedding_dimension))
        } else {
            Arc::new(ProviderEmbedder::new(
                client.clone(),
                base,
                models.embedding.clone(),
                models.embedding_dimension,
                models.embedding_batch_size,
            ))
        };

        Ok(Self {
            recognizer: chat(&models.recognizer),
            detector: chat(&models.detector),
            expander: chat(&models.expander),
            hypothetical: chat(&models.hypothetical),
            generator: chat(&models.generator),
            embedder,
            reranker: Arc::new(TextReranker::new(client.clone(), cfg.provider.rerank_url.clone(), models.rerank.clone())),
        })
    }
}

/// Embedder for offline tooling: the hash embedder when configured, otherwise
/// the provider's embedding endpoint.
pub fn embedder_from_config(cfg: &RagConfig) -> Result<Arc<dyn Embedder>> {
    if cfg.models.hash_embeddings {
        return Ok(Arc::new(HashEmbedder::new(cfg.models.embedding_dimension)));
    }
    let client = ProviderClient::from_config(&cfg.provider)?;
    Ok(Arc::new(ProviderEmbedder::new(
        client,
        &cfg.provider.base_url,
        cfg.models.embedding.clone(),
        cfg.models.embedding_dimension,
        cfg.models.embedding_batch_size,
    )))
}
