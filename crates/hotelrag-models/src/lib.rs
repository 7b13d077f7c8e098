//! hotelrag-models
//!
//! Clients for the hosted model provider (OpenAI-compatible chat and
//! embeddings, native text rerank), an offline hash embedder, and the paged
//! comment-store reader. Every model call takes a cancellation token and
//! drops its in-flight request when it fires.
pub mod chat;
pub mod embedding;
pub mod hash;
pub mod http;
pub mod registry;
pub mod rerank;
pub mod retry;
pub mod sse;
pub mod store;

pub use chat::OpenAiChat;
pub use embedding::ProviderEmbedder;
pub use hash::HashEmbedder;
pub use http::ProviderClient;
pub use registry::ModelClients;
pub use rerank::TextReranker;
pub use retry::RetryPolicy;
pub use store::RestCommentSource;
