//! Multi-route retrieval fused with weighted Reciprocal Rank Fusion.

pub mod fusion;
pub mod retriever;
pub mod routes;

pub use fusion::{dedupe_best_rank, fuse, RankedList};
pub use retriever::{HybridRetriever, RetrievalOutcome, RouteReport, RouteStatus};
pub use routes::{Retrieve, RetrievalSources, RouteOutput, RouteScope};
