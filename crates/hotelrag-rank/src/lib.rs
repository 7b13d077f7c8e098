//! hotelrag-rank
//!
//! Final evidence ordering: `w_rel * relevance + w_quality * quality + w_recency * recency`.
pub mod features;
pub mod ranker;

pub use features::{decay_rate, quality, recency, Quality};
pub use ranker::Ranker;
