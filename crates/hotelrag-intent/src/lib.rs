//! hotelrag-intent
//!
//! Question analysis ahead of retrieval: whether to retrieve at all, which
//! room type and how much recency the question implies, and which weighted
//! sub-queries to search with.
pub mod detector;
pub mod expander;
pub mod hypothetical;
mod json;
pub mod pipeline;
pub mod recognizer;

pub use detector::{Detection, IntentDetector};
pub use expander::IntentExpander;
pub use hypothetical::HypotheticalWriter;
pub use pipeline::IntentPipeline;
pub use recognizer::IntentRecognizer;
