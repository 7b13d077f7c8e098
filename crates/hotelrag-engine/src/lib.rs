//! hotelrag-engine
//!
//! Orchestrates a question through intent analysis, hybrid retrieval,
//! ranking and grounded generation, either all at once or as an event stream.
pub mod engine;
pub mod events;
pub mod format;
pub mod generator;
pub mod loader;

pub use engine::{CorpusData, QueryOptions, QueryResult, RagEngine};
pub use events::{DonePayload, StageTimings, StreamEvent};
pub use format::{render_report, EvidenceItem, References, SummaryRef};
pub use generator::{GenerationContext, ResponseGenerator, NO_EVIDENCE_REPLY, RETRIEVAL_DOWN_REPLY};
pub use loader::{build_engine, load_corpus, load_or_build_index, load_store, DataPaths};
