//! hotelrag-vector
//!
//! Embedding collections: LanceDB tables for review, synthetic-question and
//! category-summary vectors, plus an in-memory collection with the same
//! search contract.
pub mod memory;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use memory::InMemoryCollection;
pub use search::{load_summaries, LanceCollection};
pub use writer::{write_entries, write_summaries, VectorEntry};
