//! hotelrag-text
//!
//! Lexical side of retrieval: a tantivy analyzer that understands mixed
//! Chinese/latin review text, and an Okapi BM25 inverted index over the
//! comment snapshot.
pub mod index;
pub mod tokenizer;

pub use index::{corpus_fingerprint, Bm25Params, InvertedIndex, LexicalHit};
pub use tokenizer::{review_analyzer, tokenize, HanBigramTokenizer, TOKENIZER_VERSION};
