use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use twox_hash::XxHash64;

use hotelrag_core::types::{Comment, CommentId};

use crate::tokenizer::{tokenize, TOKENIZER_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub doc_id: CommentId,
    pub score: f64,
}

/// term -> postings (document slot, term frequency), with per-document lengths.
///
/// Immutable once built; concurrent readers need no synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvertedIndex {
    tokenizer_version: u32,
    /// Hash of the (id, text) pairs the index was built from.
    #[serde(default)]
    fingerprint: u64,
    params: Bm25Params,
    doc_ids: Vec<CommentId>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f64,
    postings: HashMap<String, Vec<(u32, u32)>>,
}

/// Order-sensitive hash over document ids and texts.
pub fn corpus_fingerprint<'a>(docs: impl IntoIterator<Item = (&'a str, &'a str)>) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    for (id, text) in docs {
        id.hash(&mut hasher);
        text.hash(&mut hasher);
    }
    hasher.finish()
}

impl InvertedIndex {
    pub fn build<'a>(comments: impl IntoIterator<Item = &'a Comment>, params: Bm25Params) -> Self {
        Self::build_from_texts(comments.into_iter().map(|c| (c.id.as_str(), c.text.as_str())), params)
    }

    pub fn build_from_texts<'a>(docs: impl IntoIterator<Item = (&'a str, &'a str)>, params: Bm25Params) -> Self {
        let mut doc_ids = Vec::new();
        let mut doc_lengths = Vec::new();
        let mut postings: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
        let mut hasher = XxHash64::with_seed(0);

        for (slot, (id, text)) in docs.into_iter().enumerate() {
            id.hash(&mut hasher);
            text.hash(&mut hasher);
            let tokens = tokenize(text);
            let mut tf: BTreeMap<String, u32> = BTreeMap::new();
            for t in &tokens {
                *tf.entry(t.clone()).or_default() += 1;
            }
            for (term, freq) in tf {
                postings.entry(term).or_default().push((slot as u32, freq));
            }
            doc_ids.push(id.to_string());
            doc_lengths.push(tokens.len() as u32);
        }

        let total: u64 = doc_lengths.iter().map(|&l| u64::from(l)).sum();
        let avg_doc_length = if doc_ids.is_empty() { 0.0 } else { total as f64 / doc_ids.len() as f64 };
        tracing::info!(docs = doc_ids.len(), terms = postings.len(), avg_doc_length, "built inverted index");

        Self {
            tokenizer_version: TOKENIZER_VERSION,
            fingerprint: hasher.finish(),
            params,
            doc_ids,
            doc_lengths,
            avg_doc_length,
            postings,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(self)?).with_context(|| format!("writing index {}", path.display()))
    }

    /// Load a persisted index. Fails when the index was built by a different tokenizer.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).with_context(|| format!("reading index {}", path.display()))?;
        let index: Self = serde_json::from_slice(&raw).with_context(|| format!("parsing index {}", path.display()))?;
        if index.tokenizer_version != TOKENIZER_VERSION {
            bail!(
                "index {} was built with tokenizer v{} (current v{})",
                path.display(),
                index.tokenizer_version,
                TOKENIZER_VERSION
            );
        }
        Ok(index)
    }

    pub fn with_params(mut self, params: Bm25Params) -> Self {
        self.params = params;
        self
    }

    pub fn len(&self) -> usize { self.doc_ids.len() }

    pub fn fingerprint(&self) -> u64 { self.fingerprint }

    /// True when the index was built from exactly these comments, in this order.
    pub fn is_built_from<'a>(&self, comments: impl IntoIterator<Item = &'a Comment>) -> bool {
        self.fingerprint == corpus_fingerprint(comments.into_iter().map(|c| (c.id.as_str(), c.text.as_str())))
    }

    pub fn is_empty(&self) -> bool { self.doc_ids.is_empty() }

    pub fn vocabulary_size(&self) -> usize { self.postings.len() }

    pub fn params(&self) -> Bm25Params { self.params }

    /// Always positive, so a single shared term never scores zero.
    fn idf(&self, doc_freq: usize) -> f64 {
        let n = self.doc_ids.len() as f64;
        let df = doc_freq as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    pub fn search(&self, tokens: &[String], top_k: usize) -> Vec<LexicalHit> {
        self.search_filtered(tokens, top_k, |_| true)
    }

    pub fn search_text(&self, query: &str, top_k: usize) -> Vec<LexicalHit> {
        self.search(&tokenize(query), top_k)
    }

    /// BM25 top-k restricted to documents accepted by `keep`. Ties are broken by id.
    pub fn search_filtered(&self, tokens: &[String], top_k: usize, keep: impl Fn(&str) -> bool) -> Vec<LexicalHit> {
        if tokens.is_empty() || top_k == 0 || self.doc_ids.is_empty() {
            return Vec::new();
        }
        let Bm25Params { k1, b } = self.params;
        let avgdl = if self.avg_doc_length > 0.0 { self.avg_doc_length } else { 1.0 };

        let mut query_terms: Vec<&str> = tokens.iter().map(String::as_str).collect();
        query_terms.sort_unstable();
        query_terms.dedup();

        let mut scores: HashMap<u32, f64> = HashMap::new();
        for term in query_terms {
            let Some(list) = self.postings.get(term) else { continue };
            let idf = self.idf(list.len());
            for &(slot, tf) in list {
                let tf = f64::from(tf);
                let dl = f64::from(self.doc_lengths[slot as usize]);
                let norm = tf * (k1 + 1.0) / (tf + k1 * (1.0 - b + b * dl / avgdl));
                *scores.entry(slot).or_default() += idf * norm;
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .map(|(slot, score)| LexicalHit { doc_id: self.doc_ids[slot as usize].clone(), score })
            .filter(|h| keep(&h.doc_id))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
        hits.truncate(top_k);
        hits
    }
}
