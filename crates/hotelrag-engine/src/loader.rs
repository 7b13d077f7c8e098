//! Startup loading: comment snapshot, BM25 index, vector collections and the
//! summary cache, then engine assembly.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use hotelrag_core::config::{resolve_with_base, RagConfig};
use hotelrag_core::traits::VectorCollection;
use hotelrag_core::CommentStore;
use hotelrag_models::{ModelClients, RestCommentSource};
use hotelrag_text::{Bm25Params, InvertedIndex, TOKENIZER_VERSION};
use hotelrag_vector::table::{open_db, table_exists};
use hotelrag_vector::{load_summaries, InMemoryCollection, LanceCollection};

use crate::engine::{CorpusData, RagEngine};

/// Resolved data locations; relative paths are taken from `base`.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub snapshot: PathBuf,
    pub index: PathBuf,
    pub lancedb: PathBuf,
}

impl DataPaths {
    pub fn resolve(cfg: &RagConfig, base: &Path) -> Self {
        Self {
            snapshot: resolve_with_base(base, &cfg.data.snapshot_path),
            index: resolve_with_base(base, &cfg.data.index_path),
            lancedb: resolve_with_base(base, &cfg.data.lancedb_dir),
        }
    }
}

/// Remote store when configured (the fetched snapshot is written back to
/// disk), otherwise the local snapshot file.
pub async fn load_store(cfg: &RagConfig, paths: &DataPaths) -> Result<CommentStore> {
    if let Some(source) = RestCommentSource::from_config(&cfg.comment_store)? {
        tracing::info!(url = source.url(), "fetching comments from store");
        let store = CommentStore::load_paged(&source, cfg.comment_store.page_size).await?;
        if let Some(dir) = paths.snapshot.parent() {
            std::fs::create_dir_all(dir)?;
        }
        store.save_json(&paths.snapshot)?;
        return Ok(store);
    }
    CommentStore::load_json(&paths.snapshot)
        .with_context(|| format!("loading comment snapshot {}", paths.snapshot.display()))
}

/// Loads the saved index when it was built from this exact snapshot, otherwise
/// builds and saves a fresh one.
pub fn load_or_build_index(cfg: &RagConfig, store: &CommentStore, path: &Path) -> Result<InvertedIndex> {
    let params = Bm25Params { k1: cfg.retrieval.bm25_k1, b: cfg.retrieval.bm25_b };
    if path.exists() {
        match InvertedIndex::load(path) {
            Ok(index) if index.is_built_from(store.iter()) => return Ok(index.with_params(params)),
            Ok(index) => tracing::info!(indexed = index.len(), comments = store.len(), "index is stale; rebuilding"),
            Err(e) => tracing::warn!(error = %e, version = TOKENIZER_VERSION, "could not load index; rebuilding"),
        }
    }
    let index = InvertedIndex::build(store.iter(), params);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    index.save(path)?;
    tracing::info!(docs = index.len(), terms = index.vocabulary_size(), path = %path.display(), "built BM25 index");
    Ok(index)
}

async fn collection(conn: &lancedb::Connection, name: &str) -> Result<Arc<dyn VectorCollection>> {
    if table_exists(conn, name).await? {
        return Ok(Arc::new(LanceCollection::open(conn, name).await?));
    }
    tracing::warn!(table = name, "vector table missing; route will return nothing");
    Ok(Arc::new(InMemoryCollection::default()))
}

pub async fn load_corpus(cfg: &RagConfig, base: &Path) -> Result<CorpusData> {
    let paths = DataPaths::resolve(cfg, base);
    let store = load_store(cfg, &paths).await?;
    let index = load_or_build_index(cfg, &store, &paths.index)?;

    let uri = paths.lancedb.to_string_lossy().to_string();
    let conn = open_db(&uri).await?;
    let comments = collection(&conn, &cfg.data.comments_table).await?;
    let reverse_queries = collection(&conn, &cfg.data.reverse_queries_table).await?;
    let summaries = if table_exists(&conn, &cfg.data.summaries_table).await? {
        load_summaries(&conn, &cfg.data.summaries_table).await?
    } else {
        tracing::warn!(table = %cfg.data.summaries_table, "summary table missing");
        Vec::new()
    };
    tracing::info!(comments = store.len(), summaries = summaries.len(), "corpus loaded");

    Ok(CorpusData {
        index: Arc::new(index),
        store: Arc::new(store),
        comments,
        reverse_queries,
        summaries: Arc::new(summaries),
    })
}

/// Everything the server needs before it can answer.
pub async fn build_engine(cfg: &RagConfig, base: &Path) -> Result<RagEngine> {
    let clients = ModelClients::from_config(cfg)?;
    let corpus = load_corpus(cfg, base).await?;
    Ok(RagEngine::assemble(clients, corpus, cfg))
}
