use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{env, fs};

use anyhow::{bail, Context};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::{Config, RagConfig};
use hotelrag_core::traits::Embedder;
use hotelrag_core::types::{CategorySummary, Comment};
use hotelrag_core::CommentStore;
use hotelrag_engine::{load_store, DataPaths};
use hotelrag_models::registry::embedder_from_config;
use hotelrag_text::{Bm25Params, InvertedIndex};
use hotelrag_vector::table::open_db;
use hotelrag_vector::{write_entries, write_summaries, VectorEntry};

const EMBED_CHUNK: usize = 256;

/// One precomputed synthetic question pointing at its source comment.
#[derive(Deserialize)]
struct ReverseQuery {
    comment_id: String,
    query: String,
}

#[derive(Deserialize)]
struct SummaryRecord {
    category: String,
    #[serde(default)]
    keywords: String,
    summary: String,
    #[serde(default)]
    comment_count: u32,
}

async fn embed_all(embedder: &Arc<dyn Embedder>, texts: &[String], label: &str) -> anyhow::Result<Vec<Vec<f32>>> {
    let pb = ProgressBar::new(texts.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} embedded {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(label.to_string());
    let cancel = CancellationToken::new();
    let mut out = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(EMBED_CHUNK) {
        out.extend(embedder.embed_batch(chunk, &cancel).await?);
        pb.inc(chunk.len() as u64);
    }
    pb.finish();
    Ok(out)
}

/// Tables live in `<dir>/<name>.lance`; a rewrite starts from an empty table.
fn reset_table(lancedb: &Path, name: &str) -> anyhow::Result<()> {
    let dir = lancedb.join(format!("{name}.lance"));
    if dir.exists() {
        fs::remove_dir_all(&dir).with_context(|| format!("removing {}", dir.display()))?;
    }
    Ok(())
}

async fn embed_comments(cfg: &RagConfig, store: &CommentStore, lancedb: &Path, embedder: &Arc<dyn Embedder>) -> anyhow::Result<usize> {
    let comments: Vec<&Comment> = store.iter().collect();
    let texts: Vec<String> = comments.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_all(embedder, &texts, "comments").await?;
    let entries: Vec<VectorEntry> = comments
        .iter()
        .zip(vectors)
        .map(|(c, vector)| VectorEntry {
            id: c.id.clone(),
            comment_id: c.id.clone(),
            room_type: c.room_type.clone(),
            fuzzy_room_type: c.fuzzy_room_type.clone(),
            text: c.text.clone(),
            vector,
        })
        .collect();
    reset_table(lancedb, &cfg.data.comments_table)?;
    let conn = open_db(&lancedb.to_string_lossy()).await?;
    write_entries(&conn, &cfg.data.comments_table, &entries, embedder.dim()).await
}

async fn import_reverse_queries(cfg: &RagConfig, store: &CommentStore, path: &Path, lancedb: &Path, embedder: &Arc<dyn Embedder>) -> anyhow::Result<usize> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let queries: Vec<ReverseQuery> = serde_json::from_str(&raw)?;
    let known: Vec<(&ReverseQuery, &Comment)> =
        queries.iter().filter_map(|q| store.get(&q.comment_id).map(|c| (q, c))).collect();
    if known.len() < queries.len() {
        println!("⚠️  Skipping {} questions whose comment is not in the snapshot", queries.len() - known.len());
    }
    let texts: Vec<String> = known.iter().map(|(q, _)| q.query.clone()).collect();
    let vectors = embed_all(embedder, &texts, "reverse queries").await?;
    let entries: Vec<VectorEntry> = known
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, ((q, c), vector))| VectorEntry {
            id: format!("{}-{}", q.comment_id, i),
            comment_id: q.comment_id.clone(),
            room_type: c.room_type.clone(),
            fuzzy_room_type: c.fuzzy_room_type.clone(),
            text: q.query.clone(),
            vector,
        })
        .collect();
    reset_table(lancedb, &cfg.data.reverse_queries_table)?;
    let conn = open_db(&lancedb.to_string_lossy()).await?;
    write_entries(&conn, &cfg.data.reverse_queries_table, &entries, embedder.dim()).await
}

async fn import_summaries(cfg: &RagConfig, path: &Path, lancedb: &Path, embedder: &Arc<dyn Embedder>) -> anyhow::Result<usize> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let records: Vec<SummaryRecord> = serde_json::from_str(&raw)?;
    let texts: Vec<String> = records.iter().map(|r| format!("{} {}", r.keywords, r.summary)).collect();
    let vectors = embed_all(embedder, &texts, "summaries").await?;
    let summaries: Vec<CategorySummary> = records
        .into_iter()
        .zip(vectors)
        .map(|(r, vector)| CategorySummary {
            category: r.category,
            keywords: r.keywords,
            summary: r.summary,
            comment_count: r.comment_count,
            vector,
        })
        .collect();
    reset_table(lancedb, &cfg.data.summaries_table)?;
    let conn = open_db(&lancedb.to_string_lossy()).await?;
    write_summaries(&conn, &cfg.data.summaries_table, &summaries, embedder.dim()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let cfg = config.settings()?;

    let args: Vec<String> = env::args().skip(1).collect();
    let mut embed = false;
    let mut reverse: Option<PathBuf> = None;
    let mut summaries: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--embed" | "-e" => embed = true,
            "--reverse-queries" | "--summaries" => {
                let Some(path) = args.get(i + 1) else { bail!("{} requires a path", args[i]) };
                if args[i] == "--summaries" { summaries = Some(PathBuf::from(path)); } else { reverse = Some(PathBuf::from(path)); }
                i += 1;
            }
            other => bail!("unknown argument: {other}\nusage: hotelrag-indexer [--embed] [--reverse-queries FILE] [--summaries FILE]"),
        }
        i += 1;
    }

    let base = env::current_dir()?;
    let paths = DataPaths::resolve(&cfg, &base);
    println!("Hotel review indexer\n====================");
    let store = load_store(&cfg, &paths).await?;
    println!("📄 Loaded {} comments", store.len());

    let index = InvertedIndex::build(store.iter(), Bm25Params { k1: cfg.retrieval.bm25_k1, b: cfg.retrieval.bm25_b });
    if let Some(dir) = paths.index.parent() {
        fs::create_dir_all(dir)?;
    }
    index.save(&paths.index)?;
    println!("📊 BM25 index: {} docs, {} terms -> {}", index.len(), index.vocabulary_size(), paths.index.display());

    if embed || reverse.is_some() || summaries.is_some() {
        fs::create_dir_all(&paths.lancedb)?;
        let embedder = embedder_from_config(&cfg)?;
        if embed {
            let n = embed_comments(&cfg, &store, &paths.lancedb, &embedder).await?;
            println!("🧭 Wrote {} comment vectors to '{}'", n, cfg.data.comments_table);
        }
        if let Some(path) = &reverse {
            let n = import_reverse_queries(&cfg, &store, path, &paths.lancedb, &embedder).await?;
            println!("🔁 Wrote {} reverse-query vectors to '{}'", n, cfg.data.reverse_queries_table);
        }
        if let Some(path) = &summaries {
            let n = import_summaries(&cfg, path, &paths.lancedb, &embedder).await?;
            println!("📚 Wrote {} category summaries to '{}'", n, cfg.data.summaries_table);
        }
    } else {
        println!("⚠️  Skipping vector tables (pass --embed to write comment embeddings)");
    }

    println!("\n✅ Indexing completed successfully!");
    println!("💡 To ask a question, use: cargo run --bin hotelrag-ask '<question>'");
    Ok(())
}
