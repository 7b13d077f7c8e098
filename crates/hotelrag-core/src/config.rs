//! Configuration loader, typed settings, and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `HOTELRAG_*` env vars
//! (nested keys separated by `__`, e.g. `HOTELRAG_RETRIEVAL__RRF_K=40`).

use chrono::NaiveDate;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::Route;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Merge compiled defaults, `config.toml`, `config.<env>.toml` (both under `dir`)
    /// and `HOTELRAG_*` environment variables, later sources winning.
    pub fn load_from(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("HOTELRAG_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed settings with defaults for every missing key, validated.
    pub fn settings(&self) -> anyhow::Result<RagConfig> {
        let mut settings: RagConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        if settings.provider.api_key.is_none() {
            settings.provider.api_key = env::var("DASHSCOPE_API_KEY").ok().filter(|k| !k.is_empty());
        }
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub comment_store: CommentStoreConfig,
    pub provider: ProviderConfig,
    pub models: ModelsConfig,
    pub intent: IntentConfig,
    pub retrieval: RetrievalConfig,
    pub ranking: RankingConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON array of comments; used when no remote comment store is configured.
    pub snapshot_path: String,
    pub index_path: String,
    pub lancedb_dir: String,
    pub comments_table: String,
    pub reverse_queries_table: String,
    pub summaries_table: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "data/comments.json".into(),
            index_path: "data/inverted_index.json".into(),
            lancedb_dir: "data/lancedb".into(),
            comments_table: "comments".into(),
            reverse_queries_table: "reverse_queries".into(),
            summaries_table: "summaries".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentStoreConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub table: String,
    pub page_size: usize,
}

impl Default for CommentStoreConfig {
    fn default() -> Self {
        Self { base_url: None, api_key: None, table: "comments".into(), page_size: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    /// OpenAI-compatible base URL for chat and embeddings.
    pub base_url: String,
    pub rerank_url: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
            rerank_url: "https://dashscope.aliyuncs.com/api/v1/services/rerank/text-rerank/text-rerank".into(),
            request_timeout_ms: 30_000,
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub recognizer: String,
    pub detector: String,
    pub expander: String,
    pub hypothetical: String,
    pub generator: String,
    pub embedding: String,
    pub embedding_dimension: usize,
    pub embedding_batch_size: usize,
    pub rerank: String,
    /// Use the offline hash embedder instead of the provider (tests, demos).
    pub hash_embeddings: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            recognizer: "qwen-flash".into(),
            detector: "qwen-plus".into(),
            expander: "qwen-flash".into(),
            hypothetical: "qwen-flash".into(),
            generator: "qwen-plus-latest".into(),
            embedding: "text-embedding-v4".into(),
            embedding_dimension: 1024,
            embedding_batch_size: 10,
            rerank: "gte-rerank-v2".into(),
            hash_embeddings: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    pub exact_room_types: Vec<String>,
    pub fuzzy_room_types: Vec<String>,
    pub max_sub_queries: usize,
    pub recency_keywords: Vec<String>,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            exact_room_types: ["花园大床房", "花园双床房", "豪华大床房", "豪华双床房", "行政大床房", "行政双床房", "行政套房", "豪华套房", "家庭房"]
                .map(String::from)
                .to_vec(),
            fuzzy_room_types: ["大床房", "双床房", "套房", "家庭房"].map(String::from).to_vec(),
            max_sub_queries: 3,
            recency_keywords: ["最近", "近期", "今年", "最新", "现在", "目前", "这几个月"].map(String::from).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteWeights {
    pub lexical: f64,
    pub dense: f64,
    pub reverse_query: f64,
    pub hypothetical: f64,
    pub category_summary: f64,
}

impl Default for RouteWeights {
    fn default() -> Self {
        Self { lexical: 1.0, dense: 1.0, reverse_query: 1.0, hypothetical: 1.0, category_summary: 1.0 }
    }
}

impl RouteWeights {
    pub fn weight(&self, route: Route) -> f64 {
        match route {
            Route::Lexical => self.lexical,
            Route::Dense => self.dense,
            Route::ReverseQuery => self.reverse_query,
            Route::Hypothetical => self.hypothetical,
            Route::CategorySummary => self.category_summary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub routes: Vec<Route>,
    /// Feature flag for the hypothetical-document route.
    pub hypothetical_document: bool,
    pub route_top_k: usize,
    pub candidate_pool: usize,
    pub rrf_k: f64,
    pub route_timeout_ms: u64,
    pub route_weights: RouteWeights,
    pub bm25_k1: f64,
    pub bm25_b: f64,
    pub hypothetical_per_query: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            routes: vec![Route::Lexical, Route::Dense, Route::ReverseQuery, Route::CategorySummary],
            hypothetical_document: false,
            route_top_k: 50,
            candidate_pool: 30,
            rrf_k: 60.0,
            route_timeout_ms: 8_000,
            route_weights: RouteWeights::default(),
            bm25_k1: 1.5,
            bm25_b: 0.75,
            hypothetical_per_query: 3,
        }
    }
}

impl RetrievalConfig {
    /// Configured routes plus the hypothetical route when its flag is on.
    pub fn enabled_routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = Vec::new();
        for r in &self.routes {
            if *r == Route::Hypothetical && !self.hypothetical_document { continue; }
            if !routes.contains(r) { routes.push(*r); }
        }
        if self.hypothetical_document && !routes.contains(&Route::Hypothetical) {
            routes.push(Route::Hypothetical);
        }
        routes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub content: f64,
    pub length: f64,
    pub review: f64,
    pub useful: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self { content: 0.25, length: 0.05, review: 0.05, useful: 0.05 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub w_relevance: f64,
    pub w_quality: f64,
    pub w_recency: f64,
    pub quality: QualityWeights,
    pub half_life_days: f64,
    pub base_decay: f64,
    pub implied_boost: f64,
    pub clear_boost: f64,
    /// Reference date for recency; today when unset.
    pub as_of: Option<NaiveDate>,
    pub evidence_count: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            w_relevance: 0.4,
            w_quality: 0.4,
            w_recency: 0.2,
            quality: QualityWeights::default(),
            half_life_days: 180.0,
            base_decay: 0.5,
            implied_boost: 0.5,
            clear_boost: 0.5,
            as_of: None,
            evidence_count: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub hotel_name: String,
    pub temperature: f32,
    pub max_query_chars: usize,
    pub stream_buffer: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { hotel_name: "花园酒店".into(), temperature: 0.7, max_query_chars: 500, stream_buffer: 64 }
    }
}

impl RagConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let r = &self.ranking;
        let q = &self.retrieval;
        if r.evidence_count == 0 {
            return Err(Error::InvalidConfig("ranking.evidence_count must be positive".into()));
        }
        if q.candidate_pool < r.evidence_count {
            return Err(Error::InvalidConfig(format!(
                "retrieval.candidate_pool ({}) must be >= ranking.evidence_count ({})",
                q.candidate_pool, r.evidence_count
            )));
        }
        if q.route_top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.route_top_k must be positive".into()));
        }
        if q.enabled_routes().is_empty() {
            return Err(Error::InvalidConfig("at least one retrieval route must be enabled".into()));
        }
        if !(q.rrf_k.is_finite() && q.rrf_k >= 0.0) {
            return Err(Error::InvalidConfig("retrieval.rrf_k must be a non-negative number".into()));
        }
        let rw = &q.route_weights;
        let qw = &r.quality;
        let weights = [
            r.w_relevance, r.w_quality, r.w_recency, qw.content, qw.length, qw.review, qw.useful,
            rw.lexical, rw.dense, rw.reverse_query, rw.hypothetical, rw.category_summary,
            r.base_decay, r.implied_boost, r.clear_boost,
        ];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidConfig("weights and decay parameters must be non-negative".into()));
        }
        if !(r.half_life_days.is_finite() && r.half_life_days > 0.0) {
            return Err(Error::InvalidConfig("ranking.half_life_days must be positive".into()));
        }
        if self.generation.max_query_chars == 0 {
            return Err(Error::InvalidConfig("generation.max_query_chars must be positive".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
