//! Domain types shared by every stage of the question-answering pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub type CommentId = String;

/// A guest review: the immutable evidence unit.
///
/// Field names follow the comment store's wire format (`_id`, `comment`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id", alias = "id")]
    pub id: CommentId,
    #[serde(rename = "comment", alias = "text")]
    pub text: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub star: i32,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub fuzzy_room_type: Option<String>,
    #[serde(default)]
    pub travel_type: Option<String>,
    #[serde(default, deserialize_with = "de_publish_date")]
    pub publish_date: Option<NaiveDate>,
    #[serde(default)]
    pub useful_count: u32,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub category1: Option<String>,
    #[serde(default)]
    pub category2: Option<String>,
    #[serde(default)]
    pub category3: Option<String>,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Comment {
    /// Category tags that are present, in slot order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        [&self.category1, &self.category2, &self.category3]
            .into_iter()
            .filter_map(|c| c.as_deref())
            .filter(|c| !c.is_empty())
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories().any(|c| c == category)
    }

    pub fn matches_room(&self, constraint: Option<&RoomTypeConstraint>) -> bool {
        match constraint {
            None => true,
            Some(c) => c.matches(self.room_type.as_deref(), self.fuzzy_room_type.as_deref()),
        }
    }
}

/// Accepts `2024-05-01`, `2024-05-01T08:00:00Z`, `2024-05-01 08:00:00`, or null.
fn de_publish_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_publish_date))
}

pub fn parse_publish_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Room-type filter detected from the question. Exact types are preferred
/// over fuzzy (family-level) types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "value", rename_all = "snake_case")]
pub enum RoomTypeConstraint {
    Exact(String),
    Fuzzy(String),
}

impl RoomTypeConstraint {
    pub fn value(&self) -> &str {
        match self {
            Self::Exact(v) | Self::Fuzzy(v) => v,
        }
    }

    pub fn matches(&self, room_type: Option<&str>, fuzzy_room_type: Option<&str>) -> bool {
        match self {
            Self::Exact(v) => room_type == Some(v.as_str()),
            Self::Fuzzy(v) => fuzzy_room_type == Some(v.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSensitivity {
    #[default]
    None,
    Implied,
    Clear,
}

/// A rewritten facet of the question with its fusion weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    #[serde(alias = "query")]
    pub text: String,
    pub weight: f64,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        Self { text: text.into(), weight }
    }
}

/// Per-request intent analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub needs_retrieval: bool,
    pub room_type: Option<RoomTypeConstraint>,
    pub time_sensitivity: TimeSensitivity,
    pub sub_queries: Vec<SubQuery>,
}

impl Intent {
    /// Intent for a question that goes straight to generation.
    pub fn direct() -> Self {
        Self { needs_retrieval: false, room_type: None, time_sensitivity: TimeSensitivity::None, sub_queries: Vec::new() }
    }

    pub fn time_sensitive(&self) -> bool {
        !matches!(self.time_sensitivity, TimeSensitivity::None)
    }
}

/// One previous question/answer pair passed for continuity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTurn {
    pub user: String,
    pub assistant: String,
}

/// Identifies a retrieval route. Enabling or disabling a route is a matter of
/// listing it in the configured route list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Lexical,
    Dense,
    ReverseQuery,
    Hypothetical,
    CategorySummary,
}

impl Route {
    pub const ALL: [Route; 5] = [Route::Lexical, Route::Dense, Route::ReverseQuery, Route::Hypothetical, Route::CategorySummary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Dense => "dense",
            Self::ReverseQuery => "reverse_query",
            Self::Hypothetical => "hypothetical",
            Self::CategorySummary => "category_summary",
        }
    }

    /// Routes that search by the embedded sub-query text.
    pub fn uses_query_vector(&self) -> bool {
        matches!(self, Self::Dense | Self::ReverseQuery | Self::CategorySummary)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single hit produced by one route for one sub-query. `rank` is 1-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub doc_id: CommentId,
    pub route: Route,
    pub rank: usize,
    pub raw_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteHit {
    pub route: Route,
    pub sub_query: usize,
    pub rank: usize,
}

/// A candidate after weighted reciprocal rank fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub doc_id: CommentId,
    pub fused_score: f64,
    pub fused_rank: usize,
    pub hits: Vec<RouteHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureScores {
    pub relevance: f64,
    pub quality: f64,
    pub content_quality: f64,
    pub length: f64,
    pub review: f64,
    pub useful: f64,
    pub recency: f64,
}

/// Final evidence entry after multi-factor ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub doc_id: CommentId,
    pub relevance_score: f64,
    pub quality_score: f64,
    pub recency_score: f64,
    pub final_score: f64,
    pub relevance_rank: usize,
    pub final_rank: usize,
    pub fused_score: f64,
    pub fused_rank: usize,
    pub features: FeatureScores,
}

/// Precomputed per-topic summary of the review corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub keywords: String,
    pub summary: String,
    pub comment_count: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
}

/// A summary matched by one or more sub-queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedSummary {
    pub category: String,
    pub keywords: String,
    pub summary: String,
    pub comment_count: u32,
    pub similarity: f32,
    pub sub_queries: Vec<usize>,
}

/// A vector-search hit. `comment_id` links synthetic questions back to their
/// source comment; for the comment collection it equals `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub comment_id: CommentId,
    pub score: f32,
}
