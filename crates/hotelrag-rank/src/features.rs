//! Query-independent evidence features: review quality and recency.

use chrono::NaiveDate;

use hotelrag_core::config::{QualityWeights, RankingConfig};
use hotelrag_core::types::{Comment, TimeSensitivity};

// ln(x + 1) reaches 1.0 at roughly 1800 characters, 550 replies and 37 useful votes.
const LENGTH_NORM: f64 = 7.51;
const REVIEW_NORM: f64 = 6.32;
const USEFUL_NORM: f64 = 3.64;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Quality {
    pub blended: f64,
    pub content: f64,
    pub length: f64,
    pub review: f64,
    pub useful: f64,
}

fn unit(x: f64) -> f64 {
    if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
}

fn log_norm(count: f64, norm: f64) -> f64 {
    unit((count + 1.0).ln() / norm)
}

pub fn quality(comment: &Comment, w: &QualityWeights) -> Quality {
    let content = unit(comment.quality_score / 10.0);
    let length = log_norm(comment.text.chars().count() as f64, LENGTH_NORM);
    let review = log_norm(f64::from(comment.review_count), REVIEW_NORM);
    let useful = log_norm(f64::from(comment.useful_count), USEFUL_NORM);
    let total = w.content + w.length + w.review + w.useful;
    let blended = if total > 0.0 {
        (w.content * content + w.length * length + w.review * review + w.useful * useful) / total
    } else {
        0.0
    };
    Quality { blended: unit(blended), content, length, review, useful }
}

/// Decay rate multiplier; time-sensitive questions age evidence faster.
pub fn decay_rate(sensitivity: TimeSensitivity, cfg: &RankingConfig) -> f64 {
    match sensitivity {
        TimeSensitivity::None => cfg.base_decay,
        TimeSensitivity::Implied => cfg.base_decay + cfg.implied_boost,
        TimeSensitivity::Clear => cfg.base_decay + cfg.implied_boost + cfg.clear_boost,
    }
}

/// `0.5 ^ (rate * age_days / half_life)`. Undated reviews score 0, future
/// dates count as age 0.
pub fn recency(published: Option<NaiveDate>, as_of: NaiveDate, sensitivity: TimeSensitivity, cfg: &RankingConfig) -> f64 {
    let Some(published) = published else { return 0.0 };
    let days = (as_of - published).num_days().max(0) as f64;
    unit(0.5f64.powf(decay_rate(sensitivity, cfg) * days / cfg.half_life_days))
}
