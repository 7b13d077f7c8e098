use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use hotelrag_core::config::IntentConfig;
use hotelrag_core::traits::{ChatModel, ChatRequest};
use hotelrag_core::types::{RoomTypeConstraint, TimeSensitivity};
use hotelrag_core::ModelError;

use crate::json::{non_null, parse_model_json};

const ATTEMPTS: usize = 2;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub room_type: Option<RoomTypeConstraint>,
    pub time_sensitivity: TimeSensitivity,
}

#[derive(Deserialize)]
struct RawDetection {
    #[serde(default)]
    room_type: Option<String>,
    #[serde(default)]
    fuzzy_room_type: Option<String>,
    #[serde(default)]
    time_sensitivity: Option<String>,
}

/// Extracts the room-type constraint and time sensitivity of a question.
pub struct IntentDetector {
    chat: Arc<dyn ChatModel>,
    exact_room_types: Vec<String>,
    fuzzy_room_types: Vec<String>,
    recency_keywords: Vec<String>,
}

impl IntentDetector {
    pub fn new(chat: Arc<dyn ChatModel>, cfg: &IntentConfig) -> Self {
        Self {
            chat,
            exact_room_types: cfg.exact_room_types.clone(),
            fuzzy_room_types: cfg.fuzzy_room_types.clone(),
            recency_keywords: cfg.recency_keywords.clone(),
        }
    }

    fn prompt(&self, question: &str) -> String {
        let exact = serde_json::to_string(&self.exact_room_types).unwrap_or_default();
        let fuzzy = serde_json::to_string(&self.fuzzy_room_types).unwrap_or_default();
        format!(
            r#"你是一个酒店智能客服助手，需要分析用户查询并提取关键信息。

【任务】
从用户查询中提取：1. 房型约束；2. 时效性需求。

【精确房型列表】
{exact}

【模糊房型列表】
{fuzzy}

【房型检测规则】
- 优先检测精确房型，检测到则填入 room_type，只能是精确房型列表中的名称或 null
- 未检测到精确房型时检测模糊房型，检测到则填入 fuzzy_room_type，只能是模糊房型列表中的名称或 null
- 模棱两可时视为未检测到

【时效性判断标准】
- clear: 明确提到"最近"、"今年"、"最新"、"现在"等词汇
- implied: 隐含关注当前现状，但未明确表达
- null: 未表现出时效性关注

【用户查询】
{question}

【输出格式】
严格以 JSON 格式输出：
{{"room_type": "花园大床房" 或 null, "fuzzy_room_type": "大床房" 或 null, "time_sensitivity": "clear" 或 "implied" 或 null}}"#
        )
    }

    /// Keep only values from the configured lists; exact wins over fuzzy.
    fn validate(&self, raw: RawDetection) -> Detection {
        let exact = non_null(raw.room_type).filter(|r| self.exact_room_types.contains(r));
        let fuzzy = non_null(raw.fuzzy_room_type).filter(|r| self.fuzzy_room_types.contains(r));
        let room_type = exact.map(RoomTypeConstraint::Exact).or(fuzzy.map(RoomTypeConstraint::Fuzzy));
        let time_sensitivity = match non_null(raw.time_sensitivity).as_deref() {
            Some("clear") => TimeSensitivity::Clear,
            Some("implied") => TimeSensitivity::Implied,
            _ => TimeSensitivity::None,
        };
        Detection { room_type, time_sensitivity }
    }

    /// Longest configured room-type name found in the question, plus recency keywords.
    pub fn detect_lexically(&self, question: &str) -> Detection {
        let longest = |names: &[String]| {
            names.iter().filter(|n| !n.is_empty() && question.contains(n.as_str())).max_by_key(|n| n.chars().count()).cloned()
        };
        let room_type = longest(&self.exact_room_types)
            .map(RoomTypeConstraint::Exact)
            .or_else(|| longest(&self.fuzzy_room_types).map(RoomTypeConstraint::Fuzzy));
        let time_sensitivity = if self.recency_keywords.iter().any(|k| question.contains(k.as_str())) {
            TimeSensitivity::Clear
        } else {
            TimeSensitivity::None
        };
        Detection { room_type, time_sensitivity }
    }

    pub async fn detect(&self, question: &str, cancel: &CancellationToken) -> Result<Detection, ModelError> {
        let request = ChatRequest::prompt(self.prompt(question), 0.1).json();
        for attempt in 1..=ATTEMPTS {
            match self.chat.complete(&request, cancel).await {
                Ok(raw) => match parse_model_json::<RawDetection>(&raw) {
                    Ok(parsed) => {
                        let detection = self.validate(parsed);
                        tracing::debug!(?detection, "detected constraints");
                        return Ok(detection);
                    }
                    Err(e) => tracing::warn!(attempt, error = %e, "malformed detector output"),
                },
                Err(ModelError::Cancelled) => return Err(ModelError::Cancelled),
                Err(e) => tracing::warn!(attempt, error = %e, "intent detection failed"),
            }
        }
        let fallback = self.detect_lexically(question);
        tracing::warn!(?fallback, "intent detection fell back to keyword matching");
        Ok(fallback)
    }
}
