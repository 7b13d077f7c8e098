use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{ChatModel, ChatRequest};
use hotelrag_core::types::{PriorTurn, SubQuery};
use hotelrag_core::ModelError;

use crate::json::parse_model_json;

const ATTEMPTS: usize = 2;

#[derive(Deserialize)]
struct RawExpansion {
    rewritten_queries: Vec<RawSubQuery>,
}

#[derive(Deserialize)]
struct RawSubQuery {
    #[serde(alias = "text")]
    query: String,
    #[serde(default = "default_weight")]
    weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Rewrites a question into weighted sub-queries.
pub struct IntentExpander {
    chat: Arc<dyn ChatModel>,
    max_sub_queries: usize,
}

impl IntentExpander {
    pub fn new(chat: Arc<dyn ChatModel>, max_sub_queries: usize) -> Self {
        Self { chat, max_sub_queries: max_sub_queries.max(1) }
    }

    fn prompt(&self, question: &str, prior: Option<&PriorTurn>) -> String {
        let context = prior
            .map(|t| format!("\n【上一轮对话】\n用户：{}\n助手：{}\n", t.user, t.assistant))
            .unwrap_or_default();
        format!(
            r#"你是一个酒店智能客服助手，需要深度理解用户查询意图。

【任务】
1. 分析用户查询，检测用户的核心关注点
2. 生成1-{max}个改写后的查询，每个查询更清晰、更具体地表达一个关注点
3. 为每个改写查询分配权重，表示该关注点的重要性
{context}
【用户查询】
{question}

【要求】
- 改写的查询应该比原查询更具体、更明确，每个聚焦一个方面
- 模糊的查询使用更多改写覆盖更大范围；明确的查询不要过度展开

【输出格式】
严格以 JSON 格式输出：
{{"rewritten_queries": [{{"query": "酒店交通是否便利？", "weight": 0.6}}, {{"query": "酒店周边有哪些配套设施？", "weight": 0.4}}]}}"#,
            max = self.max_sub_queries
        )
    }

    /// Drop blank texts and unusable weights, keep at most the configured count.
    pub fn sanitize(&self, raw: impl IntoIterator<Item = SubQuery>) -> Vec<SubQuery> {
        let mut out: Vec<SubQuery> = Vec::new();
        for sq in raw {
            let text = sq.text.trim();
            if text.is_empty() || !sq.weight.is_finite() || sq.weight < 0.0 {
                continue;
            }
            if out.iter().any(|o| o.text == text) {
                continue;
            }
            out.push(SubQuery::new(text, sq.weight));
            if out.len() == self.max_sub_queries {
                break;
            }
        }
        out
    }

    pub async fn expand(&self, question: &str, prior: Option<&PriorTurn>, cancel: &CancellationToken) -> Result<Vec<SubQuery>, ModelError> {
        let request = ChatRequest::prompt(self.prompt(question, prior), 0.3).json();
        for attempt in 1..=ATTEMPTS {
            match self.chat.complete(&request, cancel).await {
                Ok(raw) => match parse_model_json::<RawExpansion>(&raw) {
                    Ok(parsed) => {
                        let subs = self.sanitize(parsed.rewritten_queries.into_iter().map(|r| SubQuery::new(r.query, r.weight)));
                        if !subs.is_empty() {
                            tracing::debug!(count = subs.len(), "expanded question");
                            return Ok(subs);
                        }
                        tracing::warn!(attempt, "expander returned no usable sub-queries");
                    }
                    Err(e) => tracing::warn!(attempt, error = %e, "malformed expander output"),
                },
                Err(ModelError::Cancelled) => return Err(ModelError::Cancelled),
                Err(e) => tracing::warn!(attempt, error = %e, "query expansion failed"),
            }
        }
        Ok(vec![SubQuery::new(question.trim(), 1.0)])
    }
}
