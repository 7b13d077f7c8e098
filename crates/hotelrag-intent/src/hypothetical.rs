use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{ChatModel, ChatRequest};
use hotelrag_core::ModelError;

use crate::json::parse_model_json;

#[derive(Deserialize)]
struct RawHypotheticals {
    hypothetical_responses: Vec<String>,
}

/// Writes short hypothetical reviews answering a sub-query, to be embedded
/// and searched like real reviews.
pub struct HypotheticalWriter {
    chat: Arc<dyn ChatModel>,
    per_query: usize,
}

impl HypotheticalWriter {
    pub fn new(chat: Arc<dyn ChatModel>, per_query: usize) -> Self {
        Self { chat, per_query: per_query.max(1) }
    }

    fn prompt(&self, query: &str) -> String {
        let negative = usize::from(self.per_query > 1);
        let positive = self.per_query - negative;
        format!(
            r#"你是一个酒店评论撰写者，需要为以下查询生成假设性的评论回复。

【查询】
{query}

【任务】
生成{total}条假设性的酒店评论：{positive}条正面评论，{negative}条负面评论。

【要求】
- 每条评论50-100字，具体真实，像真实用户写的
- 尽量增大评论之间的差异性

【输出格式】
严格以 JSON 格式输出：
{{"hypothetical_responses": ["评论1", "评论2"]}}"#,
            total = self.per_query
        )
    }

    /// Falls back to the query itself when the model output is unusable.
    pub async fn write(&self, query: &str, cancel: &CancellationToken) -> Result<Vec<String>, ModelError> {
        let request = ChatRequest::prompt(self.prompt(query), 0.7).json();
        match self.chat.complete(&request, cancel).await {
            Ok(raw) => match parse_model_json::<RawHypotheticals>(&raw) {
                Ok(parsed) => {
                    let docs: Vec<String> = parsed
                        .hypothetical_responses
                        .into_iter()
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty())
                        .take(self.per_query)
                        .collect();
                    if !docs.is_empty() {
                        return Ok(docs);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "malformed hypothetical output"),
            },
            Err(ModelError::Cancelled) => return Err(ModelError::Cancelled),
            Err(e) => return Err(e),
        }
        Ok(vec![query.to_string()])
    }
}
