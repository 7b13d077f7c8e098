use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{ChatMessage, ChatModel, ChatRequest};
use hotelrag_core::types::PriorTurn;
use hotelrag_core::ModelError;

const SYSTEM_PROMPT: &str = r#"You should choose one tag from the tag list:
{"RETRIEVAL": "需要检索酒店评论知识库才能回答的问题（如询问酒店设施、服务、位置、价格、房型等具体信息）", "DIRECT": "可以直接回答的通用问题（如问候、闲聊、常识性问题等，不涉及酒店具体信息）"}
Just reply with the chosen tag."#;

/// Decides whether a question needs evidence from the review corpus.
pub struct IntentRecognizer {
    chat: Arc<dyn ChatModel>,
}

impl IntentRecognizer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Provider failures count as "retrieve"; only cancellation is returned as an error.
    pub async fn recognize(&self, question: &str, prior: Option<&PriorTurn>, cancel: &CancellationToken) -> Result<bool, ModelError> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        if let Some(turn) = prior {
            messages.push(ChatMessage::user(turn.user.clone()));
            messages.push(ChatMessage::assistant(turn.assistant.clone()));
        }
        messages.push(ChatMessage::user(question));
        let request = ChatRequest { messages, temperature: 0.0, json_output: false };

        match self.chat.complete(&request, cancel).await {
            Ok(tag) => {
                let direct = tag.trim().trim_matches(|c: char| !c.is_ascii_alphabetic()).eq_ignore_ascii_case("DIRECT");
                tracing::debug!(tag = %tag.trim(), "recognized intent");
                Ok(!direct)
            }
            Err(ModelError::Cancelled) => Err(ModelError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "intent recognition failed; defaulting to retrieval");
                Ok(true)
            }
        }
    }
}
