use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use hotelrag_core::traits::{ChatMessage, ChatModel, ChatRequest, FragmentStream};
use hotelrag_core::ModelError;

use crate::http::{transport_error, ProviderClient};
use crate::sse::{self, SseFrame};

/// Chat completions against an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiChat {
    client: ProviderClient,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(client: ProviderClient, base_url: &str, model: impl Into<String>) -> Self {
        Self { client, endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')), model: model.into() }
    }

    pub fn model(&self) -> &str { &self.model }

    fn body<'a>(&'a self, request: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
        ChatBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            stream,
            response_format: request.json_output.then_some(ResponseFormat { kind: "json_object" }),
        }
    }
}

struct StreamState {
    frames: BoxStream<'static, Result<SseFrame, ModelError>>,
    cancel: CancellationToken,
    finished: bool,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<String, ModelError> {
        let body = self.body(request, false);
        let resp: ChatResponse = self.client.post_json(&self.endpoint, &body, cancel).await?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::Decode("completion had no choices".into()))?;
        tracing::debug!(model = %self.model, chars = content.chars().count(), "chat completion");
        Ok(content.trim().to_string())
    }

    async fn stream(&self, request: &ChatRequest, cancel: &CancellationToken) -> Result<FragmentStream, ModelError> {
        let body = self.body(request, true);
        let resp = self.client.post_streaming(&self.endpoint, &body, cancel).await?;
        let state = StreamState {
            frames: sse::frames(resp.bytes_stream(), transport_error).boxed(),
            cancel: cancel.clone(),
            finished: false,
        };

        let fragments = futures::stream::unfold(state, |mut st| async move {
            if st.finished {
                return None;
            }
            let next = tokio::select! {
                biased;
                _ = st.cancel.cancelled() => return None,
                n = st.frames.next() => n,
            };
            match next? {
                Ok(SseFrame::Fragment(text)) => Some((Ok(text), st)),
                Ok(SseFrame::Done) => None,
                Err(e) => {
                    st.finished = true;
                    Some((Err(e), st))
                }
            }
        });
        Ok(fragments.boxed())
    }
}
