use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::registry::ProviderDef;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn empty() -> Self {
        Self::new(None, None, None)
    }
}

/// Incremental events delivered to the caller while a prompt executes.
///
/// Streaming prompts fire `TextDelta` and `ToolUse` as the stream decodes,
/// then `ModelResponseComplete` once; synchronous prompts fire a single
/// `ModelResponse`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProviderEvent {
    TextDelta { text: String },
    ToolUse { id: String, call: ToolCall },
    ModelResponse { message: Message },
    ModelResponseComplete { message: Message, usage: Usage },
}

/// Callback invoked with each event, in order, before the next chunk of the
/// response is read.
pub type Notify<'a> = &'a mut (dyn FnMut(ProviderEvent) + Send);

/// One conversation turn handed to the adapter: the full history plus the
/// tools the model may call. The adapter borrows it for the duration of a
/// single prompt and retains nothing.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
}

impl PromptRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PromptResponse {
    pub message: Message,
    pub usage: Usage,
}

/// Base trait for AI providers (OpenAI-compatible, Anthropic, etc)
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next message in one round trip
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<(Message, Usage)>;

    /// Generate the next message incrementally, invoking `notify` for each
    /// decoded event. Cancelling stops event emission and returns whatever
    /// had been assembled.
    async fn complete_streaming(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        notify: Notify<'_>,
        cancel: CancellationToken,
    ) -> ProviderResult<(Message, Usage)>;
}

/// The public-facing unit handed to the UI layer: a configured provider plus
/// the system prompt slot and the sync/streaming dispatch.
///
/// The system prompt is set separately from construction because it is
/// computed from workspace context that may resolve after the adapter
/// exists.
pub struct Adapter {
    def: &'static ProviderDef,
    model: String,
    provider: Box<dyn Provider>,
    system_prompt: Mutex<String>,
    streaming: bool,
    has_api_key: bool,
}

impl Adapter {
    pub fn new(
        def: &'static ProviderDef,
        model: String,
        provider: Box<dyn Provider>,
        streaming: bool,
        has_api_key: bool,
    ) -> Self {
        Self {
            def,
            model,
            provider,
            system_prompt: Mutex::new(String::new()),
            streaming,
            has_api_key,
        }
    }

    pub fn provider_id(&self) -> &str {
        self.def.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_system_prompt<S: Into<String>>(&self, text: S) {
        *self.system_prompt.lock().unwrap() = text.into();
    }

    /// Run one prompt. Dispatches to the streaming or synchronous path the
    /// adapter was built for; fails before any network I/O when the
    /// provider requires an API key and none is configured.
    pub async fn prompt(
        &self,
        request: PromptRequest,
        notify: Notify<'_>,
        cancel: Option<CancellationToken>,
    ) -> ProviderResult<PromptResponse> {
        if self.def.requires_api_key && !self.has_api_key {
            return Err(ProviderError::MissingApiKey(self.def.name.to_string()));
        }

        let system = self.system_prompt.lock().unwrap().clone();
        let cancel = cancel.unwrap_or_default();
        tracing::debug!(
            provider = self.def.id,
            model = %self.model,
            streaming = self.streaming,
            "dispatching prompt"
        );

        if self.streaming {
            let (message, usage) = self
                .provider
                .complete_streaming(
                    &system,
                    &request.messages,
                    &request.tools,
                    &mut *notify,
                    cancel.clone(),
                )
                .await?;
            if !cancel.is_cancelled() {
                notify(ProviderEvent::ModelResponseComplete {
                    message: message.clone(),
                    usage: usage.clone(),
                });
            }
            Ok(PromptResponse { message, usage })
        } else {
            let (message, usage) = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("prompt cancelled before the response arrived");
                    return Ok(PromptResponse {
                        message: Message::assistant(),
                        usage: Usage::empty(),
                    });
                }
                result = self.provider.complete(&system, &request.messages, &request.tools) => result?,
            };
            notify(ProviderEvent::ModelResponse {
                message: message.clone(),
            });
            Ok(PromptResponse { message, usage })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_creation() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        assert_eq!(usage.input_tokens, Some(10));
        assert_eq!(usage.output_tokens, Some(20));
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_usage_serialization() {
        let usage = Usage::new(Some(10), Some(20), Some(30));
        let serialized = serde_json::to_string(&usage).unwrap();
        let json_value: serde_json::Value = serde_json::from_str(&serialized).unwrap();
        assert_eq!(json_value["input_tokens"], json!(10));
        assert_eq!(json_value["output_tokens"], json!(20));
        assert_eq!(json_value["total_tokens"], json!(30));
    }

    #[test]
    fn test_prompt_request_builder() {
        let request = PromptRequest::new(vec![Message::user().with_text("hi")])
            .with_tools(vec![Tool::new("get_schema", "List tables", json!({}))]);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.tools.len(), 1);
    }
}
