use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::base::{Notify, Provider, ProviderEvent, Usage};
use super::configs::OpenAiProviderConfig;
use super::sse::{self, SseBuffer};
use super::utils::{
    messages_to_openai_spec, openai_response_to_message, parse_arguments, tools_to_openai_spec,
};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage") else {
            return Usage::empty();
        };

        let input_tokens = usage
            .get("prompt_tokens")
            .and_then(Value::as_i64)
            .map(|v| v as i32);

        let output_tokens = usage
            .get("completion_tokens")
            .and_then(Value::as_i64)
            .map(|v| v as i32);

        let total_tokens = usage
            .get("total_tokens")
            .and_then(Value::as_i64)
            .map(|v| v as i32)
            .or_else(|| match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input + output),
                _ => None,
            });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.host.trim_end_matches('/'))
    }

    fn build_payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        stream: bool,
    ) -> Value {
        let system_message = json!({
            "role": "system",
            "content": system
        });

        let messages_spec = messages_to_openai_spec(messages);
        let tools_spec = tools_to_openai_spec(tools);

        let mut messages_array = vec![system_message];
        messages_array.extend(messages_spec);

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });

        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if let Some(tokens) = self.config.max_tokens {
            payload["max_tokens"] = json!(tokens);
        }
        if stream {
            payload["stream"] = json!(true);
            payload["stream_options"] = json!({ "include_usage": true });
        }

        payload
    }

    fn request(&self, url: &str, payload: &Value) -> reqwest::RequestBuilder {
        let mut request = self.client.post(url).json(payload);
        // Ollama and other keyless compatible endpoints send no auth header.
        if !self.config.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.config.api_key));
        }
        request
    }

    async fn post(&self, payload: Value) -> ProviderResult<Value> {
        let response = self.request(&self.completions_url(), &payload).send().await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ProviderError::api(
                    &self.config.provider,
                    &self.config.model,
                    status.as_u16(),
                    &body,
                ))
            }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools, false);
        tracing::debug!(model = %self.config.model, "sending chat completion request");
        let response = self.post(payload).await?;

        let message = openai_response_to_message(&response);
        let usage = Self::get_usage(&response);
        Ok((message, usage))
    }

    async fn complete_streaming(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        notify: Notify<'_>,
        cancel: CancellationToken,
    ) -> ProviderResult<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools, true);
        tracing::debug!(model = %self.config.model, "opening chat completion stream");

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("prompt cancelled before the response arrived");
                return Ok((Message::assistant(), Usage::empty()));
            }
            response = self.request(&self.completions_url(), &payload).send() => response?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::api(
                &self.config.provider,
                &self.config.model,
                status.as_u16(),
                &body,
            ));
        }

        let mut decoder = OpenAiStreamDecoder::new();
        let mut body = response.bytes_stream();
        let mut cancelled = false;

        while !decoder.is_done() {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(Ok(bytes)) => {
                    for event in decoder.feed(&bytes) {
                        notify(event);
                    }
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }

        let (events, message, usage) = decoder.finish();
        if !cancelled {
            for event in events {
                notify(event);
            }
        }
        Ok((message, usage))
    }
}

#[derive(Debug, Default)]
struct ToolCallAccum {
    id: String,
    name: String,
    arguments: String,
    emitted: bool,
}

/// Incremental decoder for the chat-completions SSE stream.
///
/// Tool-call argument fragments arrive piecemeal and are accumulated by
/// choice index; a ToolUse event fires only once a call's arguments are
/// fully assembled.
#[derive(Debug, Default)]
pub struct OpenAiStreamDecoder {
    buffer: SseBuffer,
    text: String,
    calls: BTreeMap<u64, ToolCallAccum>,
    completed: Vec<(String, ToolCall)>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    done: bool,
}

impl OpenAiStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stream sent its `[DONE]` sentinel; nothing further will decode.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode one chunk, returning the events it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        for line in self.buffer.push(chunk) {
            let Some(payload) = sse::data_payload(&line) else {
                continue;
            };
            if payload == sse::DONE_SENTINEL {
                self.flush_tool_calls(true, &mut events);
                self.done = true;
                continue;
            }
            match serde_json::from_str::<Value>(payload) {
                Ok(value) => self.handle_chunk(&value, &mut events),
                Err(_) => tracing::debug!("skipping unparsable stream line"),
            }
        }
        events
    }

    fn handle_chunk(&mut self, value: &Value, events: &mut Vec<ProviderEvent>) {
        if let Some(usage) = value.get("usage") {
            let input = usage
                .get("prompt_tokens")
                .and_then(Value::as_i64)
                .map(|v| v as i32);
            let output = usage
                .get("completion_tokens")
                .and_then(Value::as_i64)
                .map(|v| v as i32);
            if input.is_some() || output.is_some() {
                let total = usage
                    .get("total_tokens")
                    .and_then(Value::as_i64)
                    .map(|v| v as i32)
                    .or_else(|| match (input, output) {
                        (Some(i), Some(o)) => Some(i + o),
                        _ => None,
                    });
                self.usage = Some(Usage::new(input, output, total));
            }
        }

        let Some(choice) = value
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
        else {
            return;
        };

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
        }

        if let Some(delta) = choice.get("delta") {
            if let Some(content) = delta.get("content").and_then(Value::as_str) {
                if !content.is_empty() {
                    self.text.push_str(content);
                    events.push(ProviderEvent::TextDelta {
                        text: content.to_string(),
                    });
                }
            }
            if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for entry in tool_calls {
                    self.accumulate_tool_delta(entry);
                }
            }
        }

        if self.finish_reason.as_deref() == Some("tool_calls") {
            self.flush_tool_calls(false, events);
        }
    }

    fn accumulate_tool_delta(&mut self, entry: &Value) {
        let index = entry.get("index").and_then(Value::as_u64).unwrap_or(0);
        let accum = self.calls.entry(index).or_default();
        if let Some(id) = entry.get("id").and_then(Value::as_str) {
            if !id.is_empty() {
                accum.id = id.to_string();
            }
        }
        if let Some(function) = entry.get("function") {
            if let Some(name) = function.get("name").and_then(Value::as_str) {
                if !name.is_empty() {
                    accum.name = name.to_string();
                }
            }
            if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                accum.arguments.push_str(args);
            }
        }
    }

    fn flush_tool_calls(&mut self, force: bool, events: &mut Vec<ProviderEvent>) {
        for accum in self.calls.values_mut() {
            if accum.emitted || accum.name.is_empty() {
                continue;
            }
            if !force && accum.arguments.trim().is_empty() {
                continue;
            }
            accum.emitted = true;
            let id = if accum.id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                accum.id.clone()
            };
            let call = ToolCall::new(accum.name.clone(), parse_arguments(&accum.arguments));
            self.completed.push((id.clone(), call.clone()));
            events.push(ProviderEvent::ToolUse { id, call });
        }
    }

    /// Flush any unfinalized accumulators, then assemble the canonical
    /// message and usage for the whole stream.
    pub fn finish(mut self) -> (Vec<ProviderEvent>, Message, Usage) {
        let mut events = Vec::new();
        self.flush_tool_calls(true, &mut events);

        let mut message = Message::assistant();
        if !self.text.is_empty() {
            message = message.with_text(self.text.as_str());
        }
        for (id, call) in &self.completed {
            message = message.with_tool_request(id.clone(), call.clone());
        }
        (events, message, self.usage.unwrap_or_else(Usage::empty))
    }
}
