use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::base::{Notify, Provider, ProviderEvent, Usage};
use super::configs::AnthropicProviderConfig;
use super::sse::{self, SseBuffer};
use super::utils::{tool_result_text, NO_RESULT_AVAILABLE};
use crate::errors::{ProviderError, ProviderResult};
use crate::models::content::{ContentPart, MediaSource};
use crate::models::message::{Message, MessageContent, ToolResponse, ToolStatus};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

const ANTHROPIC_API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Usage {
        let usage = data.get("usage");
        let input_tokens = usage
            .and_then(|u| u.get("input_tokens"))
            .and_then(Value::as_i64)
            .map(|v| v as i32);
        let output_tokens = usage
            .and_then(|u| u.get("output_tokens"))
            .and_then(Value::as_i64)
            .map(|v| v as i32);
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.host.trim_end_matches('/'))
    }

    fn build_payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
        stream: bool,
    ) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_to_anthropic_spec(messages),
            "max_tokens": self.config.max_tokens.unwrap_or(4096)
        });

        if !system.is_empty() {
            payload["system"] = json!(system);
        }
        if !tools.is_empty() {
            payload["tools"] = json!(tools_to_anthropic_spec(tools));
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }
        if stream {
            payload["stream"] = json!(true);
        }

        payload
    }

    fn request(&self, payload: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("anthropic-dangerous-direct-browser-access", "true")
            .json(payload)
    }

    async fn post(&self, payload: Value) -> ProviderResult<Value> {
        let response = self.request(&payload).send().await?;

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
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> ProviderResult<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools, false);
        tracing::debug!(model = %self.config.model, "sending messages request");
        let response = self.post(payload).await?;

        let message = anthropic_response_to_message(&response);
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
        tracing::debug!(model = %self.config.model, "opening messages stream");

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("prompt cancelled before the response arrived");
                return Ok((Message::assistant(), Usage::empty()));
            }
            response = self.request(&payload).send() => response?,
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

        let mut decoder = AnthropicStreamDecoder::new();
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

/// Convert internal Message format to Anthropic's API message specification.
///
/// Runs the same reconciliation pipeline as the OpenAI formatter, with
/// Anthropic's shapes: tool results ride as content blocks on user
/// messages, merging concatenates block arrays, and repairs attach to (or
/// insert) the user message that follows the assistant turn.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::new();
    for message in messages {
        translate_message(&mut spec, message);
    }
    let spec = merge_consecutive(spec);
    let spec = dedup_tool_results(spec);
    repair_orphaned_calls(spec)
}

fn translate_message(out: &mut Vec<Value>, message: &Message) {
    let responses = message.tool_responses();
    if !responses.is_empty() {
        let blocks: Vec<Value> = responses.iter().map(|r| tool_result_block(r)).collect();
        out.push(json!({ "role": "user", "content": blocks }));
        return;
    }

    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let mut blocks = Vec::new();
    for entry in &message.content {
        match entry {
            MessageContent::Text(text) => {
                if !text.text.is_empty() {
                    blocks.push(json!({"type": "text", "text": text.text}));
                }
            }
            MessageContent::Part(part) => blocks.push(part_to_anthropic(part)),
            MessageContent::ToolRequest(request) => blocks.push(json!({
                "type": "tool_use",
                "id": request.id,
                "name": request.call.name,
                "input": request.call.arguments,
            })),
            MessageContent::ToolResponse(_) => {}
        }
    }

    if blocks.is_empty() {
        return;
    }
    out.push(json!({ "role": role, "content": blocks }));
}

fn tool_result_block(response: &ToolResponse) -> Value {
    let mut block = json!({
        "type": "tool_result",
        "tool_use_id": response.id,
        "content": tool_result_text(response),
    });
    if response.status == ToolStatus::Error {
        block["is_error"] = json!(true);
    }
    block
}

fn part_to_anthropic(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({"type": "text", "text": text.text}),
        ContentPart::Image(media) | ContentPart::Video(media) => json!({
            "type": "image",
            "source": media_source_json(&media.source),
        }),
        ContentPart::Document(media) => json!({
            "type": "document",
            "source": media_source_json(&media.source),
        }),
    }
}

fn media_source_json(source: &MediaSource) -> Value {
    match source {
        MediaSource::Url { url } => json!({"type": "url", "url": url}),
        MediaSource::Base64 { media_type, data } => json!({
            "type": "base64",
            "media_type": media_type,
            "data": data,
        }),
    }
}

fn merge_consecutive(messages: Vec<Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    for message in messages {
        let same_role = merged
            .last()
            .map(|prev| prev["role"] == message["role"])
            .unwrap_or(false);
        if same_role {
            if let Some(prev) = merged.last_mut() {
                if let (Some(blocks), Some(next_blocks)) = (
                    prev.get_mut("content").and_then(Value::as_array_mut),
                    message.get("content").and_then(Value::as_array),
                ) {
                    blocks.extend(next_blocks.iter().cloned());
                    continue;
                }
            }
        }
        merged.push(message);
    }
    merged
}

fn dedup_tool_results(messages: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter_map(|mut message| {
            let Some(blocks) = message.get_mut("content").and_then(Value::as_array_mut) else {
                return Some(message);
            };
            blocks.retain(|block| {
                if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                    return true;
                }
                block
                    .get("tool_use_id")
                    .and_then(Value::as_str)
                    .map(|id| seen.insert(id.to_string()))
                    .unwrap_or(true)
            });
            if blocks.is_empty() {
                None
            } else {
                Some(message)
            }
        })
        .collect()
}

fn repair_orphaned_calls(messages: Vec<Value>) -> Vec<Value> {
    let mut repaired: Vec<Value> = Vec::new();
    let mut iter = messages.into_iter().peekable();
    while let Some(message) = iter.next() {
        let call_ids = tool_use_ids(&message);
        repaired.push(message);
        if call_ids.is_empty() {
            continue;
        }

        let mut next = if iter.peek().map(|m| m["role"] == "user").unwrap_or(false) {
            iter.next()
        } else {
            None
        };

        let answered: HashSet<String> = next.as_ref().map(tool_result_ids).unwrap_or_default();
        let missing: Vec<&String> = call_ids.iter().filter(|id| !answered.contains(*id)).collect();

        if !missing.is_empty() {
            let blocks: Vec<Value> = missing
                .iter()
                .map(|id| {
                    tracing::debug!(tool_use_id = %id, "synthesizing missing tool result");
                    json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": NO_RESULT_AVAILABLE,
                    })
                })
                .collect();
            match next.as_mut() {
                // Tool results must lead the user turn that answers the call.
                Some(user) => {
                    if let Some(content) = user.get_mut("content").and_then(Value::as_array_mut) {
                        for (i, block) in blocks.into_iter().enumerate() {
                            content.insert(i, block);
                        }
                    }
                }
                None => next = Some(json!({ "role": "user", "content": blocks })),
            }
        }

        if let Some(user) = next {
            repaired.push(user);
        }
    }
    repaired
}

fn tool_use_ids(message: &Value) -> Vec<String> {
    message
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
                .filter_map(|block| block.get("id").and_then(Value::as_str).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

fn tool_result_ids(message: &Value) -> HashSet<String> {
    message
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"))
                .filter_map(|block| {
                    block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .map(String::from)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Convert Anthropic's API response to internal Message format.
pub fn anthropic_response_to_message(response: &Value) -> Message {
    let mut text = String::new();
    let mut requests = Vec::new();

    if let Some(blocks) = response.get("content").and_then(Value::as_array) {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(segment) = block.get("text").and_then(Value::as_str) {
                        text.push_str(segment);
                    }
                }
                Some("tool_use") => {
                    let id = block
                        .get("id")
                        .and_then(Value::as_str)
                        .filter(|id| !id.is_empty())
                        .map(String::from)
                        .unwrap_or_else(|| Uuid::new_v4().to_string());
                    let name = block
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                    requests.push((id, ToolCall::new(name, input)));
                }
                _ => {}
            }
        }
    }

    let mut message = Message::assistant();
    if !text.is_empty() {
        message = message.with_text(text.as_str());
    }
    for (id, call) in requests {
        message = message.with_tool_request(id, call);
    }
    message
}

/// Convert internal Tool format to Anthropic's API tool specification
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.input_schema,
            })
        })
        .collect()
}

#[derive(Debug)]
struct ToolUseAccum {
    id: String,
    name: String,
    partial_json: String,
}

/// Incremental decoder for the Anthropic messages SSE stream.
///
/// Content blocks have an explicit lifecycle: start announces a text or
/// tool_use block, deltas grow it, stop finalizes it. A ToolUse event fires
/// at stop, once the block's argument JSON is fully assembled.
#[derive(Debug, Default)]
pub struct AnthropicStreamDecoder {
    buffer: SseBuffer,
    text: String,
    blocks: HashMap<u64, ToolUseAccum>,
    completed: Vec<(String, ToolCall)>,
    input_tokens: Option<i32>,
    output_tokens: Option<i32>,
    done: bool,
}

impl AnthropicStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

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
            match serde_json::from_str::<Value>(payload) {
                Ok(value) => self.handle_event(&value, &mut events),
                Err(_) => tracing::debug!("skipping unparsable stream line"),
            }
        }
        events
    }

    fn handle_event(&mut self, value: &Value, events: &mut Vec<ProviderEvent>) {
        match value.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                let usage = &value["message"]["usage"];
                if let Some(input) = usage.get("input_tokens").and_then(Value::as_i64) {
                    self.input_tokens = Some(input as i32);
                }
                if let Some(output) = usage.get("output_tokens").and_then(Value::as_i64) {
                    self.output_tokens = Some(output as i32);
                }
            }
            Some("content_block_start") => {
                let Some(index) = value.get("index").and_then(Value::as_u64) else {
                    return;
                };
                let block = &value["content_block"];
                if block.get("type").and_then(Value::as_str) == Some("tool_use") {
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    // A non-empty initial input shows up on some responses;
                    // deltas append to it.
                    let partial_json = match &input {
                        Value::Object(map) if !map.is_empty() => input.to_string(),
                        _ => String::new(),
                    };
                    self.blocks.insert(
                        index,
                        ToolUseAccum {
                            id: block
                                .get("id")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            name: block
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            partial_json,
                        },
                    );
                }
            }
            Some("content_block_delta") => {
                let delta = &value["delta"];
                match delta.get("type").and_then(Value::as_str) {
                    Some("text_delta") => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            if !text.is_empty() {
                                self.text.push_str(text);
                                events.push(ProviderEvent::TextDelta {
                                    text: text.to_string(),
                                });
                            }
                        }
                    }
                    Some("input_json_delta") => {
                        if let Some(index) = value.get("index").and_then(Value::as_u64) {
                            if let Some(accum) = self.blocks.get_mut(&index) {
                                if let Some(chunk) =
                                    delta.get("partial_json").and_then(Value::as_str)
                                {
                                    accum.partial_json.push_str(chunk);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            Some("content_block_stop") => {
                if let Some(index) = value.get("index").and_then(Value::as_u64) {
                    if let Some(accum) = self.blocks.remove(&index) {
                        self.finalize(accum, events);
                    }
                }
            }
            Some("message_delta") => {
                let usage = &value["usage"];
                if let Some(output) = usage.get("output_tokens").and_then(Value::as_i64) {
                    self.output_tokens = Some(output as i32);
                }
                if let Some(input) = usage.get("input_tokens").and_then(Value::as_i64) {
                    self.input_tokens = Some(input as i32);
                }
            }
            Some("message_stop") => {
                self.done = true;
            }
            _ => {}
        }
    }

    fn finalize(&mut self, accum: ToolUseAccum, events: &mut Vec<ProviderEvent>) {
        let input = if accum.partial_json.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&accum.partial_json)
                .unwrap_or_else(|_| Value::String(accum.partial_json.clone()))
        };
        let id = if accum.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            accum.id
        };
        let call = ToolCall::new(accum.name, input);
        self.completed.push((id.clone(), call.clone()));
        events.push(ProviderEvent::ToolUse { id, call });
    }

    /// Flush any blocks the stream never stopped, then assemble the
    /// canonical message and usage for the whole stream.
    pub fn finish(mut self) -> (Vec<ProviderEvent>, Message, Usage) {
        let mut events = Vec::new();
        let mut indices: Vec<u64> = self.blocks.keys().copied().collect();
        indices.sort_unstable();
        for index in indices {
            if let Some(accum) = self.blocks.remove(&index) {
                self.finalize(accum, &mut events);
            }
        }

        let mut message = Message::assistant();
        if !self.text.is_empty() {
            message = message.with_text(self.text.as_str());
        }
        for (id, call) in &self.completed {
            message = message.with_tool_request(id.clone(), call.clone());
        }

        let total = match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        };
        let usage = Usage::new(self.input_tokens, self.output_tokens, total);
        (events, message, usage)
    }
}
