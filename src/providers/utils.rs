use std::collections::HashSet;

use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::content::ContentPart;
use crate::models::message::{Message, MessageContent, ToolResponse, ToolStatus};
use crate::models::tool::{Tool, ToolCall};

/// Placeholder content synthesized for a tool call the conversation never
/// answered. Both APIs reject payloads with unanswered calls, so the repair
/// pass fills the hole instead of reporting an error.
pub const NO_RESULT_AVAILABLE: &str = "No result available";

/// Convert internal Message format to OpenAI's API message specification.
///
/// Runs the full reconciliation pipeline: per-message translation, merging
/// of consecutive same-role messages, dropping duplicated tool results, and
/// synthesizing results for orphaned tool calls.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::new();
    for message in messages {
        translate_message(&mut spec, message);
    }
    let spec = merge_consecutive(spec);
    let spec = dedup_tool_results(spec);
    repair_orphaned_calls(spec)
}

fn translate_message(out: &mut Vec<Value>, message: &Message) {
    // A message carrying tool responses becomes one role:"tool" entry per
    // result.
    let responses = message.tool_responses();
    if !responses.is_empty() {
        for response in responses {
            out.push(json!({
                "role": "tool",
                "tool_call_id": response.id,
                "content": tool_result_text(response),
            }));
        }
        return;
    }

    // A message carrying tool requests becomes an assistant message with a
    // tool_calls array, plus leading text if present.
    let requests = message.tool_requests();
    if !requests.is_empty() {
        let text = message.text();
        let calls: Vec<Value> = requests
            .iter()
            .map(|request| {
                json!({
                    "id": request.id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&request.call.name),
                        "arguments": arguments_to_string(&request.call.arguments),
                    }
                })
            })
            .collect();
        let content = if text.is_empty() { Value::Null } else { json!(text) };
        out.push(json!({
            "role": "assistant",
            "content": content,
            "tool_calls": calls,
        }));
        return;
    }

    // Multimodal attachments map part-by-part.
    if !message.parts().is_empty() {
        let blocks: Vec<Value> = message
            .content
            .iter()
            .filter_map(|entry| match entry {
                MessageContent::Text(text) => Some(json!({"type": "text", "text": text.text})),
                MessageContent::Part(part) => Some(part_to_openai(part)),
                _ => None,
            })
            .collect();
        out.push(json!({ "role": message.role, "content": blocks }));
        return;
    }

    out.push(json!({ "role": message.role, "content": message.text() }));
}

fn part_to_openai(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text(text) => json!({"type": "text", "text": text.text}),
        ContentPart::Image(media) | ContentPart::Video(media) => json!({
            "type": "image_url",
            "image_url": { "url": media.source.as_url() }
        }),
        // No native document type in the chat-completions schema.
        ContentPart::Document(media) => json!({
            "type": "text",
            "text": format!("[Attached document: {}]", media.source.label()),
        }),
    }
}

/// Merge consecutive same-role messages into one. Tool messages are never
/// merged; each carries its own tool_call_id.
fn merge_consecutive(messages: Vec<Value>) -> Vec<Value> {
    let mut merged: Vec<Value> = Vec::new();
    for message in messages {
        if message["role"] == "tool" {
            merged.push(message);
            continue;
        }
        match merged.last_mut() {
            Some(prev) if prev["role"] == message["role"] && prev["role"] != "tool" => {
                merge_into(prev, &message);
            }
            _ => merged.push(message),
        }
    }
    merged
}

fn merge_into(prev: &mut Value, next: &Value) {
    let combined = match (prev.get("content"), next.get("content")) {
        (Some(Value::String(a)), Some(Value::String(b))) => {
            if a.is_empty() {
                Some(json!(b))
            } else if b.is_empty() {
                None
            } else {
                Some(json!(format!("{}\n{}", a, b)))
            }
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            let mut blocks = a.clone();
            blocks.extend(b.iter().cloned());
            Some(Value::Array(blocks))
        }
        (Some(Value::String(a)), Some(Value::Array(b))) => {
            let mut blocks = vec![json!({"type": "text", "text": a})];
            blocks.extend(b.iter().cloned());
            Some(Value::Array(blocks))
        }
        (Some(Value::Array(a)), Some(Value::String(b))) => {
            let mut blocks = a.clone();
            blocks.push(json!({"type": "text", "text": b}));
            Some(Value::Array(blocks))
        }
        (Some(Value::Null) | None, Some(content)) => Some(content.clone()),
        _ => None,
    };
    if let Some(content) = combined {
        prev["content"] = content;
    }

    if let Some(Value::Array(next_calls)) = next.get("tool_calls") {
        match prev.get_mut("tool_calls") {
            Some(Value::Array(calls)) => calls.extend(next_calls.iter().cloned()),
            _ => prev["tool_calls"] = Value::Array(next_calls.clone()),
        }
    }
}

/// Keep only the first tool message for any given tool_call_id.
fn dedup_tool_results(messages: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    messages
        .into_iter()
        .filter(|message| match message.get("tool_call_id").and_then(Value::as_str) {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .collect()
}

/// Every tool call must be answered by a tool message in the block that
/// follows the assistant turn; synthesize placeholders for the rest.
fn repair_orphaned_calls(messages: Vec<Value>) -> Vec<Value> {
    let mut repaired = Vec::new();
    let mut iter = messages.into_iter().peekable();
    while let Some(message) = iter.next() {
        let call_ids: Vec<String> = message
            .get("tool_calls")
            .and_then(Value::as_array)
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|call| call["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        repaired.push(message);
        if call_ids.is_empty() {
            continue;
        }

        let mut answered = HashSet::new();
        while iter.peek().map(|next| next["role"] == "tool").unwrap_or(false) {
            let Some(next) = iter.next() else { break };
            if let Some(id) = next["tool_call_id"].as_str() {
                answered.insert(id.to_string());
            }
            repaired.push(next);
        }

        for id in &call_ids {
            if !answered.contains(id) {
                tracing::debug!(tool_call_id = %id, "synthesizing missing tool result");
                repaired.push(json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": NO_RESULT_AVAILABLE,
                }));
            }
        }
    }
    repaired
}

/// Convert OpenAI's API response to internal Message format.
///
/// Never fails on malformed input: a missing id gets a generated one and
/// unparsable argument JSON is kept verbatim as a string.
pub fn openai_response_to_message(response: &Value) -> Message {
    let original = &response["choices"][0]["message"];
    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            message = message.with_text(text);
        }
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"]
                .as_str()
                .filter(|id| !id.is_empty())
                .map(String::from)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            let name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"].as_str().unwrap_or_default();
            message = message.with_tool_request(id, ToolCall::new(name, parse_arguments(arguments)));
        }
    }

    message
}

/// Parse a string-encoded argument payload, passing the raw string through
/// when it is not valid JSON.
pub fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Vec<Value> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            tracing::warn!(name = %tool.name, "skipping duplicate tool");
            continue;
        }
        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    result
}

/// The textual body of a tool result as the model should see it.
pub fn tool_result_text(response: &ToolResponse) -> String {
    match response.status {
        ToolStatus::Ok => value_to_text(&response.data),
        ToolStatus::Error => response
            .message
            .clone()
            .unwrap_or_else(|| value_to_text(&response.data)),
    }
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// The string-encoded argument payload the chat-completions schema expects.
/// A raw string (from a tolerated malformed parse) is passed back verbatim.
fn arguments_to_string(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        other => other.to_string(),
    }
}

fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::MediaSource;

    #[test]
    fn test_messages_to_openai_spec() {
        let message = Message::user().with_text("Hello");
        let spec = messages_to_openai_spec(&[message]);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Hello");
    }

    #[test]
    fn test_consecutive_same_role_messages_merge() {
        let messages = vec![
            Message::user().with_text("How are you?"),
            Message::user().with_text("Still there?"),
            Message::assistant().with_text("Here!"),
        ];
        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 2);
        assert_eq!(spec[0]["content"], "How are you?\nStill there?");
        assert_eq!(spec[1]["content"], "Here!");
    }

    #[test]
    fn test_missing_tool_result_synthesized() {
        let messages = vec![
            Message::user().with_text("List tables"),
            Message::assistant().with_tool_request("t1", ToolCall::new("get_schema", json!({}))),
        ];
        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 3);
        assert_eq!(spec[1]["role"], "assistant");
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "t1");
        assert_eq!(spec[2]["content"], NO_RESULT_AVAILABLE);
    }

    #[test]
    fn test_duplicate_tool_results_dropped() {
        let messages = vec![
            Message::assistant().with_tool_request("t1", ToolCall::new("get_schema", json!({}))),
            Message::user().with_tool_response(ToolResponse::success("t1", json!("first"))),
            Message::user().with_tool_response(ToolResponse::success("t1", json!("replay"))),
        ];
        let spec = messages_to_openai_spec(&messages);

        let tool_messages: Vec<_> = spec.iter().filter(|m| m["role"] == "tool").collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0]["content"], "first");
    }

    #[test]
    fn test_consecutive_assistants_with_tool_calls() {
        let messages = vec![
            Message::assistant().with_tool_request("t1", ToolCall::new("get_schema", json!({}))),
            Message::assistant()
                .with_tool_request("t2", ToolCall::new("execute_query", json!({"sql": "SELECT 1"}))),
        ];
        let spec = messages_to_openai_spec(&messages);

        // The two assistant turns merge, and both calls get placeholder results.
        assert_eq!(spec[0]["role"], "assistant");
        assert_eq!(spec[0]["tool_calls"].as_array().unwrap().len(), 2);
        let answered: Vec<_> = spec
            .iter()
            .filter(|m| m["role"] == "tool")
            .map(|m| m["tool_call_id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(answered, vec!["t1", "t2"]);
    }

    #[test]
    fn test_tool_call_keeps_leading_text() {
        let messages = vec![Message::assistant()
            .with_text("Let me check")
            .with_tool_request("t1", ToolCall::new("get_schema", json!({})))];
        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec[0]["content"], "Let me check");
        assert_eq!(spec[0]["tool_calls"][0]["id"], "t1");
        assert_eq!(
            spec[0]["tool_calls"][0]["function"]["arguments"],
            json!("{}")
        );
    }

    #[test]
    fn test_error_tool_response_uses_message() {
        let messages = vec![
            Message::assistant().with_tool_request("t1", ToolCall::new("execute_query", json!({}))),
            Message::user().with_tool_response(ToolResponse::error("t1", "syntax error at line 1")),
        ];
        let spec = messages_to_openai_spec(&messages);
        assert_eq!(spec[1]["content"], "syntax error at line 1");
    }

    #[test]
    fn test_image_and_document_parts() {
        let messages = vec![Message::user()
            .with_text("What's in this?")
            .with_part(ContentPart::image(MediaSource::base64("image/png", "aGk=")))
            .with_part(ContentPart::document(MediaSource::url(
                "https://example.com/report.pdf",
            )))];
        let spec = messages_to_openai_spec(&messages);

        let blocks = spec[0]["content"].as_array().unwrap();
        assert_eq!(blocks[0]["type"], "text");
        assert_eq!(blocks[1]["type"], "image_url");
        assert_eq!(
            blocks[1]["image_url"]["url"],
            "data:image/png;base64,aGk="
        );
        assert_eq!(blocks[2]["type"], "text");
        assert!(blocks[2]["text"]
            .as_str()
            .unwrap()
            .contains("https://example.com/report.pdf"));
    }

    #[test]
    fn test_openai_response_to_message_text() {
        let response = json!({
            "choices": [{
                "role": "assistant",
                "message": {
                    "content": "Hello from the model!"
                }
            }]
        });

        let message = openai_response_to_message(&response);
        assert_eq!(message.text(), "Hello from the model!");
        assert!(message.tool_requests().is_empty());
    }

    #[test]
    fn test_openai_response_to_message_tool_call() {
        let response = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {
                            "name": "execute_query",
                            "arguments": "{\"sql\": \"SELECT 1\"}"
                        }
                    }]
                }
            }]
        });

        let message = openai_response_to_message(&response);
        let requests = message.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "call_1");
        assert_eq!(requests[0].call.arguments, json!({"sql": "SELECT 1"}));
    }

    #[test]
    fn test_malformed_arguments_pass_through() {
        let response = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {
                            "name": "execute_query",
                            "arguments": "not json {"
                        }
                    }]
                }
            }]
        });

        let message = openai_response_to_message(&response);
        assert_eq!(
            message.tool_requests()[0].call.arguments,
            Value::String("not json {".to_string())
        );
    }

    #[test]
    fn test_missing_tool_call_id_generated() {
        let response = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "function": { "name": "get_schema", "arguments": "{}" }
                    }]
                }
            }]
        });

        let message = openai_response_to_message(&response);
        assert!(!message.tool_requests()[0].id.is_empty());
    }

    #[test]
    fn test_tools_to_openai_spec_skips_duplicates() {
        let tool = Tool::new("get_schema", "List tables", json!({"type": "object"}));
        let spec = tools_to_openai_spec(&[tool.clone(), tool]);
        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["function"]["name"], "get_schema");
    }
}
