//! Slash-command invocation of saved queries.
//!
//! `/top-customers region=west 42` resolves to the saved query named
//! `top-customers` with `region=west` plus the bare token bound to the
//! first positional parameter.

use serde_json::{json, Map, Value};

/// Parse a `/query-name key=value loose-token …` invocation. Returns the
/// query reference and a parameter object ready for `params::compile`;
/// bare tokens become `param1`, `param2`, … in order.
pub fn parse_invocation(text: &str) -> Option<(String, Map<String, Value>)> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return None;
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    let query_ref = tokens.first()?.trim_start_matches('/');
    if query_ref.is_empty() {
        return None;
    }

    let mut params = Map::new();
    let mut positional_index = 1;

    for token in tokens.iter().skip(1) {
        if let Some((key, value)) = token.split_once('=') {
            if !key.trim().is_empty() && !value.trim().is_empty() {
                params.insert(key.trim().to_string(), json!(value.trim()));
                continue;
            }
        }

        params.insert(format!("param{}", positional_index), json!(*token));
        positional_index += 1;
    }

    Some((query_ref.to_string(), params))
}
