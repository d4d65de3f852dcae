//! Parameter extraction and substitution for saved-query SQL templates.
//!
//! Five placeholder syntaxes are recognized simultaneously:
//! `{{name}}`, `:name` (never `::cast`), `$name`, `$1`/`$2`/…, and bare `?`.
//! Positional forms are normalized to `param1`, `param2`, … . Lookups are
//! case-insensitive with whitespace trimmed.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

lazy_static! {
    static ref MUSTACHE: Regex = Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap();
    // The leading colon must sit at string start or after a non-colon so
    // ::type casts never read as parameters.
    static ref COLON: Regex = Regex::new(r"(^|[^:]):([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref DOLLAR_NAMED: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref DOLLAR_POSITIONAL: Regex = Regex::new(r"\$([0-9]+)").unwrap();
    static ref QUESTION: Regex = Regex::new(r"\?").unwrap();
}

/// The result of substituting parameter values into a template: the
/// compiled SQL plus every recognized placeholder that had no value.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub missing: Vec<String>,
}

/// Distinct parameter names declared by a SQL template, in first-seen
/// order per syntax pass (mustache, colon, dollar-named,
/// dollar-positional, question marks).
pub fn extract_params(sql: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for caps in MUSTACHE.captures_iter(sql) {
        push_name(&mut names, &mut seen, &caps[1]);
    }
    for caps in COLON.captures_iter(sql) {
        push_name(&mut names, &mut seen, &caps[2]);
    }
    for caps in DOLLAR_NAMED.captures_iter(sql) {
        push_name(&mut names, &mut seen, &caps[1]);
    }
    for caps in DOLLAR_POSITIONAL.captures_iter(sql) {
        push_name(&mut names, &mut seen, &format!("param{}", &caps[1]));
    }
    for (position, _) in QUESTION.find_iter(sql).enumerate() {
        push_name(&mut names, &mut seen, &format!("param{}", position + 1));
    }

    names
}

/// Substitute values for every recognized placeholder. Placeholders with no
/// value stay byte-identical in the output and are reported in `missing`.
pub fn compile(sql: &str, params: &Map<String, Value>) -> CompiledQuery {
    let lookup: HashMap<String, &Value> = params
        .iter()
        .map(|(key, value)| (normalize(key), value))
        .collect();
    let mut missing: Vec<String> = Vec::new();
    let mut reported: HashSet<String> = HashSet::new();

    let sql = MUSTACHE.replace_all(sql, |caps: &Captures| match lookup.get(&normalize(&caps[1])) {
        Some(value) => sql_literal(value),
        None => {
            record_missing(&mut missing, &mut reported, &caps[1]);
            caps[0].to_string()
        }
    });

    let sql = COLON.replace_all(&sql, |caps: &Captures| match lookup.get(&normalize(&caps[2])) {
        Some(value) => format!("{}{}", &caps[1], sql_literal(value)),
        None => {
            record_missing(&mut missing, &mut reported, &caps[2]);
            caps[0].to_string()
        }
    });

    let sql = DOLLAR_NAMED.replace_all(&sql, |caps: &Captures| {
        match lookup.get(&normalize(&caps[1])) {
            Some(value) => sql_literal(value),
            None => {
                record_missing(&mut missing, &mut reported, &caps[1]);
                caps[0].to_string()
            }
        }
    });

    let sql = DOLLAR_POSITIONAL.replace_all(&sql, |caps: &Captures| {
        let name = format!("param{}", &caps[1]);
        match lookup.get(&normalize(&name)) {
            Some(value) => sql_literal(value),
            None => {
                record_missing(&mut missing, &mut reported, &name);
                caps[0].to_string()
            }
        }
    });

    let mut position = 0;
    let sql = QUESTION.replace_all(&sql, |caps: &Captures| {
        position += 1;
        let name = format!("param{}", position);
        match lookup.get(&name) {
            Some(value) => sql_literal(value),
            None => {
                record_missing(&mut missing, &mut reported, &name);
                caps[0].to_string()
            }
        }
    });

    CompiledQuery {
        sql: sql.into_owned(),
        missing,
    }
}

/// Render a parameter value as a SQL literal: NULL for null, bare numerals
/// for finite numbers, TRUE/FALSE for booleans, quoted text otherwise.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => {
            if number.as_f64().map(f64::is_finite).unwrap_or(true) {
                number.to_string()
            } else {
                "NULL".to_string()
            }
        }
        Value::String(text) => quote(text),
        other => quote(&other.to_string()),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn push_name(names: &mut Vec<String>, seen: &mut HashSet<String>, raw: &str) {
    let name = raw.trim();
    if name.is_empty() {
        return;
    }
    if seen.insert(normalize(name)) {
        names.push(name.to_string());
    }
}

fn record_missing(missing: &mut Vec<String>, reported: &mut HashSet<String>, raw: &str) {
    let name = raw.trim().to_string();
    if reported.insert(normalize(&name)) {
        missing.push(name);
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}
