//! Template rendering context assembled from the request.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use serde::Serialize;

use crate::routing::PathParams;

/// Data available to templates during rendering.
///
/// Built once per matched request, after the body has been buffered, and
/// shared by the body template and every response header template.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TemplateContext {
    pub method: String,
    pub path: String,

    /// All request headers, names lowercase. Repeated headers are joined
    /// with ", ".
    pub headers: BTreeMap<String, String>,

    /// Query parameters. Repeated parameters are joined with ", ".
    pub query: BTreeMap<String, String>,

    /// Named captures from a regex route path.
    pub params: HashMap<String, String>,

    /// Parsed request body: a JSON value for JSON content types, a string
    /// otherwise, null when the body is empty.
    pub body: serde_json::Value,
}

impl TemplateContext {
    pub fn build(parts: &Parts, body: &[u8], params: PathParams) -> Self {
        let mut headers = BTreeMap::new();
        for (name, value) in parts.headers.iter() {
            let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
            join_into(&mut headers, name.as_str().to_string(), text);
        }

        let mut query = BTreeMap::new();
        let raw_query = parts.uri.query().unwrap_or("");
        for (key, value) in url::form_urlencoded::parse(raw_query.as_bytes()) {
            join_into(&mut query, key.into_owned(), value.into_owned());
        }

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        Self {
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            headers,
            query,
            params,
            body: parse_body(body, content_type),
        }
    }
}

fn join_into(map: &mut BTreeMap<String, String>, key: String, value: String) {
    match map.entry(key) {
        Entry::Occupied(mut slot) => {
            let joined = slot.get_mut();
            joined.push_str(", ");
            joined.push_str(&value);
        }
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
    }
}

fn parse_body(raw: &[u8], content_type: &str) -> serde_json::Value {
    if raw.is_empty() {
        return serde_json::Value::Null;
    }

    if is_json_content_type(content_type) {
        match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => serde_json::json!({
                "raw": String::from_utf8_lossy(raw),
                "parse_error": err.to_string(),
            }),
        }
    } else {
        serde_json::Value::String(String::from_utf8_lossy(raw).into_owned())
    }
}

fn is_json_content_type(content_type: &str) -> bool {
    let normalized = content_type.trim().to_ascii_lowercase();
    normalized.contains("application/json")
        || normalized.contains("text/json")
        || normalized.ends_with("+json")
}
