//! Structured record of one outbound HTTP call

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Response text beyond this many characters is cut off.
pub const MAX_RESPONSE_TEXT_CHARS: usize = 10_000;

/// Marker appended to truncated response text.
pub const TRUNCATION_MARKER: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request body as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "encoding", content = "content", rename_all = "lowercase")]
pub enum RequestBody {
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Response body: parsed JSON when possible, raw text otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    ResponseBody(Value),
    ResponseText(String),
}

impl ResponsePayload {
    /// Parse `bytes` as JSON, falling back to truncated lossy text.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => ResponsePayload::ResponseBody(value),
            Err(_) => ResponsePayload::ResponseText(truncate_text(&String::from_utf8_lossy(bytes))),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponsePayload::ResponseBody(value) => Some(value),
            ResponsePayload::ResponseText(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponsePayload::ResponseBody(_) => None,
            ResponsePayload::ResponseText(text) => Some(text),
        }
    }
}

/// Cut `text` to [`MAX_RESPONSE_TEXT_CHARS`] characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
pub fn truncate_text(text: &str) -> String {
    match text.char_indices().nth(MAX_RESPONSE_TEXT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// One call through an [`HttpSession`](crate::http::HttpSession).
///
/// `status_code` is `None` when the transport failed before a response
/// arrived; the error text is then carried as `response_text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionRecord {
    pub method: Method,
    pub url: String,
    pub request_headers: BTreeMap<String, String>,
    pub request_params: Option<Value>,
    pub request_body: Option<RequestBody>,
    pub status_code: Option<u16>,
    #[serde(flatten)]
    pub response: ResponsePayload,
}

impl InteractionRecord {
    /// Attachment name used by the recorder, e.g. `POST http://host/api`.
    pub fn attachment_name(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Status code rendered for labels, `none` for transport failures.
    pub fn status_label(&self) -> String {
        self.status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string())
    }
}

/// Render query parameters as a JSON object, or `None` when there are none.
/// A key sent more than once maps to an array of its values in send order.
pub(crate) fn params_value(params: &[(String, String)]) -> Option<Value> {
    if params.is_empty() {
        return None;
    }
    let mut map = serde_json::Map::new();
    for (key, value) in params {
        let value = Value::String(value.clone());
        match map.get_mut(key) {
            None => {
                map.insert(key.clone(), value);
            }
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Some(Value::Object(map))
}
