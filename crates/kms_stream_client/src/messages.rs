//! KMS wire types: the outbound query and the decoded server records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server: query body for `POST /chat/query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub message: String,
    pub username: String,
    /// Always empty; no multi-turn context is sent.
    pub history: Vec<Value>,
    pub stream: bool,
}

impl QueryRequest {
    pub fn new(message: impl Into<String>, username: impl Into<String>, stream: bool) -> Self {
        Self {
            message: message.into(),
            username: username.into(),
            history: Vec::new(),
            stream,
        }
    }
}

/// Server → client: single-shot (non-streaming) response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub evidence: Option<Vec<Value>>,
}

/// `chat` record: an incremental fragment and/or a full replacement answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRecord {
    pub content: Option<String>,
    pub response: Option<String>,
}

/// `info` record: evidence for the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoRecord {
    pub evidence: Option<Value>,
    /// Any truthy value; strings are the common case.
    pub content: Option<Value>,
    /// The whole decoded object, used as opaque evidence when neither field is set.
    pub raw: Value,
}

/// One decoded stream record; discriminator is the `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Chat(ChatRecord),
    Info(InfoRecord),
    /// Any other (or missing) `type`; folds as a no-op.
    Other(Option<String>),
}

impl Record {
    /// Classify a decoded JSON value. Never fails: anything that is not a
    /// `chat` or `info` object becomes [`Record::Other`].
    pub fn from_value(value: Value) -> Self {
        let typ = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match typ.as_deref() {
            Some("chat") => Record::Chat(ChatRecord {
                content: non_empty_str(&value, "content"),
                response: non_empty_str(&value, "response"),
            }),
            Some("info") => Record::Info(InfoRecord {
                evidence: truthy_field(&value, "evidence"),
                content: truthy_field(&value, "content"),
                raw: value,
            }),
            _ => Record::Other(typ),
        }
    }

    /// An `info` record carrying `payload` verbatim as its evidence.
    pub fn raw_evidence(payload: &str) -> Self {
        let raw = Value::String(payload.to_owned());
        Record::Info(InfoRecord {
            evidence: Some(raw.clone()),
            content: None,
            raw,
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Record::Chat(_) => "chat",
            Record::Info(_) => "info",
            Record::Other(Some(t)) => t,
            Record::Other(None) => "",
        }
    }
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// `null`, `false`, `0` and `""` count as absent, as the service's own
/// client treats them.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy_field(value: &Value, key: &str) -> Option<Value> {
    value.get(key).filter(|v| is_truthy(v)).cloned()
}
