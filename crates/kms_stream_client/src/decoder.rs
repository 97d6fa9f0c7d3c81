//! Tolerant payload decoding.
//!
//! KMS emits Python dict literals (`{'type': 'info', ...}`) as often as JSON,
//! and long `content` values are not always quoted consistently. A payload is
//! run through an ordered list of [`DecodeStrategy`]s; the first one that
//! produces a [`Record`] wins. Payloads that defeat every strategy are either
//! rescued as raw evidence or dropped, never fatal to the stream.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::messages::Record;

/// Payloads at most this long are dropped instead of rescued.
pub const DEFAULT_RESCUE_MIN_LEN: usize = 10;

const LOG_PREVIEW_CHARS: usize = 200;

static TYPE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w'"])['"]?type['"]?\s*:\s*['"]([^'"]+)['"]"#).expect("valid type regex")
});
static CONTENT_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[^\w'"])['"]?content['"]?\s*:\s*['"](.+)"#).expect("valid content regex")
});
static PY_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(True|False|None)\b").expect("valid literal regex"));

/// Why one strategy could not decode a payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(String),
    #[error("not a dict literal")]
    NotDictLiteral,
    #[error("no type field found")]
    MissingType,
}

/// One way of turning a payload into a [`Record`].
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, payload: &str) -> Result<Record, DecodeError>;
}

/// `serde_json` on the payload as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrictJson;

impl DecodeStrategy for StrictJson {
    fn name(&self) -> &'static str {
        "strict_json"
    }

    fn decode(&self, payload: &str) -> Result<Record, DecodeError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| DecodeError::Json(e.to_string()))?;
        Ok(Record::from_value(value))
    }
}

/// Rewrites a Python dict literal into JSON, then parses it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DictLiteral;

impl DictLiteral {
    pub fn looks_like_dict(payload: &str) -> bool {
        payload.contains("{'") || payload.contains("': '")
    }

    pub fn to_json_text(payload: &str) -> String {
        let quoted = payload.replace('\'', "\"");
        PY_LITERAL
            .replace_all(&quoted, |caps: &regex::Captures<'_>| match &caps[1] {
                "True" => "true",
                "False" => "false",
                _ => "null",
            })
            .into_owned()
    }
}

impl DecodeStrategy for DictLiteral {
    fn name(&self) -> &'static str {
        "dict_literal"
    }

    fn decode(&self, payload: &str) -> Result<Record, DecodeError> {
        if !Self::looks_like_dict(payload) {
            return Err(DecodeError::NotDictLiteral);
        }
        let value: Value = serde_json::from_str(&Self::to_json_text(payload))
            .map_err(|e| DecodeError::Json(e.to_string()))?;
        Ok(Record::from_value(value))
    }
}

/// Pulls `type` and `content` out with regexes when structure is hopeless.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldExtraction;

impl FieldExtraction {
    /// `content` runs to the end of the payload since it may hold unescaped
    /// quotes; the closing quote (and a dict's `}` right after it) is dropped.
    fn content(payload: &str) -> Option<String> {
        let caps = CONTENT_FIELD.captures(payload)?;
        let mut text = caps.get(1)?.as_str().trim_end();
        if let Some(inner) = text.strip_suffix('}') {
            let inner = inner.trim_end();
            if inner.ends_with(['"', '\'']) {
                text = inner;
            }
        }
        let text = text
            .strip_suffix(['"', '\''])
            .unwrap_or(text);
        Some(text.to_owned())
    }
}

impl DecodeStrategy for FieldExtraction {
    fn name(&self) -> &'static str {
        "field_extraction"
    }

    fn decode(&self, payload: &str) -> Result<Record, DecodeError> {
        let typ = TYPE_FIELD
            .captures(payload)
            .and_then(|c| c.get(1))
            .ok_or(DecodeError::MissingType)?
            .as_str();
        let mut obj = Map::new();
        obj.insert("type".into(), Value::String(typ.to_owned()));
        obj.insert(
            "content".into(),
            Value::String(Self::content(payload).unwrap_or_default()),
        );
        Ok(Record::from_value(Value::Object(obj)))
    }
}

/// Ordered strategy chain plus the last-resort rescue.
pub struct PayloadDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
    rescue_min_len: usize,
}

impl Default for PayloadDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_RESCUE_MIN_LEN)
    }
}

impl std::fmt::Debug for PayloadDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("PayloadDecoder")
            .field("strategies", &names)
            .field("rescue_min_len", &self.rescue_min_len)
            .finish()
    }
}

impl PayloadDecoder {
    /// Standard chain: strict JSON, dict literal repair, field extraction.
    pub fn new(rescue_min_len: usize) -> Self {
        Self::with_strategies(
            vec![
                Box::new(StrictJson),
                Box::new(DictLiteral),
                Box::new(FieldExtraction),
            ],
            rescue_min_len,
        )
    }

    pub fn with_strategies(
        strategies: Vec<Box<dyn DecodeStrategy>>,
        rescue_min_len: usize,
    ) -> Self {
        Self {
            strategies,
            rescue_min_len,
        }
    }

    /// Decode one payload. `None` means the payload was dropped.
    pub fn decode(&self, payload: &str) -> Option<Record> {
        let mut last_err = None;
        for strategy in &self.strategies {
            match strategy.decode(payload) {
                Ok(record) => {
                    tracing::debug!(strategy = strategy.name(), kind = record.kind(), "decoded payload");
                    return Some(record);
                }
                Err(e) => {
                    tracing::trace!(strategy = strategy.name(), error = %e, "strategy failed");
                    last_err = Some(e);
                }
            }
        }

        let preview = preview(payload);
        if payload.chars().count() > self.rescue_min_len {
            tracing::warn!(payload = %preview, error = ?last_err, "undecodable payload kept as raw evidence");
            Some(Record::raw_evidence(payload))
        } else {
            tracing::warn!(payload = %preview, error = ?last_err, "dropping undecodable payload");
            None
        }
    }
}

fn preview(payload: &str) -> String {
    match payload.char_indices().nth(LOG_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &payload[..idx]),
        None => payload.to_owned(),
    }
}
