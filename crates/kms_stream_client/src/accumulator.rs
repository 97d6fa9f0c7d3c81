//! Folds decoded records into the running answer and evidence list.

use serde::Serialize;
use serde_json::{json, Value};

use crate::messages::{QueryResponse, Record};

/// `source` label given to evidence synthesized from an `info` record's content.
pub const EVIDENCE_SOURCE: &str = "KMS Evidence";

/// Answer text and evidence as of one point in the stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub answer_text: String,
    pub evidence: Vec<Value>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.answer_text.is_empty() && self.evidence.is_empty()
    }
}

impl From<QueryResponse> for Snapshot {
    fn from(r: QueryResponse) -> Self {
        Self {
            answer_text: r.response.unwrap_or_default(),
            evidence: r.evidence.unwrap_or_default(),
        }
    }
}

/// Apply one record. Text is only ever appended to or replaced; evidence is
/// only ever appended to.
pub fn fold(mut state: Snapshot, record: &Record) -> Snapshot {
    match record {
        Record::Chat(chat) => {
            if let Some(fragment) = &chat.content {
                state.answer_text.push_str(fragment);
            } else if let Some(full) = &chat.response {
                state.answer_text.clone_from(full);
            }
        }
        Record::Info(info) => {
            let item = if let Some(evidence) = &info.evidence {
                evidence.clone()
            } else if let Some(content) = &info.content {
                json!({
                    "type": "evidence",
                    "content": content,
                    "source": EVIDENCE_SOURCE,
                })
            } else {
                info.raw.clone()
            };
            state.evidence.push(item);
        }
        Record::Other(_) => {}
    }
    state
}

/// Per-session owner of the folded state.
#[derive(Debug, Default)]
pub struct Accumulator {
    state: Snapshot,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `record` in and return a copy of the new state.
    pub fn apply(&mut self, record: &Record) -> Snapshot {
        let state = std::mem::take(&mut self.state);
        self.state = fold(state, record);
        self.state.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.clone()
    }

    pub fn reset(&mut self) {
        self.state = Snapshot::default();
    }
}
