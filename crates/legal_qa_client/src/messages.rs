//! Wire types for the answering service. Client → server JSON request body,
//! server → client SSE record payloads.

use serde::{Deserialize, Serialize};

/// Default number of documents the service retrieves per question.
pub const DEFAULT_MAX_RESULTS: u32 = 5;

/// Client → server: body of `POST /stream`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub question: String,
    pub max_results: u32,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Server → client: JSON object carried by a `data: ` record.
///
/// Every field is optional; the service sends status, sources, content
/// fragments and errors through the same shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StreamPayload {
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Informational; kept as raw JSON so an odd value never costs the
    /// rest of the record.
    #[serde(default)]
    pub doc_count: Option<serde_json::Value>,
}

impl StreamPayload {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Kind of a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A `data: ` record.
    Data,
    /// An `event: <name>` record.
    Named(String),
}

/// One decoded record, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub payload: StreamPayload,
}

impl StreamEvent {
    pub fn data(payload: StreamPayload) -> Self {
        Self {
            kind: EventKind::Data,
            payload,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Named(name.into()),
            payload: StreamPayload::default(),
        }
    }
}
