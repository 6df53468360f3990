//! Conversation and message model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title a conversation carries until its first question is asked.
pub const PLACEHOLDER_TITLE: &str = "New Legal Query";

/// Unique identifier for a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sources: Option<Vec<String>>,
    pub is_streaming: bool,
}

impl Message {
    /// A finished user question.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            sources: None,
            is_streaming: false,
        }
    }

    /// Empty assistant message that the answer stream fills in.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            sources: None,
            is_streaming: true,
        }
    }

    /// Merge `patch` into this message; set fields overwrite, unset fields are kept.
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(sources) = patch.sources {
            self.sources = Some(sources);
        }
        if let Some(is_streaming) = patch.is_streaming {
            self.is_streaming = is_streaming;
        }
    }
}

/// Partial update of a `Message`. Each field is last-writer-wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub sources: Option<Vec<String>>,
    pub is_streaming: Option<bool>,
}

impl MessagePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn streaming(mut self, is_streaming: bool) -> Self {
        self.is_streaming = Some(is_streaming);
        self
    }

    /// Patch that finalizes a message without touching its content.
    pub fn finished() -> Self {
        Self::new().streaming(false)
    }

    /// Combine with a later patch; fields set in `later` win.
    pub fn then(self, later: MessagePatch) -> Self {
        Self {
            content: later.content.or(self.content),
            sources: later.sources.or(self.sources),
            is_streaming: later.is_streaming.or(self.is_streaming),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// An ordered question/answer history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: PLACEHOLDER_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The message currently receiving stream output, if any.
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Refresh `updated_at`; never moves it backwards.
    pub(crate) fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title for a conversation derived from its first question: at most 50
/// characters, with `...` appended when the question was longer.
pub fn derive_title(question: &str) -> String {
    const MAX_TITLE_CHARS: usize = 50;

    let mut title: String = question.chars().take(MAX_TITLE_CHARS).collect();
    if question.chars().count() > MAX_TITLE_CHARS {
        title.push_str("...");
    }
    title
}
