//! Streaming legal Q&A client library: SSE decoding, conversation state and
//! the orchestrator that ties a question to its streamed answer.
//! Used by the `legal-qa` command-line front end.

pub mod client;
pub mod config;
pub mod conversation;
pub mod decoder;
pub mod messages;
pub mod orchestrator;
pub mod store;

pub use client::{AnswerService, ByteStream, ClientError, HttpClient};
pub use config::{default_config_path, ApiSection, Config, ConfigError, QuerySection};
pub use conversation::{
    Conversation, ConversationId, Message, MessageId, MessagePatch, Role, PLACEHOLDER_TITLE,
};
pub use decoder::{decode_all, decode_stream, LineDecoder};
pub use messages::{EventKind, QueryRequest, StreamEvent, StreamPayload};
pub use orchestrator::{ExchangeOutcome, QueryOrchestrator, RejectReason, APOLOGY_MESSAGE};
pub use store::{ConversationStore, SharedStore, StoreError};
pub use tokio_util::sync::CancellationToken;
