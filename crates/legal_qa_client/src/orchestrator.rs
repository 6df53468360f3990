//! Query orchestrator: one question → one streamed answer.
//!
//! The orchestrator appends the user message and an assistant placeholder,
//! opens the answer stream, and folds decoded events into the placeholder
//! until the stream ends, reports an error, fails, or is cancelled. Every
//! failure ends in a finalized assistant message (`is_streaming == false`);
//! nothing is returned to the caller as an error.
//!
//! In-flight exchanges are tracked per conversation, so independent
//! conversations can stream concurrently while a second question to the same
//! conversation is rejected.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::{AnswerService, ClientError};
use crate::conversation::{derive_title, ConversationId, Message, MessageId, MessagePatch};
use crate::decoder::decode_stream;
use crate::messages::{EventKind, QueryRequest, DEFAULT_MAX_RESULTS};
use crate::store::{SharedStore, StoreError};

/// Content shown when the exchange fails at the transport level.
pub const APOLOGY_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Why a question was not submitted. No state was mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    EmptyQuestion,
    /// The conversation already has an exchange in flight.
    Busy(ConversationId),
    /// The conversation disappeared before the messages could be added.
    Unavailable(StoreError),
}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed,
    /// The service reported an error inside the stream.
    ServerError(String),
    /// Opening or reading the stream failed.
    TransportFailed,
    Cancelled,
    Rejected(RejectReason),
}

impl ExchangeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExchangeOutcome::Completed)
    }
}

type InFlight = Arc<Mutex<HashMap<ConversationId, CancellationToken>>>;

fn lock_in_flight(
    in_flight: &Mutex<HashMap<ConversationId, CancellationToken>>,
) -> MutexGuard<'_, HashMap<ConversationId, CancellationToken>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Releases a conversation's in-flight slot on every exit path.
struct InFlightGuard {
    in_flight: InFlight,
    conversation: ConversationId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_in_flight(&self.in_flight).remove(&self.conversation);
    }
}

/// Drives question/answer exchanges against an `AnswerService`.
#[derive(Clone)]
pub struct QueryOrchestrator {
    service: Arc<dyn AnswerService>,
    store: SharedStore,
    in_flight: InFlight,
    max_results: u32,
}

impl QueryOrchestrator {
    pub fn new(service: Arc<dyn AnswerService>, store: SharedStore) -> Self {
        Self {
            service,
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn new_conversation(&self) -> ConversationId {
        self.store.update(|store| store.create())
    }

    pub fn select_conversation(&self, id: Option<ConversationId>) -> bool {
        self.store.update_if(|store| store.select(id))
    }

    /// Cancel any exchange in flight for `id`, then delete the conversation.
    pub fn delete_conversation(&self, id: ConversationId) -> bool {
        self.cancel(id);
        self.store.update_if(|store| store.delete(id))
    }

    /// Abort the exchange in flight for `id`. Returns `false` if none was.
    pub fn cancel(&self, id: ConversationId) -> bool {
        match lock_in_flight(&self.in_flight).get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self, id: ConversationId) -> bool {
        lock_in_flight(&self.in_flight).contains_key(&id)
    }

    pub fn is_any_busy(&self) -> bool {
        !lock_in_flight(&self.in_flight).is_empty()
    }

    /// Ask `question` in the selected conversation (created if none is).
    pub async fn send_message(&self, question: &str) -> ExchangeOutcome {
        self.send_message_with_cancel(question, CancellationToken::new())
            .await
    }

    /// Like `send_message`; cancelling `cancel` aborts the transport request
    /// and finalizes the answer with whatever content has arrived.
    pub async fn send_message_with_cancel(
        &self,
        question: &str,
        cancel: CancellationToken,
    ) -> ExchangeOutcome {
        let question = question.trim();
        if question.is_empty() {
            return ExchangeOutcome::Rejected(RejectReason::EmptyQuestion);
        }

        let (conversation, _guard) = match self.begin(cancel.clone()) {
            Ok(started) => started,
            Err(busy) => {
                tracing::debug!(conversation = %busy, "exchange already in flight; rejecting");
                return ExchangeOutcome::Rejected(RejectReason::Busy(busy));
            }
        };

        let assistant = Message::assistant_placeholder();
        let assistant_id = assistant.id;
        let user = Message::user(question);
        let added = self.store.update(|store| -> Result<(), StoreError> {
            store.append_message(conversation, user)?;
            let first_exchange = store
                .get(conversation)
                .is_some_and(|c| c.messages.len() <= 1);
            store.append_message(conversation, assistant)?;
            if first_exchange {
                store.set_title(conversation, derive_title(question))?;
            }
            Ok(())
        });
        if let Err(e) = added {
            tracing::warn!(conversation = %conversation, error = %e, "could not start exchange");
            return ExchangeOutcome::Rejected(RejectReason::Unavailable(e));
        }

        tracing::info!(conversation = %conversation, message = %assistant_id, "exchange started");
        let outcome = self
            .stream_answer(conversation, assistant_id, question, &cancel)
            .await;
        tracing::info!(conversation = %conversation, ?outcome, "exchange finished");
        outcome
    }

    /// Check-and-set the in-flight slot of the selected conversation.
    fn begin(
        &self,
        cancel: CancellationToken,
    ) -> Result<(ConversationId, InFlightGuard), ConversationId> {
        let mut in_flight = lock_in_flight(&self.in_flight);
        let conversation = match self.store.read(|store| store.selected_id()) {
            Some(id) => id,
            None => self.store.update(|store| store.create()),
        };
        if in_flight.contains_key(&conversation) {
            return Err(conversation);
        }
        in_flight.insert(conversation, cancel);
        Ok((
            conversation,
            InFlightGuard {
                in_flight: self.in_flight.clone(),
                conversation,
            },
        ))
    }

    async fn stream_answer(
        &self,
        conversation: ConversationId,
        message: MessageId,
        question: &str,
        cancel: &CancellationToken,
    ) -> ExchangeOutcome {
        let request = QueryRequest::new(question).with_max_results(self.max_results);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.finish_cancelled(conversation, message),
            opened = self.service.open_stream(&request) => opened,
        };
        let source = match opened {
            Ok(source) => source,
            Err(e) => return self.finish_transport_failure(conversation, message, &e),
        };

        let mut events = pin!(decode_stream(source));
        let mut content = String::new();
        let mut sources: Option<Vec<String>> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.finish_cancelled(conversation, message),
                next = events.next() => next,
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => return self.finish_transport_failure(conversation, message, &e),
                None => break,
            };

            if let EventKind::Named(name) = &event.kind {
                tracing::debug!(event = %name, "stream event");
            }
            let payload = event.payload;
            if let Some(status) = &payload.message {
                tracing::debug!(status = %status, doc_count = ?payload.doc_count, "service status");
            }

            if let Some(latest) = payload.sources {
                sources = Some(latest.clone());
                self.patch(conversation, message, MessagePatch::new().sources(latest));
            }

            if let Some(fragment) = payload.content.filter(|c| !c.is_empty()) {
                content.push_str(&fragment);
                let mut patch = MessagePatch::new().content(content.clone()).streaming(true);
                if let Some(known) = &sources {
                    patch = patch.sources(known.clone());
                }
                self.patch(conversation, message, patch);
            }

            if let Some(error) = payload.error.filter(|e| !e.is_empty()) {
                tracing::warn!(conversation = %conversation, error = %error, "service reported an error");
                self.patch(
                    conversation,
                    message,
                    MessagePatch::new()
                        .content(format!("Error: {}", error))
                        .streaming(false),
                );
                return ExchangeOutcome::ServerError(error);
            }
        }

        self.patch(conversation, message, MessagePatch::finished());
        ExchangeOutcome::Completed
    }

    fn finish_cancelled(&self, conversation: ConversationId, message: MessageId) -> ExchangeOutcome {
        tracing::info!(conversation = %conversation, "exchange cancelled");
        self.patch(conversation, message, MessagePatch::finished());
        ExchangeOutcome::Cancelled
    }

    fn finish_transport_failure(
        &self,
        conversation: ConversationId,
        message: MessageId,
        error: &ClientError,
    ) -> ExchangeOutcome {
        tracing::warn!(conversation = %conversation, error = %error, "answer stream failed");
        self.patch(
            conversation,
            message,
            MessagePatch::new().content(APOLOGY_MESSAGE).streaming(false),
        );
        ExchangeOutcome::TransportFailed
    }

    /// Apply a patch; a conversation deleted mid-stream is not an error here.
    fn patch(&self, conversation: ConversationId, message: MessageId, patch: MessagePatch) {
        if let Err(e) = self
            .store
            .try_update(|store| store.patch_message(conversation, message, patch))
        {
            tracing::debug!(error = %e, "dropping patch");
        }
    }
}
