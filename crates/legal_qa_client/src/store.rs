//! In-memory conversation store.
//!
//! `ConversationStore` is the only owner of conversations and the only place
//! they are mutated. Every operation is synchronous and performs no I/O.
//! `SharedStore` is the handle the orchestrator and presentation layers share:
//! it serialises mutations and bumps a revision counter observers can wait on.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::conversation::{Conversation, ConversationId, Message, MessageId, MessagePatch};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    #[error("message {message} not found in conversation {conversation}")]
    MessageNotFound {
        conversation: ConversationId,
        message: MessageId,
    },
    #[error("message {message} already exists in conversation {conversation}")]
    DuplicateMessage {
        conversation: ConversationId,
        message: MessageId,
    },
    #[error("conversation {0} already has a streaming message")]
    AlreadyStreaming(ConversationId),
}

/// Conversations (newest first) and the current selection.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    selected: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty conversation and select it.
    pub fn create(&mut self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id;
        self.conversations.insert(0, conversation);
        self.selected = Some(id);
        tracing::debug!(conversation = %id, "conversation created");
        id
    }

    /// `None` clears the selection. An unknown id leaves it unchanged and
    /// returns `false`.
    pub fn select(&mut self, id: Option<ConversationId>) -> bool {
        match id {
            None => {
                self.selected = None;
                true
            }
            Some(id) if self.get(id).is_some() => {
                self.selected = Some(id);
                true
            }
            Some(_) => false,
        }
    }

    /// Remove a conversation. Returns `false` if it did not exist.
    pub fn delete(&mut self, id: ConversationId) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        before != self.conversations.len()
    }

    pub fn set_title(
        &mut self,
        id: ConversationId,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        let conversation = self.get_mut(id)?;
        conversation.title = title.into();
        conversation.touch();
        Ok(())
    }

    pub fn append_message(
        &mut self,
        id: ConversationId,
        message: Message,
    ) -> Result<(), StoreError> {
        let conversation = self.get_mut(id)?;
        if conversation.message(message.id).is_some() {
            return Err(StoreError::DuplicateMessage {
                conversation: id,
                message: message.id,
            });
        }
        if message.is_streaming && conversation.streaming_message().is_some() {
            return Err(StoreError::AlreadyStreaming(id));
        }
        conversation.messages.push(message);
        conversation.touch();
        Ok(())
    }

    pub fn patch_message(
        &mut self,
        id: ConversationId,
        message_id: MessageId,
        patch: MessagePatch,
    ) -> Result<(), StoreError> {
        let conversation = self.get_mut(id)?;
        if patch.is_streaming == Some(true)
            && conversation
                .streaming_message()
                .is_some_and(|m| m.id != message_id)
        {
            return Err(StoreError::AlreadyStreaming(id));
        }
        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(StoreError::MessageNotFound {
                conversation: id,
                message: message_id,
            })?;
        message.apply(patch);
        conversation.touch();
        Ok(())
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    fn get_mut(&mut self, id: ConversationId) -> Result<&mut Conversation, StoreError> {
        self.conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::ConversationNotFound(id))
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn selected_id(&self) -> Option<ConversationId> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Conversation> {
        self.selected.and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

/// Cloneable, observable handle to a `ConversationStore`.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<ConversationStore>>,
    revision: Arc<watch::Sender<u64>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::from_store(ConversationStore::new())
    }

    pub fn from_store(store: ConversationStore) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Mutex::new(store)),
            revision: Arc::new(revision),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversationStore> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn read<R>(&self, f: impl FnOnce(&ConversationStore) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate the store, then notify subscribers.
    pub fn update<R>(&self, f: impl FnOnce(&mut ConversationStore) -> R) -> R {
        let result = f(&mut self.lock());
        self.bump();
        result
    }

    /// Like `update`, but subscribers are only notified on `Ok`. `f` must
    /// leave the store untouched when it fails.
    pub fn try_update<T, E>(
        &self,
        f: impl FnOnce(&mut ConversationStore) -> Result<T, E>,
    ) -> Result<T, E> {
        let result = f(&mut self.lock());
        if result.is_ok() {
            self.bump();
        }
        result
    }

    /// Like `update` for operations that report whether they changed anything.
    pub fn update_if(&self, f: impl FnOnce(&mut ConversationStore) -> bool) -> bool {
        let changed = f(&mut self.lock());
        if changed {
            self.bump();
        }
        changed
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Receiver that changes after every successful mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn snapshot(&self) -> ConversationStore {
        self.lock().clone()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}
