//! Ordered conversation log with a single mutable streaming tail

use crate::error::{WidgetError, WidgetResult};
use crate::events::{ConversationEvent, Message, Role};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const EVENT_CAPACITY: usize = 256;

/// Conversation state for one widget instance.
///
/// Render order is vector order. Entries are append-only except the tail
/// assistant message while a stream is being reconciled into it.
pub struct Conversation {
    messages: Vec<Message>,
    /// Id of the tail entry while it is still being streamed
    in_progress: Option<String>,
    thread_id: Option<String>,
    events: broadcast::Sender<ConversationEvent>,
}

impl Conversation {
    pub fn new(thread_id: Option<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            messages: Vec::new(),
            in_progress: None,
            thread_id: thread_id.filter(|id| !id.is_empty()),
            events,
        }
    }

    /// Receive every state change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub(crate) fn sender(&self) -> broadcast::Sender<ConversationEvent> {
        self.events.clone()
    }

    pub(crate) fn notify(&self, event: ConversationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Append a finished message at the tail
    pub fn append(&mut self, message: Message) {
        self.finish_last();
        self.messages.push(message.clone());
        self.notify(ConversationEvent::Appended(message));
    }

    /// Append an empty assistant message that subsequent `update_last`
    /// calls will fill in. Returns its id.
    pub fn begin_assistant(&mut self) -> String {
        self.finish_last();
        let message = Message::assistant(String::new());
        let id = message.id.clone();
        self.messages.push(message.clone());
        self.in_progress = Some(id.clone());
        self.notify(ConversationEvent::Started(message));
        id
    }

    /// Replace the content of the in-progress assistant tail in place.
    /// Id and timestamp are kept.
    pub fn update_last(&mut self, content: impl Into<String>) -> WidgetResult<()> {
        let in_progress = self
            .in_progress
            .as_deref()
            .ok_or(WidgetError::NoMessageInProgress)?;
        let last = self
            .messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant && m.id == in_progress)
            .ok_or(WidgetError::NoMessageInProgress)?;

        last.content = content.into();
        let event = ConversationEvent::Updated {
            id: last.id.clone(),
            content: last.content.clone(),
        };
        self.notify(event);
        Ok(())
    }

    /// Mark the in-progress tail final. Returns it when there was one.
    pub fn finish_last(&mut self) -> Option<Message> {
        let id = self.in_progress.take()?;
        let last = self.messages.last().filter(|m| m.id == id)?.clone();
        self.notify(ConversationEvent::Finalized(last.clone()));
        Some(last)
    }

    pub fn is_streaming(&self) -> bool {
        self.in_progress.is_some()
    }

    /// Discard every entry
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_progress = None;
        self.notify(ConversationEvent::Cleared);
    }

    /// Start a fresh conversation: entries and thread identity both go.
    pub fn reset(&mut self, thread_id: Option<String>) {
        self.clear();
        self.thread_id = thread_id.filter(|id| !id.is_empty());
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// First write wins: a candidate is only taken when no identity is set.
    pub fn adopt_thread_id(&mut self, candidate: &str) -> bool {
        if candidate.is_empty() {
            return false;
        }
        match &self.thread_id {
            Some(current) if current == candidate => false,
            Some(current) => {
                warn!(current = %current, ignored = %candidate, "Keeping existing thread id");
                false
            }
            None => {
                debug!(thread_id = %candidate, "Thread identified");
                self.thread_id = Some(candidate.to_string());
                self.notify(ConversationEvent::ThreadIdentified(candidate.to_string()));
                true
            }
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(None)
    }
}
