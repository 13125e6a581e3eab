//! Session Management
//!
//! A session is one running conversation: its ordered message history, the
//! in-progress streaming slot, and metadata the session store needs.
//!
//! # Design Philosophy
//!
//! Messages are immutable once appended. The single exception is the
//! assistant message currently being streamed, whose text grows in place as
//! deltas arrive and is finalized (or removed) when the stream ends. Nothing
//! else ever edits history, so the rendering layer can treat every other
//! message id as stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::media::MediaRef;
use crate::messages::{MessageId, MessageRole, SessionId};

/// Discriminant of a message body
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text
    Text,
    /// Text plus an image
    Image,
    /// Voice input or synthesized speech
    Voice,
}

/// Message payload, carrying only the fields relevant to its kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Plain text message
    Text {
        /// Message text
        content: String,
    },
    /// Image message with a caption
    Image {
        /// Caption or prompt shown with the image
        caption: String,
        /// The image itself
        image: MediaRef,
    },
    /// Voice message
    Voice {
        /// Transcript of the audio
        transcript: String,
        /// Recorded or synthesized audio (if retained)
        audio: Option<MediaRef>,
    },
}

impl MessageBody {
    /// Text body
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Image body
    pub fn image(caption: impl Into<String>, image: MediaRef) -> Self {
        Self::Image {
            caption: caption.into(),
            image,
        }
    }

    /// Voice body
    pub fn voice(transcript: impl Into<String>, audio: Option<MediaRef>) -> Self {
        Self::Voice {
            transcript: transcript.into(),
            audio,
        }
    }

    /// Which kind of message this is
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::Voice { .. } => MessageKind::Voice,
        }
    }

    /// The textual part of the message (content, caption or transcript)
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } => content,
            Self::Image { caption, .. } => caption,
            Self::Voice { transcript, .. } => transcript,
        }
    }

    /// The attached media reference, if any
    #[must_use]
    pub fn media(&self) -> Option<&MediaRef> {
        match self {
            Self::Text { .. } => None,
            Self::Image { image, .. } => Some(image),
            Self::Voice { audio, .. } => audio.as_ref(),
        }
    }

    fn push_str(&mut self, text: &str) {
        match self {
            Self::Text { content } => content.push_str(text),
            Self::Image { caption, .. } => caption.push_str(text),
            Self::Voice { transcript, .. } => transcript.push_str(text),
        }
    }
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message payload
    pub body: MessageBody,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Whether the message is still being streamed
    pub streaming: bool,
}

impl ConversationMessage {
    /// Create a new message
    pub fn new(role: MessageRole, body: MessageBody) -> Self {
        Self {
            id: MessageId::new(),
            role,
            body,
            timestamp: Utc::now(),
            streaming: false,
        }
    }

    /// Create a new streaming text message (content will be updated)
    pub fn streaming(role: MessageRole) -> Self {
        Self {
            streaming: true,
            ..Self::new(role, MessageBody::text(String::new()))
        }
    }

    /// Text content
    #[must_use]
    pub fn content(&self) -> &str {
        self.body.content()
    }

    /// Message kind
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    fn append(&mut self, text: &str) {
        self.body.push_str(text);
    }
}

/// Session state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Session is active and ready
    Active,
    /// A response is being streamed
    Busy,
    /// Session has ended
    Ended,
}

/// Session metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session was last active
    pub last_active_at: DateTime<Utc>,
    /// Total messages appended (including pruned ones)
    pub message_count: u32,
    /// Model used for this session
    pub model: String,
}

impl SessionMetadata {
    /// Create new metadata
    pub fn new(model: String) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_active_at: now,
            message_count: 0,
            model,
        }
    }

    fn add_message(&mut self) {
        self.message_count += 1;
        self.last_active_at = Utc::now();
    }
}

/// A conversation session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: SessionId,
    /// Session state
    pub state: SessionState,
    /// Session metadata
    pub metadata: SessionMetadata,
    /// Conversation history
    messages: Vec<ConversationMessage>,
    /// Currently streaming message (if any)
    current_streaming_id: Option<MessageId>,
    /// Maximum number of messages to keep (0 = unlimited)
    #[serde(default)]
    max_messages: usize,
}

impl Session {
    /// Create a new session
    pub fn new(model: String) -> Self {
        Self::new_with_limit(model, 0)
    }

    /// Create a new session that keeps at most `max_messages` messages
    pub fn new_with_limit(model: String, max_messages: usize) -> Self {
        Self {
            id: SessionId::new(),
            state: SessionState::Active,
            metadata: SessionMetadata::new(model),
            messages: Vec::new(),
            current_streaming_id: None,
            max_messages,
        }
    }

    /// Append a user message
    pub fn add_user_message(&mut self, body: MessageBody) -> MessageId {
        self.push(ConversationMessage::new(MessageRole::User, body))
    }

    /// Append a complete assistant message
    pub fn add_assistant_message(&mut self, body: MessageBody) -> MessageId {
        self.push(ConversationMessage::new(MessageRole::Assistant, body))
    }

    fn push(&mut self, msg: ConversationMessage) -> MessageId {
        let id = msg.id.clone();
        self.messages.push(msg);
        self.metadata.add_message();
        self.prune_if_needed();
        id
    }

    /// Start a streaming assistant response
    pub fn start_assistant_response(&mut self) -> MessageId {
        let msg = ConversationMessage::streaming(MessageRole::Assistant);
        let id = msg.id.clone();
        self.current_streaming_id = Some(id.clone());
        self.messages.push(msg);
        self.state = SessionState::Busy;
        id
    }

    /// Append to the current streaming response
    pub fn append_streaming(&mut self, text: &str) -> Option<&ConversationMessage> {
        let streaming_id = self.current_streaming_id.as_ref()?;
        let msg = self.messages.iter_mut().find(|m| &m.id == streaming_id)?;
        msg.append(text);
        Some(msg)
    }

    /// Complete the current streaming response
    pub fn complete_streaming(&mut self) -> Option<&ConversationMessage> {
        let streaming_id = self.current_streaming_id.take()?;

        let msg_idx = self.messages.iter().position(|m| m.id == streaming_id)?;
        self.messages[msg_idx].streaming = false;
        self.metadata.add_message();
        self.state = SessionState::Active;

        // Prune after completing (this may invalidate indices)
        self.prune_if_needed();

        self.messages.iter().find(|m| m.id == streaming_id)
    }

    /// Cancel the current streaming response, removing the partial message
    pub fn cancel_streaming(&mut self) -> Option<MessageId> {
        let streaming_id = self.current_streaming_id.take()?;
        self.messages.retain(|m| m.id != streaming_id);
        self.state = SessionState::Active;
        Some(streaming_id)
    }

    /// Check if currently streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.current_streaming_id.is_some()
    }

    /// Get message by ID
    #[must_use]
    pub fn get_message(&self, id: &MessageId) -> Option<&ConversationMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Get all messages
    #[must_use]
    pub fn all_messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// The most recent message
    #[must_use]
    pub fn last_message(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    /// Messages that have finished (excludes the in-progress stream)
    pub fn completed_messages(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter().filter(|m| !m.streaming)
    }

    /// End the session
    pub fn end(&mut self) {
        self.cancel_streaming();
        self.state = SessionState::Ended;
    }

    /// Clear message history (keeps id and model)
    pub fn clear_history(&mut self) {
        self.messages.clear();
        self.current_streaming_id = None;
        self.state = SessionState::Active;
    }

    /// Get current message count
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Remove the oldest messages (never the streaming one) beyond the limit
    fn prune_if_needed(&mut self) {
        if self.max_messages == 0 || self.messages.len() <= self.max_messages {
            return;
        }

        let to_remove = self.messages.len() - self.max_messages;
        let mut removed = 0;
        let streaming_id = self.current_streaming_id.clone();

        self.messages.retain(|msg| {
            if Some(&msg.id) == streaming_id.as_ref() || removed >= to_remove {
                return true;
            }
            removed += 1;
            false
        });

        tracing::debug!(
            removed = removed,
            remaining = self.messages.len(),
            "Pruned session messages by count"
        );
    }
}
