//! Conductor Messages
//!
//! Messages sent from the Conductor to the rendering layer. The renderer owns
//! all layout; it receives an append/update stream of conversation messages
//! plus a small set of status flags, and never decides anything itself.

use serde::{Deserialize, Serialize};

use crate::context::AssistantMode;
use crate::enhancement::ConfirmationOption;
use crate::session::ConversationMessage;

/// Messages from Conductor to the rendering layer
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConductorMessage {
    // ============================================
    // Conversation Messages
    // ============================================
    /// A message was appended to the conversation
    Message {
        /// The full message
        message: ConversationMessage,
    },

    /// A streaming delta for an in-progress assistant message
    Token {
        /// Message ID this delta belongs to
        message_id: MessageId,
        /// The delta text
        text: String,
    },

    /// Stream has completed; the message is final
    StreamEnd {
        /// Message ID that completed
        message_id: MessageId,
        /// Final complete content
        final_content: String,
        /// Timing information
        metadata: ResponseMetadata,
    },

    /// A partially streamed message was withdrawn (stream failed or was
    /// replaced by the non-streaming retry)
    MessageRemoved {
        /// Message ID that was removed
        message_id: MessageId,
    },

    /// The enhancement confirmation gate is open
    Confirmation {
        /// Human-readable description of the planned change
        description: String,
        /// Responses the user can give
        options: Vec<ConfirmationOption>,
    },

    /// A list of suggestions the user can pick from
    Suggestions {
        /// Suggestion texts
        suggestions: Vec<String>,
    },

    // ============================================
    // System Messages
    // ============================================
    /// Toast-level notification
    Notify {
        /// Notification level
        level: NotifyLevel,
        /// Title (optional)
        title: Option<String>,
        /// Message content
        message: String,
    },

    /// Status flags changed
    Status {
        /// Current flags
        status: StatusFlags,
    },

    /// Conductor state change
    State {
        /// The new state
        state: ConductorState,
    },

    /// Serializable session snapshot for the external session store
    Snapshot {
        /// The snapshot
        snapshot: SessionSnapshot,
    },

    /// Request surface to quit
    Quit {
        /// Optional goodbye message
        message: Option<String>,
    },
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event identifier (for correlating surface events in logs)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new event ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("evt_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    pub fn new() -> Self {
        Self(format!("session_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// User input
    User,
    /// The assistant
    Assistant,
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Warning
    Warning,
    /// Error
    Error,
    /// Success
    Success,
}

/// Flags the renderer shows next to the conversation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    /// An orchestrated operation is in flight
    pub loading: bool,
    /// The microphone is capturing
    pub recording: bool,
    /// Synthesized audio is playing
    pub speaking: bool,
    /// The next image click selects an image
    pub selection_mode: bool,
}

/// Conductor operational states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorState {
    /// Starting up, not ready
    Initializing,
    /// Ready for input
    Ready,
    /// Waiting on a provider
    Thinking,
    /// Running a media operation
    Rendering,
    /// Shutting down
    ShuttingDown,
}

impl ConductorState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Initializing => "Starting up...",
            Self::Ready => "Ready",
            Self::Thinking => "Thinking...",
            Self::Rendering => "Working on your image...",
            Self::ShuttingDown => "Shutting down...",
        }
    }
}

/// Metadata attached to a completed streamed response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Model that generated this response
    pub model_id: Option<String>,
    /// Response generation time in milliseconds
    pub elapsed_ms: u64,
    /// Number of deltas received
    pub token_count: u32,
    /// Deltas per second (if calculable)
    pub tokens_per_second: Option<f32>,
    /// Whether the answer came from the non-streaming retry
    pub used_fallback: bool,
}

impl ResponseMetadata {
    /// Create metadata with timing info
    #[must_use]
    pub fn with_timing(elapsed_ms: u64, token_count: u32) -> Self {
        let tokens_per_second = if elapsed_ms > 0 {
            Some((token_count as f32 / elapsed_ms as f32) * 1000.0)
        } else {
            None
        };
        Self {
            elapsed_ms,
            token_count,
            tokens_per_second,
            ..Default::default()
        }
    }
}

/// Snapshot handed to the external session store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session ID
    pub session_id: SessionId,
    /// Completed messages in order
    pub messages: Vec<ConversationMessage>,
    /// Current assistant mode
    pub mode: AssistantMode,
    /// Text model in use
    pub model: String,
    /// Title derived from the conversation context
    pub title: String,
}
