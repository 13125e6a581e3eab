//! Surface Events
//!
//! Events sent from the rendering surface to the Conductor. Surfaces report
//! what the user did; they don't interpret it. The Conductor decides how to
//! respond and answers with `ConductorMessage`s.

use serde::{Deserialize, Serialize};

use crate::media::MediaRef;
use crate::messages::{EventId, MessageId};

/// Events from the surface to the Conductor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SurfaceEvent {
    // ============================================
    // Connection Events
    // ============================================
    /// Surface connected to Conductor
    Connected {
        /// Event ID
        event_id: EventId,
        /// Surface type identifier
        surface_type: SurfaceType,
    },

    /// Surface disconnecting gracefully
    Disconnected {
        /// Event ID
        event_id: EventId,
        /// Reason for disconnect (optional)
        reason: Option<String>,
    },

    // ============================================
    // User Input Events
    // ============================================
    /// User submitted a text message
    UserMessage {
        /// Event ID
        event_id: EventId,
        /// The message content
        content: String,
    },

    /// User executed a command (e.g., /help, /new)
    UserCommand {
        /// Event ID
        event_id: EventId,
        /// Command name (without leading /)
        command: String,
        /// Command arguments
        args: Vec<String>,
    },

    /// User clicked an image in the conversation
    ImageClicked {
        /// Event ID
        event_id: EventId,
        /// The clicked image
        image: MediaRef,
    },

    /// User attached an image from disk or clipboard
    ImageUploaded {
        /// Event ID
        event_id: EventId,
        /// The uploaded image
        image: MediaRef,
    },

    /// User pressed the microphone button
    StartRecording {
        /// Event ID
        event_id: EventId,
    },

    /// User released the microphone button
    StopRecording {
        /// Event ID
        event_id: EventId,
    },

    /// User asked to hear a message again
    SpeakMessage {
        /// Event ID
        event_id: EventId,
        /// Which message to speak
        message_id: MessageId,
    },

    /// Session store wants a snapshot
    SnapshotRequested {
        /// Event ID
        event_id: EventId,
    },

    /// User requested to quit
    QuitRequested {
        /// Event ID
        event_id: EventId,
    },
}

impl SurfaceEvent {
    /// Generate a new event ID
    #[must_use]
    pub fn new_event_id() -> EventId {
        EventId::new()
    }

    /// Convenience constructor for a user message
    pub fn user_message(content: impl Into<String>) -> Self {
        Self::UserMessage {
            event_id: EventId::new(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a command
    pub fn command(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::UserCommand {
            event_id: EventId::new(),
            command: command.into(),
            args,
        }
    }

    /// Convenience constructor for an image click
    #[must_use]
    pub fn image_clicked(image: MediaRef) -> Self {
        Self::ImageClicked {
            event_id: EventId::new(),
            image,
        }
    }

    /// Parse a raw line of surface input: `/command args...` or a message
    #[must_use]
    pub fn from_input_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(rest) = trimmed.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            let command = parts.next()?.to_lowercase();
            let args = parts.map(str::to_string).collect();
            return Some(Self::command(command, args));
        }

        Some(Self::user_message(trimmed))
    }
}

/// Kind of surface connected to the Conductor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceType {
    /// Terminal line interface
    Cli,
    /// Browser front-end
    Web,
    /// Native desktop shell
    Desktop,
    /// No UI (tests, automation)
    Headless,
}
