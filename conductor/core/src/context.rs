//! Conversation Context
//!
//! Per-conversation state the orchestration core keeps next to the message
//! history: the selected image, the enhancement history, the rolling topic
//! thread, and what the core has learned about the user.
//!
//! # Design Philosophy
//!
//! The context is a plain value. Nothing mutates its fields directly; every
//! change goes through [`ConversationContext::apply`] with a
//! [`ContextCommand`], which consumes the old value and returns the new one.
//! That keeps each transition testable on its own and makes the "at most one
//! selected image" rule a property of the reducer rather than of call sites.

use serde::{Deserialize, Serialize};

use crate::media::MediaRef;

/// Maximum number of topics kept in the rolling thread
pub const MAX_TOPICS: usize = 10;

/// Maximum number of recent question patterns kept
pub const MAX_QUESTION_PATTERNS: usize = 5;

/// What the assistant is doing with free-form input
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    /// General conversation
    #[default]
    Chat,
    /// Every message is an image request
    Photo,
}

impl AssistantMode {
    /// Display name
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Photo => "photo",
        }
    }
}

/// Inferred user expertise
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseLevel {
    /// New to the subject
    Beginner,
    /// Comfortable with the basics
    #[default]
    Intermediate,
    /// Uses domain vocabulary fluently
    Expert,
}

/// How long answers should be
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Short and direct
    Concise,
    /// Default length
    #[default]
    Balanced,
    /// Thorough
    Detailed,
}

/// Register of the answers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Warm and conversational
    #[default]
    Friendly,
    /// Businesslike
    Formal,
    /// Relaxed
    Casual,
    /// Plain words, no jargon
    Simple,
}

/// User response-style preferences
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStyle {
    /// Answer length
    pub verbosity: Verbosity,
    /// Answer register
    pub tone: Tone,
}

impl ResponseStyle {
    /// Apply any explicit style request found in `text`
    ///
    /// Returns `None` when the text carries no preference, so callers can
    /// tell "unchanged" from "changed back to the same value".
    #[must_use]
    pub fn with_preferences_from(self, text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let has = |cues: &[&str]| cues.iter().any(|c| lower.contains(c));

        let mut style = self;
        let mut changed = false;

        if has(&["be concise", "be brief", "shorter answers", "keep it short"]) {
            style.verbosity = Verbosity::Concise;
            changed = true;
        } else if has(&["more detail", "in detail", "elaborate", "longer answers"]) {
            style.verbosity = Verbosity::Detailed;
            changed = true;
        }

        if has(&["explain simply", "simple terms", "like i'm five", "eli5"]) {
            style.tone = Tone::Simple;
            changed = true;
        } else if has(&["be formal", "more professional"]) {
            style.tone = Tone::Formal;
            changed = true;
        } else if has(&["be casual", "more casual"]) {
            style.tone = Tone::Casual;
            changed = true;
        }

        changed.then_some(style)
    }
}

/// One completed enhancement
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnhancementRecord {
    /// Prompt that was executed
    pub prompt: String,
    /// Image it produced
    pub result: MediaRef,
}

/// Transitions on [`ConversationContext`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContextCommand {
    /// The next image click selects an image
    EnterSelectionMode,
    /// Leave selection mode without selecting
    ExitSelectionMode,
    /// Select an image (replaces any previous selection)
    SelectImage(MediaRef),
    /// Clear the selection and the enhancement history
    ClearSelection,
    /// An enhancement finished; its result becomes the selected image
    RecordEnhancement {
        /// Prompt that was executed
        prompt: String,
        /// Resulting image
        result: MediaRef,
    },
    /// The user attached an image
    AttachUpload(MediaRef),
    /// Topics inferred from the latest user message
    NoteTopics(Vec<String>),
    /// A question the user asked
    NoteQuestion(String),
    /// Updated expertise estimate
    SetExpertise(ExpertiseLevel),
    /// Updated style preferences
    SetStyle(ResponseStyle),
    /// Switch between chat and photo mode
    SetMode(AssistantMode),
    /// New chat: drop everything except the mode
    Reset,
}

/// Per-conversation orchestration state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Current mode
    pub mode: AssistantMode,
    /// The image enhancement and analysis target
    pub selected_image: Option<MediaRef>,
    /// Whether the next image click selects
    pub selection_mode: bool,
    /// Most recent upload (photo-mode edit/upscale source)
    pub uploaded_image: Option<MediaRef>,
    /// Completed enhancements, in completion order
    pub enhancement_history: Vec<EnhancementRecord>,
    /// Rolling topic thread, oldest first
    pub topics: Vec<String>,
    /// Recent questions, oldest first
    pub question_patterns: Vec<String>,
    /// Inferred expertise
    pub expertise: ExpertiseLevel,
    /// Style preferences
    pub style: ResponseStyle,
}

impl ConversationContext {
    /// Fresh context in chat mode
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transition
    #[must_use]
    pub fn apply(mut self, command: ContextCommand) -> Self {
        match command {
            ContextCommand::EnterSelectionMode => {
                self.selection_mode = true;
            }
            ContextCommand::ExitSelectionMode => {
                self.selection_mode = false;
            }
            ContextCommand::SelectImage(image) => {
                self.selected_image = Some(image);
                self.selection_mode = false;
            }
            ContextCommand::ClearSelection => {
                self.selected_image = None;
                self.selection_mode = false;
                self.enhancement_history.clear();
            }
            ContextCommand::RecordEnhancement { prompt, result } => {
                self.selected_image = Some(result.clone());
                self.enhancement_history
                    .push(EnhancementRecord { prompt, result });
            }
            ContextCommand::AttachUpload(image) => {
                self.uploaded_image = Some(image);
            }
            ContextCommand::NoteTopics(topics) => {
                for topic in topics {
                    self.topics.retain(|t| t != &topic);
                    self.topics.push(topic);
                }
                let excess = self.topics.len().saturating_sub(MAX_TOPICS);
                self.topics.drain(..excess);
            }
            ContextCommand::NoteQuestion(question) => {
                self.question_patterns.push(question);
                let excess = self
                    .question_patterns
                    .len()
                    .saturating_sub(MAX_QUESTION_PATTERNS);
                self.question_patterns.drain(..excess);
            }
            ContextCommand::SetExpertise(level) => {
                self.expertise = level;
            }
            ContextCommand::SetStyle(style) => {
                self.style = style;
            }
            ContextCommand::SetMode(mode) => {
                self.mode = mode;
            }
            ContextCommand::Reset => {
                return Self {
                    mode: self.mode,
                    ..Self::default()
                };
            }
        }
        self
    }

    /// Image an edit or upscale should operate on: the selection, else the upload
    #[must_use]
    pub fn source_image(&self) -> Option<&MediaRef> {
        self.selected_image.as_ref().or(self.uploaded_image.as_ref())
    }

    /// Whether an image is selected
    #[must_use]
    pub fn has_selection(&self) -> bool {
        self.selected_image.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn image(name: &str) -> MediaRef {
        MediaRef::new(format!("https://img.test/{name}.png"))
    }

    #[test]
    fn test_select_exits_selection_mode() {
        let ctx = ConversationContext::new()
            .apply(ContextCommand::EnterSelectionMode)
            .apply(ContextCommand::SelectImage(image("a")));

        assert!(!ctx.selection_mode);
        assert_eq!(ctx.selected_image, Some(image("a")));
    }

    #[test]
    fn test_single_selection() {
        let ctx = ConversationContext::new()
            .apply(ContextCommand::SelectImage(image("a")))
            .apply(ContextCommand::SelectImage(image("b")));
        assert_eq!(ctx.selected_image, Some(image("b")));
    }

    #[test]
    fn test_record_enhancement_updates_selection() {
        let ctx = ConversationContext::new()
            .apply(ContextCommand::SelectImage(image("a")))
            .apply(ContextCommand::RecordEnhancement {
                prompt: "brighter".to_string(),
                result: image("b"),
            });

        assert_eq!(ctx.selected_image, Some(image("b")));
        assert_eq!(ctx.enhancement_history.len(), 1);
        assert_eq!(ctx.enhancement_history[0].prompt, "brighter");
    }

    #[test]
    fn test_clear_selection_drops_history() {
        let ctx = ConversationContext::new()
            .apply(ContextCommand::RecordEnhancement {
                prompt: "x".to_string(),
                result: image("b"),
            })
            .apply(ContextCommand::ClearSelection);

        assert!(ctx.selected_image.is_none());
        assert!(ctx.enhancement_history.is_empty());
    }

    #[test]
    fn test_topics_bounded_and_deduplicated() {
        let mut ctx = ConversationContext::new();
        for i in 0..15 {
            ctx = ctx.apply(ContextCommand::NoteTopics(vec![format!("topic{i}")]));
        }
        ctx = ctx.apply(ContextCommand::NoteTopics(vec!["topic10".to_string()]));

        assert_eq!(ctx.topics.len(), MAX_TOPICS);
        assert_eq!(ctx.topics.first().map(String::as_str), Some("topic5"));
        assert_eq!(ctx.topics.last().map(String::as_str), Some("topic10"));
    }

    #[test]
    fn test_reset_keeps_mode() {
        let ctx = ConversationContext::new()
            .apply(ContextCommand::SetMode(AssistantMode::Photo))
            .apply(ContextCommand::SelectImage(image("a")))
            .apply(ContextCommand::SetExpertise(ExpertiseLevel::Expert))
            .apply(ContextCommand::Reset);

        assert_eq!(ctx.mode, AssistantMode::Photo);
        assert!(ctx.selected_image.is_none());
        assert_eq!(ctx.expertise, ExpertiseLevel::Intermediate);
    }

    #[test]
    fn test_source_image_prefers_selection() {
        let ctx = ConversationContext::new().apply(ContextCommand::AttachUpload(image("up")));
        assert_eq!(ctx.source_image(), Some(&image("up")));

        let ctx = ctx.apply(ContextCommand::SelectImage(image("sel")));
        assert_eq!(ctx.source_image(), Some(&image("sel")));
    }

    #[test]
    fn test_style_preferences() {
        let style = ResponseStyle::default();
        assert!(style.with_preferences_from("draw a cat").is_none());

        let concise = style.with_preferences_from("Please be concise").unwrap();
        assert_eq!(concise.verbosity, Verbosity::Concise);

        let simple = concise
            .with_preferences_from("explain simply, in detail")
            .unwrap();
        assert_eq!(simple.verbosity, Verbosity::Detailed);
        assert_eq!(simple.tone, Tone::Simple);
    }
}
