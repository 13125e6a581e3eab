//! Intent Classification
//!
//! Every user message is classified exactly once into a [`Command`] by an
//! ordered, first-match-wins table of `(predicate, command)` rules. The order
//! is the behavior: [`RULES`] reads top to bottom as the decision procedure.
//!
//! | # | rule                 | requires                                   |
//! |---|----------------------|--------------------------------------------|
//! | 1 | `select_image`       | "select image" / "choose image"            |
//! | 2 | `cancel_selection`   | selection mode + cancellation word         |
//! | 3 | `analyze_image`      | selected image + analysis request          |
//! | 4 | `reset_selection`    | selected image + reset request             |
//! | 5 | `request_enhancement`| selected image + edit verb, no open gate   |
//! | 6 | `confirm_enhancement`| open confirmation gate                     |
//! | 7 | `suggest`            | "suggest"                                  |
//! | 8 | `photo`              | photo mode                                 |
//! | 9 | `chat`               | anything else                              |

use crate::context::ConversationContext;
use crate::enhancement::{ConfirmationResponse, EnhancementState};

const SELECT_PHRASES: &[&str] = &[
    "select image",
    "choose image",
    "select an image",
    "choose an image",
];
const CANCEL_PHRASES: &[&str] = &["cancel", "stop", "exit", "never mind", "nevermind"];
const ANALYSIS_PHRASES: &[&str] = &[
    "analyze",
    "analyse",
    "describe",
    "what's in",
    "what is in",
    "tell me about",
];
const RESET_PHRASES: &[&str] = &["reset", "start over", "clear selection", "deselect"];
const UPSCALE_PHRASES: &[&str] = &[
    "upscale",
    "enlarge",
    "higher resolution",
    "increase resolution",
];

/// Verbs that ask for a change to an existing image (matched as word prefixes)
pub const ENHANCEMENT_VERBS: &[&str] = &[
    "enhance", "improve", "modify", "change", "edit", "fix", "adjust",
];

/// What to do with a photo-mode message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoOperation {
    /// Text-to-image
    Generate,
    /// Edit the source image
    Edit,
    /// Upscale the source image
    Upscale,
}

/// Dispatch decision for one user message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Enter image selection mode
    SelectImage,
    /// Leave selection mode
    CancelSelection,
    /// Describe the selected image
    AnalyzeImage,
    /// Clear selection and enhancement history
    ResetSelection,
    /// Open the enhancement confirmation gate
    RequestEnhancement,
    /// Answer the open confirmation gate
    ConfirmEnhancement(ConfirmationResponse),
    /// Show suggestions
    Suggest,
    /// Photo-mode media operation
    GeneratePhoto(PhotoOperation),
    /// General chat
    Chat,
}

/// The slice of conversation state the router looks at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouterView {
    /// Next image click selects
    pub selection_mode: bool,
    /// An image is selected
    pub has_selected_image: bool,
    /// An image (selected or uploaded) can serve as edit source
    pub has_source_image: bool,
    /// The confirmation gate is open
    pub awaiting_confirmation: bool,
    /// Photo mode is active
    pub photo_mode: bool,
}

impl RouterView {
    /// Build the view from the live state
    #[must_use]
    pub fn new(context: &ConversationContext, enhancement: &EnhancementState) -> Self {
        Self {
            selection_mode: context.selection_mode,
            has_selected_image: context.has_selection(),
            has_source_image: context.source_image().is_some(),
            awaiting_confirmation: enhancement.is_awaiting(),
            photo_mode: context.mode == crate::context::AssistantMode::Photo,
        }
    }
}

/// Preprocessed message handed to every rule
struct Input<'a> {
    raw: &'a str,
    lower: String,
    view: &'a RouterView,
}

impl Input<'_> {
    fn has_phrase(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.lower.contains(p))
    }

    fn has_verb(&self, verbs: &[&str]) -> bool {
        self.lower
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| verbs.iter().any(|v| word.starts_with(v)))
    }
}

/// One row of the decision table
pub struct Rule {
    /// Rule name (for logs)
    pub name: &'static str,
    matches: fn(&Input<'_>) -> bool,
    command: fn(&Input<'_>) -> Command,
}

/// The decision table, evaluated top to bottom
pub static RULES: &[Rule] = &[
    Rule {
        name: "select_image",
        matches: |i| i.has_phrase(SELECT_PHRASES),
        command: |_| Command::SelectImage,
    },
    Rule {
        name: "cancel_selection",
        matches: |i| i.view.selection_mode && i.has_phrase(CANCEL_PHRASES),
        command: |_| Command::CancelSelection,
    },
    Rule {
        name: "analyze_image",
        matches: |i| i.view.has_selected_image && i.has_phrase(ANALYSIS_PHRASES),
        command: |_| Command::AnalyzeImage,
    },
    Rule {
        name: "reset_selection",
        matches: |i| i.view.has_selected_image && i.has_phrase(RESET_PHRASES),
        command: |_| Command::ResetSelection,
    },
    Rule {
        name: "request_enhancement",
        matches: |i| {
            i.view.has_selected_image
                && !i.view.awaiting_confirmation
                && i.has_verb(ENHANCEMENT_VERBS)
        },
        command: |_| Command::RequestEnhancement,
    },
    Rule {
        name: "confirm_enhancement",
        matches: |i| i.view.awaiting_confirmation,
        command: |i| Command::ConfirmEnhancement(ConfirmationResponse::parse(i.raw)),
    },
    Rule {
        name: "suggest",
        matches: |i| i.lower.contains("suggest"),
        command: |_| Command::Suggest,
    },
    Rule {
        name: "photo",
        matches: |i| i.view.photo_mode,
        command: photo_operation,
    },
    Rule {
        name: "chat",
        matches: |_| true,
        command: |_| Command::Chat,
    },
];

fn photo_operation(input: &Input<'_>) -> Command {
    let op = if input.view.has_source_image && input.has_phrase(UPSCALE_PHRASES) {
        PhotoOperation::Upscale
    } else if input.view.has_source_image && input.has_verb(ENHANCEMENT_VERBS) {
        PhotoOperation::Edit
    } else {
        PhotoOperation::Generate
    };
    Command::GeneratePhoto(op)
}

/// Classify one message against the current view
#[must_use]
pub fn classify(text: &str, view: &RouterView) -> Command {
    let input = Input {
        raw: text,
        lower: text.to_lowercase(),
        view,
    };

    for rule in RULES {
        if (rule.matches)(&input) {
            let command = (rule.command)(&input);
            tracing::debug!(rule = rule.name, command = ?command, "Classified message");
            return command;
        }
    }

    // The last rule always matches
    Command::Chat
}
