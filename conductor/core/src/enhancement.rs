//! Enhancement Confirmation
//!
//! Any request that would change a previously generated image goes through a
//! two-phase propose/confirm gate:
//!
//! ```text
//! Idle ──request──▶ AwaitingConfirmation ──proceed──▶ (Executing) ──▶ Idle
//!                        │  ▲     │
//!                        │  └─────┘ modify / suggest / unrecognized
//!                        └──cancel──▶ Idle
//! ```
//!
//! The state machine here is pure: every transition consumes the state and
//! returns the next one plus a [`Transition`] describing what the caller must
//! do. Executing the edit is the Conductor's job, which returns the machine
//! to `Idle` whatever the pipeline outcome.

use serde::{Deserialize, Serialize};

use crate::context::AssistantMode;

/// Asked after the user chose "modify"
pub const RESTATE_PROMPT: &str =
    "Sure. Describe the change you'd like instead and I'll show you the plan first.";

/// Asked when a response matched none of the choices
pub const UNRECOGNIZED_PROMPT: &str =
    "Please reply \"proceed\" to apply it, \"cancel\" to drop it, or \"modify\" to describe something different.";

/// Sent when a pending enhancement is discarded
pub const CANCELLED_REPLY: &str = "Okay, I've left the image as it is.";

/// A pending enhancement
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnhancementRequest {
    /// Pending prompt; `None` while waiting for the user to restate it
    pub prompt: Option<String>,
}

/// Enhancement gate state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum EnhancementState {
    /// Nothing pending
    #[default]
    Idle,
    /// A proposal is waiting for the user's answer
    AwaitingConfirmation(EnhancementRequest),
}

/// Responses the user is offered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOption {
    /// Apply the change
    Proceed,
    /// Discard it
    Cancel,
    /// Describe something else
    Modify,
    /// Show ideas
    Suggest,
}

impl ConfirmationOption {
    /// All options in display order
    pub const ALL: [Self; 4] = [Self::Proceed, Self::Cancel, Self::Modify, Self::Suggest];

    /// Button label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Proceed => "Proceed",
            Self::Cancel => "Cancel",
            Self::Modify => "Modify",
            Self::Suggest => "Suggest",
        }
    }
}

/// A parsed answer to a proposal
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmationResponse {
    /// proceed / yes / go / ok
    Proceed,
    /// no / cancel / stop
    Cancel,
    /// change / modify / different
    Modify,
    /// suggest
    Suggest,
    /// Anything else (kept verbatim, it may be a restated prompt)
    Other(String),
}

const CANCEL_WORDS: &[&str] = &["no", "cancel", "stop", "nope"];
const MODIFY_WORDS: &[&str] = &["change", "modify", "different"];
const SUGGEST_WORDS: &[&str] = &["suggest", "suggestion", "suggestions"];
const PROCEED_WORDS: &[&str] = &["proceed", "yes", "go", "ok", "okay"];

impl ConfirmationResponse {
    /// Classify a reply by whole words
    ///
    /// Cancellation wins over modification, which wins over proceeding, so
    /// "yes, but change the sky" is a modification.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();
        let any = |set: &[&str]| words.iter().any(|w| set.contains(w));

        if any(CANCEL_WORDS) {
            Self::Cancel
        } else if any(MODIFY_WORDS) {
            Self::Modify
        } else if any(SUGGEST_WORDS) {
            Self::Suggest
        } else if any(PROCEED_WORDS) {
            Self::Proceed
        } else {
            Self::Other(text.trim().to_string())
        }
    }
}

/// What the gate shows when it opens
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    /// The prompt waiting for confirmation
    pub prompt: String,
    /// Human-readable plan
    pub description: String,
    /// Offered responses
    pub options: Vec<ConfirmationOption>,
}

impl Proposal {
    fn for_prompt(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            description: describe_enhancement(prompt),
            options: ConfirmationOption::ALL.to_vec(),
        }
    }
}

/// Outcome of answering a proposal
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Run the edit pipeline with this prompt
    Execute {
        /// Confirmed prompt
        prompt: String,
    },
    /// The pending prompt was discarded
    Cancelled,
    /// The pending prompt was discarded; ask the user to restate
    Modify,
    /// The user restated; a new proposal is pending
    Restated(Proposal),
    /// Show suggestions, keep waiting
    Suggest,
    /// Not an answer; repeat the choices
    Unrecognized,
}

impl EnhancementState {
    /// Whether a proposal is open
    #[must_use]
    pub fn is_awaiting(&self) -> bool {
        matches!(self, Self::AwaitingConfirmation(_))
    }

    /// The prompt waiting for confirmation
    #[must_use]
    pub fn pending_prompt(&self) -> Option<&str> {
        match self {
            Self::AwaitingConfirmation(request) => request.prompt.as_deref(),
            Self::Idle => None,
        }
    }

    /// Open the gate for a new enhancement prompt
    ///
    /// Replaces anything pending, so there is never more than one request.
    #[must_use]
    pub fn request(self, prompt: &str) -> (Self, Proposal) {
        let proposal = Proposal::for_prompt(prompt);
        let state = Self::AwaitingConfirmation(EnhancementRequest {
            prompt: Some(proposal.prompt.clone()),
        });
        (state, proposal)
    }

    /// Answer the open proposal with an already classified `response`
    ///
    /// `text` is the raw reply; it becomes the new prompt when the user
    /// restates after a modification.
    #[must_use]
    pub fn respond(self, response: ConfirmationResponse, text: &str) -> (Self, Transition) {
        let Self::AwaitingConfirmation(request) = self else {
            return (Self::Idle, Transition::Unrecognized);
        };

        match (request.prompt, response) {
            (_, ConfirmationResponse::Cancel) => (Self::Idle, Transition::Cancelled),
            (prompt, ConfirmationResponse::Suggest) => (
                Self::AwaitingConfirmation(EnhancementRequest { prompt }),
                Transition::Suggest,
            ),
            (Some(prompt), ConfirmationResponse::Proceed) => {
                (Self::Idle, Transition::Execute { prompt })
            }
            (Some(_), ConfirmationResponse::Modify) | (None, ConfirmationResponse::Proceed) => (
                Self::AwaitingConfirmation(EnhancementRequest { prompt: None }),
                Transition::Modify,
            ),
            (Some(prompt), ConfirmationResponse::Other(_)) => (
                Self::AwaitingConfirmation(EnhancementRequest {
                    prompt: Some(prompt),
                }),
                Transition::Unrecognized,
            ),
            (None, ConfirmationResponse::Modify | ConfirmationResponse::Other(_)) => {
                let (state, proposal) = Self::Idle.request(text.trim());
                (state, Transition::Restated(proposal))
            }
        }
    }
}

struct Category {
    cues: &'static [&'static str],
    plan: &'static str,
}

// Checked in order; monochrome precedes color so "black and white colors"
// reads as monochrome.
const CATEGORIES: &[Category] = &[
    Category {
        cues: &["light", "bright", "dark", "shadow", "exposure"],
        plan: "adjust the lighting: balance exposure, lift the shadows and recover highlights",
    },
    Category {
        cues: &["black and white", "monochrome", "grayscale", "greyscale", "b&w"],
        plan: "convert the image to a rich monochrome with deep contrast",
    },
    Category {
        cues: &["color", "colour", "hue", "tint", "warm", "cool"],
        plan: "rework the color grading and white balance for a more pleasing palette",
    },
    Category {
        cues: &["vibran", "vivid", "saturat", "pop"],
        plan: "boost vibrancy and saturation so the colors pop without clipping",
    },
    Category {
        cues: &["professional", "polish", "studio", "clean up"],
        plan: "give the image a professional polish: clean edges, even tones, studio finish",
    },
    Category {
        cues: &["detail", "sharp", "crisp", "clarity", "texture"],
        plan: "bring out fine detail with sharpening and local clarity",
    },
    Category {
        cues: &["composition", "crop", "frame", "framing", "background"],
        plan: "refine the composition and framing around the main subject",
    },
];

/// Describe what an enhancement prompt will do, by keyword category
#[must_use]
pub fn describe_enhancement(prompt: &str) -> String {
    let lower = prompt.to_lowercase();
    let plan = CATEGORIES
        .iter()
        .find(|category| category.cues.iter().any(|cue| lower.contains(cue)))
        .map_or(
            "apply the requested enhancement while keeping the overall look of the image",
            |category| category.plan,
        );
    format!("I'll {plan}. Request: \"{}\". Shall I proceed?", prompt.trim())
}

/// Suggestion list for the current image state
#[must_use]
pub fn suggestions(has_image: bool, mode: AssistantMode) -> Vec<String> {
    let list: &[&str] = match (has_image, mode) {
        (true, _) => &[
            "Enhance the lighting",
            "Make the colors more vibrant",
            "Convert to black and white",
            "Sharpen the details",
            "Give it a professional polish",
        ],
        (false, AssistantMode::Photo) => &[
            "A misty mountain lake at sunrise",
            "A cozy reading nook, warm light, detailed",
            "A portrait in the style of a film photograph",
            "Upscale my uploaded photo",
        ],
        (false, AssistantMode::Chat) => &[
            "Select an image to enhance",
            "Switch to photo mode with /photo",
            "Ask me to describe an image",
        ],
    };
    list.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn awaiting(prompt: &str) -> EnhancementState {
        EnhancementState::Idle.request(prompt).0
    }

    fn answer(state: EnhancementState, text: &str) -> (EnhancementState, Transition) {
        state.respond(ConfirmationResponse::parse(text), text)
    }

    #[test]
    fn test_request_opens_gate() {
        let (state, proposal) = EnhancementState::Idle.request("enhance the lighting");
        assert!(state.is_awaiting());
        assert_eq!(state.pending_prompt(), Some("enhance the lighting"));
        assert!(proposal.description.contains("lighting"));
        assert_eq!(proposal.options, ConfirmationOption::ALL.to_vec());
    }

    #[test]
    fn test_proceed_words_execute() {
        for reply in ["proceed", "Yes please", "go", "ok!"] {
            let (state, transition) = answer(awaiting("fix the colors"), reply);
            assert_eq!(state, EnhancementState::Idle, "answer {reply}");
            assert_eq!(
                transition,
                Transition::Execute {
                    prompt: "fix the colors".to_string()
                }
            );
        }
    }

    #[test]
    fn test_cancel_words_discard() {
        for reply in ["no", "cancel", "stop that"] {
            let (state, transition) = answer(awaiting("fix the colors"), reply);
            assert_eq!(state, EnhancementState::Idle);
            assert_eq!(transition, Transition::Cancelled);
        }
    }

    #[test]
    fn test_modify_then_restate() {
        let (state, transition) =
            answer(awaiting("fix the colors"), "let's do something different");
        assert_eq!(transition, Transition::Modify);
        assert!(state.is_awaiting());
        assert_eq!(state.pending_prompt(), None);

        let (state, transition) = answer(state, "make it black and white");
        match transition {
            Transition::Restated(proposal) => {
                assert!(proposal.description.contains("monochrome"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(state.pending_prompt(), Some("make it black and white"));

        let (state, transition) = answer(state, "yes");
        assert_eq!(state, EnhancementState::Idle);
        assert!(matches!(transition, Transition::Execute { .. }));
    }

    #[test]
    fn test_unrecognized_keeps_waiting() {
        let (state, transition) = answer(awaiting("fix the colors"), "what's the weather?");
        assert_eq!(transition, Transition::Unrecognized);
        assert_eq!(state.pending_prompt(), Some("fix the colors"));
    }

    #[test]
    fn test_suggest_keeps_waiting() {
        let (state, transition) = answer(awaiting("fix the colors"), "suggest something");
        assert_eq!(transition, Transition::Suggest);
        assert_eq!(state.pending_prompt(), Some("fix the colors"));
    }

    #[test]
    fn test_classified_response_decides() {
        // The caller's classification is authoritative, not the wording
        let (state, transition) =
            awaiting("fix the colors").respond(ConfirmationResponse::Proceed, "hmm");
        assert_eq!(state, EnhancementState::Idle);
        assert_eq!(
            transition,
            Transition::Execute {
                prompt: "fix the colors".to_string()
            }
        );
    }

    #[test]
    fn test_whole_word_matching() {
        // "look" must not match "ok", "going" must not match "go"
        assert!(matches!(
            ConfirmationResponse::parse("look again, going further"),
            ConfirmationResponse::Other(_)
        ));
        assert_eq!(
            ConfirmationResponse::parse("yes but change the sky"),
            ConfirmationResponse::Modify
        );
    }

    #[test]
    fn test_descriptions_by_category() {
        assert!(describe_enhancement("more vivid please").contains("vibrancy"));
        assert!(describe_enhancement("make it look professional").contains("professional"));
        assert!(describe_enhancement("sharpen it").contains("detail"));
        assert!(describe_enhancement("better crop").contains("composition"));
        assert!(describe_enhancement("warmer hue").contains("color"));
        assert!(describe_enhancement("improve it").contains("requested enhancement"));
    }

    #[test]
    fn test_suggestions_depend_on_state() {
        assert!(suggestions(true, AssistantMode::Chat)[0].contains("lighting"));
        assert_ne!(
            suggestions(false, AssistantMode::Photo),
            suggestions(false, AssistantMode::Chat)
        );
    }
}
