//! Context Window Manager
//!
//! Decides which part of the history goes into a text request, and writes the
//! system prompt that frames it.
//!
//! # Selection
//!
//! ```text
//!   history ─▶ compress (> 50 msgs) ─▶ relevance filter ─▶ budget ─▶ turns
//!                   │                       │                  │
//!           oldest replaced by      older than the last 4   10 or 15,
//!           one summary turn        dropped when unrelated  halved when degraded
//! ```
//!
//! The summary turn counts against the budget, so the output never exceeds
//! the window size.

use std::collections::{HashMap, HashSet};

use crate::backend::{ChatRole, ChatTurn};
use crate::context::{AssistantMode, ConversationContext, ExpertiseLevel, ResponseStyle, Tone, Verbosity};
use crate::messages::MessageRole;
use crate::session::ConversationMessage;

/// Most recent messages that are kept regardless of relevance
pub const ALWAYS_KEEP: usize = 4;

/// Minimum word overlap for an older message to stay
pub const RELEVANCE_THRESHOLD: f32 = 0.1;

/// History length above which older messages are summarized
pub const COMPRESSION_THRESHOLD: usize = 50;

/// Messages kept verbatim when summarizing
pub const COMPRESSION_KEEP: usize = 20;

/// Window for ordinary conversations
pub const BASE_WINDOW: usize = 10;

/// Window for complex conversations
pub const COMPLEX_WINDOW: usize = 15;

/// Smallest window, even when degraded
pub const MIN_WINDOW: usize = 6;

/// Score at which a conversation counts as complex
pub const COMPLEXITY_THRESHOLD: f32 = 0.5;

const SUMMARY_TOPICS: usize = 5;
const SUMMARY_EXCERPTS: usize = 3;
const EXCERPT_CHARS: usize = 120;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now", "own", "see",
    "way", "who", "did", "get", "let", "say", "she", "too", "use", "that", "this", "with", "have",
    "from", "they", "will", "would", "there", "their", "what", "about", "which", "when", "make",
    "like", "time", "just", "know", "take", "into", "your", "some", "could", "them", "than",
    "then", "look", "only", "come", "over", "think", "also", "back", "after", "work", "first",
    "well", "even", "want", "because", "these", "give", "most", "been", "were", "does", "should",
    "please", "thanks", "thank", "really", "very", "much", "more", "here", "where", "why", "yes",
];

const TECHNICAL_TERMS: &[&str] = &[
    "algorithm", "api", "async", "compile", "compiler", "database", "deploy", "function",
    "kernel", "latency", "memory", "protocol", "query", "recursion", "regex", "runtime", "schema",
    "server", "struct", "thread", "variable", "concurrency", "pointer", "binary", "hash",
];

const MATH_TERMS: &[&str] = &[
    "algebra", "calculus", "derivative", "equation", "integral", "matrix", "probability", "proof",
    "theorem", "vector", "logarithm", "polynomial", "eigenvalue", "statistics", "variance",
];

const BEGINNER_CUES: &[&str] = &[
    "i'm new", "i am new", "beginner", "don't understand", "what does", "eli5", "simple terms",
    "never used",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "how", "why", "when", "where", "which", "who", "can", "could", "should", "is", "are",
    "does", "do",
];

// ============================================================================
// Words
// ============================================================================

/// Lowercased words of `text`, in order
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| !w.is_empty())
}

/// Words that carry meaning: longer than two characters and not stop words
pub fn content_words(text: &str) -> Vec<String> {
    words(text)
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

/// Most frequent content words, ties broken by first appearance
fn top_words<'a>(texts: impl Iterator<Item = &'a str>, min_len: usize, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0;
    for text in texts {
        for word in content_words(text) {
            if word.chars().count() < min_len || word.chars().all(char::is_numeric) {
                continue;
            }
            let entry = counts.entry(word).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

// ============================================================================
// Complexity
// ============================================================================

/// How demanding the conversation is, from 0.0 to 1.0
///
/// Three parts: technical or mathematical vocabulary (up to 0.4), average
/// message length (up to 0.3), and code fences (0.3).
pub fn complexity_score(messages: &[ConversationMessage], input: &str) -> f32 {
    let texts: Vec<&str> = messages
        .iter()
        .map(ConversationMessage::content)
        .chain(std::iter::once(input))
        .collect();

    let vocabulary_hits = texts
        .iter()
        .flat_map(|t| words(t))
        .filter(|w| TECHNICAL_TERMS.contains(&w.as_str()) || MATH_TERMS.contains(&w.as_str()))
        .count();
    let vocabulary = (vocabulary_hits as f32 / 3.0).min(1.0) * 0.4;

    let total_chars: usize = texts.iter().map(|t| t.chars().count()).sum();
    let average = total_chars as f32 / texts.len() as f32;
    let length = (average / 400.0).min(1.0) * 0.3;

    let code = if texts.iter().any(|t| t.contains("```")) {
        0.3
    } else {
        0.0
    };

    (vocabulary + length + code).min(1.0)
}

/// Number of turns to send
#[must_use]
pub fn window_size(complexity: f32, degraded: bool) -> usize {
    let base = if complexity >= COMPLEXITY_THRESHOLD {
        COMPLEX_WINDOW
    } else {
        BASE_WINDOW
    };
    if degraded {
        (base / 2).max(MIN_WINDOW)
    } else {
        base
    }
}

// ============================================================================
// Relevance and compression
// ============================================================================

/// Share of the input's content words that also appear in `text`
///
/// An input without content words makes everything relevant.
pub fn relevance(text: &str, input_words: &HashSet<String>) -> f32 {
    if input_words.is_empty() {
        return 1.0;
    }
    let own: HashSet<String> = content_words(text).into_iter().collect();
    let shared = input_words.intersection(&own).count();
    shared as f32 / input_words.len() as f32
}

fn first_sentence(text: &str) -> &str {
    let text = text.trim();
    match text.find(['.', '!', '?']) {
        Some(end) => &text[..=end],
        None => text,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// One system-role turn standing in for `messages`
pub fn summarize(messages: &[&ConversationMessage]) -> ChatTurn {
    let topics = top_words(messages.iter().map(|m| m.content()), 4, SUMMARY_TOPICS);

    let mut user_messages: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .map(|m| m.content())
        .filter(|c| !c.trim().is_empty())
        .collect();
    user_messages.sort_by_key(|c| std::cmp::Reverse(c.chars().count()));

    let mut summary = format!(
        "Summary of {} earlier messages.\nTopics: {}",
        messages.len(),
        if topics.is_empty() {
            "none".to_string()
        } else {
            topics.join(", ")
        }
    );
    let excerpts: Vec<String> = user_messages
        .into_iter()
        .take(SUMMARY_EXCERPTS)
        .map(|c| truncate_chars(first_sentence(c), EXCERPT_CHARS))
        .collect();
    if !excerpts.is_empty() {
        summary.push_str("\nKey points:");
        for excerpt in excerpts {
            summary.push_str("\n- ");
            summary.push_str(&excerpt);
        }
    }

    ChatTurn::new(ChatRole::System, summary)
}

fn to_turn(message: &ConversationMessage) -> ChatTurn {
    let role = match message.role {
        MessageRole::User => ChatRole::User,
        MessageRole::Assistant => ChatRole::Assistant,
    };
    ChatTurn::new(role, message.content())
}

/// The turns chosen for one request
#[derive(Clone, Debug, PartialEq)]
pub struct ContextWindow {
    /// Turns to send, oldest first
    pub turns: Vec<ChatTurn>,
    /// Budget the turns were cut to
    pub window: usize,
    /// Score the budget came from
    pub complexity: f32,
    /// Whether a summary turn was synthesized
    pub summarized: bool,
}

/// Select the turns for a request
///
/// `history` is the completed conversation including the current user
/// message; `input` is that message's text.
pub fn build_window(history: &[ConversationMessage], input: &str, degraded: bool) -> ContextWindow {
    let complexity = complexity_score(history, input);
    let window = window_size(complexity, degraded);

    let mut messages: Vec<&ConversationMessage> = history
        .iter()
        .filter(|m| !m.streaming && !m.content().trim().is_empty())
        .collect();

    let summary = if messages.len() > COMPRESSION_THRESHOLD {
        let split = messages.len() - COMPRESSION_KEEP;
        let summary = summarize(&messages[..split]);
        messages.drain(..split);
        Some(summary)
    } else {
        None
    };

    let input_words: HashSet<String> = content_words(input).into_iter().collect();
    let protected_from = messages.len().saturating_sub(ALWAYS_KEEP);
    let before = messages.len();
    let kept: Vec<&ConversationMessage> = messages
        .into_iter()
        .enumerate()
        .filter(|(i, m)| {
            *i >= protected_from || relevance(m.content(), &input_words) >= RELEVANCE_THRESHOLD
        })
        .map(|(_, m)| m)
        .collect();
    let irrelevant = before - kept.len();

    let budget = window - usize::from(summary.is_some());
    let skip = kept.len().saturating_sub(budget);
    let summarized = summary.is_some();

    let turns: Vec<ChatTurn> = summary
        .into_iter()
        .chain(kept[skip..].iter().map(|m| to_turn(m)))
        .collect();

    tracing::debug!(
        complexity,
        window,
        summarized,
        irrelevant,
        over_budget = skip,
        turns = turns.len(),
        "Built context window"
    );

    ContextWindow {
        turns,
        window,
        complexity,
        summarized,
    }
}

// ============================================================================
// Inference
// ============================================================================

/// Topics mentioned in one message, most frequent first
pub fn infer_topics(text: &str) -> Vec<String> {
    top_words(std::iter::once(text), 4, 3)
}

/// Expertise suggested by one message, if it suggests any
pub fn infer_expertise(text: &str) -> Option<ExpertiseLevel> {
    let lower = text.to_lowercase();
    if BEGINNER_CUES.iter().any(|c| lower.contains(c)) {
        return Some(ExpertiseLevel::Beginner);
    }
    let domain_terms = words(&lower)
        .filter(|w| TECHNICAL_TERMS.contains(&w.as_str()) || MATH_TERMS.contains(&w.as_str()))
        .count();
    (domain_terms >= 3).then_some(ExpertiseLevel::Expert)
}

/// Opening words of a question ("how do i"), or `None` for statements
pub fn question_pattern(text: &str) -> Option<String> {
    let opening: Vec<String> = words(text).take(3).collect();
    let first = opening.first()?;
    if QUESTION_WORDS.contains(&first.as_str()) || text.trim_end().ends_with('?') {
        Some(opening.join(" "))
    } else {
        None
    }
}

/// Recent topics and question patterns, as one line for the system prompt
pub fn digest(context: &ConversationContext) -> String {
    let mut parts = Vec::new();
    if !context.topics.is_empty() {
        let recent: Vec<&str> = context.topics.iter().rev().take(5).map(String::as_str).collect();
        parts.push(format!("Recent topics: {}.", recent.join(", ")));
    }
    if !context.question_patterns.is_empty() {
        let recent: Vec<String> = context
            .question_patterns
            .iter()
            .rev()
            .take(3)
            .map(|q| format!("\"{q}\""))
            .collect();
        parts.push(format!("Recent questions start with {}.", recent.join(", ")));
    }
    parts.join(" ")
}

// ============================================================================
// System prompt
// ============================================================================

/// System prompt for a text request
pub fn build_system_prompt(
    mode: AssistantMode,
    expertise: ExpertiseLevel,
    style: ResponseStyle,
    digest: &str,
) -> String {
    let mut prompt = String::from(match mode {
        AssistantMode::Chat => {
            "You are a helpful creative assistant. The conversation may include images the user generated or uploaded."
        }
        AssistantMode::Photo => {
            "You are a photo assistant. The user describes images to create or change; keep replies short and say what was done."
        }
    });

    prompt.push(' ');
    prompt.push_str(match expertise {
        ExpertiseLevel::Beginner => "The user is new to the subject; avoid jargon and define terms.",
        ExpertiseLevel::Intermediate => "The user knows the basics.",
        ExpertiseLevel::Expert => "The user is an expert; be precise and skip the basics.",
    });

    prompt.push(' ');
    prompt.push_str(match style.verbosity {
        Verbosity::Concise => "Answer briefly.",
        Verbosity::Balanced => "Answer at moderate length.",
        Verbosity::Detailed => "Answer thoroughly, with detail and examples.",
    });

    prompt.push(' ');
    prompt.push_str(match style.tone {
        Tone::Friendly => "Use a warm, friendly tone.",
        Tone::Formal => "Use a formal, professional tone.",
        Tone::Casual => "Keep the tone casual.",
        Tone::Simple => "Use plain, simple words.",
    });

    if !digest.is_empty() {
        prompt.push(' ');
        prompt.push_str(digest);
    }
    prompt
}
