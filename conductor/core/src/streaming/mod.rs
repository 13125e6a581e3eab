//! Streaming Responses
//!
//! Text responses arrive as an incremental delta stream. The coordinator
//! appends one assistant message on the first delta and grows it in place,
//! so the rendering layer sees the message "typing".
//!
//! # Flow
//!
//! ```text
//!  send_streaming ──▶ Token ──▶ Token ──▶ ... ──▶ Complete ──▶ StreamEnd
//!        │                 │
//!        │ transport error │ transport error
//!        ▼                 ▼
//!   remove placeholder, retry once with send() ──▶ Message
//! ```
//!
//! Provider-level failures (an HTTP status) are surfaced without a retry.
//! Every read races the caller's `CancellationToken`.

mod coordinator;

pub use coordinator::{StreamOutcome, StreamingCoordinator};

// Re-export StreamingToken from backend for convenience
pub use crate::backend::StreamingToken;
