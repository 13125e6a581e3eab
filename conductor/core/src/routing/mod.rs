//! Message Routing
//!
//! Decides what to do with each user message before anything touches a
//! provider.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |   user message   |
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |    RouterView    |  <-- selection / gate / mode flags
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |   RULES table    |  <-- ordered, first match wins
//! +--------+---------+
//!          |
//!    +-----+-----+-----------+
//!    |     |     |           |
//!    v     v     v           v
//! select  gate  pipeline    chat
//! ```

pub mod intent;

pub use intent::{classify, Command, PhotoOperation, RouterView};
