//! Context window management.
//!
//! The window is the only state handed back to the calling model, so it
//! is kept inside a fixed token capacity. Every append is followed by a
//! synchronous prune; tool executions enter it as one-line summaries, never
//! as raw payloads.
//!
//! | Entry | Priority | Prune order |
//! |-------|----------|-------------|
//! | system | reserved | never |
//! | failed tool call | -1 | first |
//! | anything else | >= 0 | oldest first |

pub mod window;

pub use window::{ContextEntry, ContextPolicy, ContextWindow, SYSTEM_PRIORITY};
