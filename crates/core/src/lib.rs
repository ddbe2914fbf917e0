//! # toolflow Core
//!
//! Domain types, traits, and error definitions shared by every toolflow
//! crate. Nothing here knows about discovery, pruning or scheduling; it
//! only defines the vocabulary the registry, the context window and the
//! workflow executor speak to each other in.
//!
//! ## Seams
//!
//! - [`Tool`]: the single capability interface every tool satisfies
//! - [`Sanitizer`]: pure parameter transform applied before dispatch
//! - [`TokenEstimator`]: pluggable cost function for context entries

pub mod error;
pub mod execution;
pub mod role;
pub mod sanitize;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, ToolError, ToolErrorKind, WorkflowError};
pub use execution::ToolExecution;
pub use role::Role;
pub use sanitize::{NoopSanitizer, Sanitizer};
pub use token::{CharRatioEstimator, TokenEstimator, estimate_tokens};
pub use tool::{FnTool, Tool, ToolCategory, ToolManifest, tool_fn};
