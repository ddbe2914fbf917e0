//! Tool registry for toolflow.
//!
//! Separates *knowing* a tool exists from *having loaded* it:
//!
//! - [`discovery`] reads manifests from a manifest file or a directory of
//!   descriptors without loading any implementation
//! - [`ToolRegistry`] holds manifests, resolves implementations through a
//!   static factory table on first use, and caches them
//! - [`builtin`] ships two tiny native tools (`echo`, `delay`) used by the
//!   CLI and by tests

pub mod builtin;
pub mod discovery;
pub mod registry;

pub use builtin::{builtin_registry, register_builtins};
pub use registry::{FnFactory, ToolFactory, ToolRegistry};
