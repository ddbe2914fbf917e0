//! The agent engine: composition root of toolflow.
//!
//! 1. **Describe** the enabled tools in a system preamble (manifests only,
//!    nothing is loaded)
//! 2. **Execute** a workflow against the shared context window
//! 3. **Report** the sanitized executions and the result to every sink
//!
//! The registry is injected, so several engines can share one registry
//! while each keeps its own context window.

pub mod engine;
pub mod preamble;

pub use engine::AgentEngine;
pub use preamble::build_preamble;
