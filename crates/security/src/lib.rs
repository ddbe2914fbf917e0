//! Privacy helpers for toolflow.
//!
//! Provides:
//! - **Redaction**: a [`Sanitizer`](toolflow_core::Sanitizer) that blanks
//!   values under sensitive keys before tool dispatch and telemetry
//! - **Leakage scan**: detect known secrets in free text

pub mod redact;

pub use redact::{KeyRedactor, REDACTED, mask_secrets, scan_for_leakage};
