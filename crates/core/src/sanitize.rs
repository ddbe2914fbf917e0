//! Sanitization seam.
//!
//! Privacy filtering (PII tokenization, redaction) is owned by an external
//! collaborator. The core only needs a pure transform it can run over step
//! parameters before dispatch and over payloads headed for telemetry.

/// A side-effect-free transform over a JSON payload.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, value: &serde_json::Value) -> serde_json::Value;
}

/// Passes payloads through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSanitizer;

impl Sanitizer for NoopSanitizer {
    fn sanitize(&self, value: &serde_json::Value) -> serde_json::Value {
        value.clone()
    }
}

impl<F> Sanitizer for F
where
    F: Fn(&serde_json::Value) -> serde_json::Value + Send + Sync,
{
    fn sanitize(&self, value: &serde_json::Value) -> serde_json::Value {
        self(value)
    }
}
