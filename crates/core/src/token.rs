//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! This is a coarse stand-in for a real tokenizer; the budget and pruning
//! code only ever talks to [`TokenEstimator`], so an accurate tokenizer can
//! be dropped in without touching them.

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    CharRatioEstimator::default().estimate(text)
}

/// Pluggable cost function for context entries and tool outputs.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;

    /// Estimate tokens for a JSON payload via its compact serialization.
    fn estimate_json(&self, value: &serde_json::Value) -> usize {
        match value {
            serde_json::Value::Null => 0,
            serde_json::Value::String(s) => self.estimate(s),
            other => self.estimate(&other.to_string()),
        }
    }
}

/// `ceil(len / chars_per_token)` over the byte length of the text.
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    pub chars_per_token: usize,
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4 }
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        let ratio = self.chars_per_token.max(1);
        text.len().div_ceil(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn hundred_chars() {
        let text = "a".repeat(100);
        assert_eq!(estimate_tokens(&text), 25);
    }

    #[test]
    fn custom_ratio() {
        let est = CharRatioEstimator { chars_per_token: 2 };
        assert_eq!(est.estimate("abcde"), 3);
    }

    #[test]
    fn json_estimates() {
        let est = CharRatioEstimator::default();
        assert_eq!(est.estimate_json(&json!(null)), 0);
        // Strings are measured without their quotes.
        assert_eq!(est.estimate_json(&json!("abcd")), 1);
        // {"a":1} is 7 characters.
        assert_eq!(est.estimate_json(&json!({"a": 1})), 2);
    }
}
