//! The context window and its pruning algorithm.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use toolflow_core::execution::ToolExecution;
use toolflow_core::role::Role;
use toolflow_core::token::{CharRatioEstimator, TokenEstimator};
use tracing::debug;

/// Priority recorded on system entries. Informational only: system entries
/// are exempt from pruning by role, whatever their priority.
pub const SYSTEM_PRIORITY: i32 = i32::MAX;

/// Priority of a successful tool summary.
const TOOL_SUCCESS_PRIORITY: i32 = 1;

/// Priority of a failed tool summary.
const TOOL_FAILURE_PRIORITY: i32 = -1;

// ── Data Structures ───────────────────────────────────────────────────────

/// One unit of conversational or execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Monotonic id within the owning window.
    pub id: u64,
    pub role: Role,
    pub content: String,
    /// Estimated token cost of `content`.
    pub tokens: usize,
    pub created_at: DateTime<Utc>,
    /// `>= 0` keep, `< 0` prune first.
    pub priority: i32,
    /// Whether `content` has been replaced by a summary.
    #[serde(default)]
    pub compressed: bool,
}

impl ContextEntry {
    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Compression settings.
#[derive(Debug, Clone)]
pub struct ContextPolicy {
    /// Entries at least this old are compressed.
    pub stale_after: Duration,
    /// Compression is a no-op below this many entries.
    pub compress_min_entries: usize,
    /// Longest summary kept for a compressed entry.
    pub summary_chars: usize,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(300),
            compress_min_entries: 10,
            summary_chars: 120,
        }
    }
}

#[derive(Default)]
struct WindowState {
    entries: Vec<ContextEntry>,
    current_tokens: usize,
    next_id: u64,
    executions: Vec<ToolExecution>,
    tokens_consumed: usize,
}

impl WindowState {
    fn push(&mut self, role: Role, content: String, tokens: usize, priority: i32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(ContextEntry {
            id,
            role,
            content,
            tokens,
            created_at: Utc::now(),
            priority,
            compressed: false,
        });
        self.current_tokens += tokens;
        id
    }

    /// Remove entries until the total fits `capacity`.
    ///
    /// Negative-priority entries go first (oldest first among them), then
    /// the oldest non-system entry. System entries are never removed; if
    /// only they remain, the window is allowed to stay over capacity.
    fn prune(&mut self, capacity: usize) -> usize {
        let mut removed = 0;
        while self.current_tokens > capacity {
            let victim = self
                .entries
                .iter()
                .position(|e| !e.is_system() && e.priority < 0)
                .or_else(|| self.entries.iter().position(|e| !e.is_system()));
            let Some(idx) = victim else {
                break;
            };
            let entry = self.entries.remove(idx);
            self.current_tokens -= entry.tokens;
            removed += 1;
        }

        assert!(
            self.current_tokens <= capacity || self.entries.iter().all(ContextEntry::is_system),
            "context window over capacity with prunable entries left"
        );
        removed
    }
}

// ── Window ────────────────────────────────────────────────────────────────

/// A bounded, priority-pruned log of role-tagged entries.
///
/// All mutation happens under one lock, so append-then-prune is atomic
/// for every reader. Share it behind an `Arc`.
pub struct ContextWindow {
    capacity: usize,
    policy: ContextPolicy,
    estimator: Arc<dyn TokenEstimator>,
    state: Mutex<WindowState>,
}

impl ContextWindow {
    /// Create a window with the default `len / 4` estimator.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            policy: ContextPolicy::default(),
            estimator: Arc::new(CharRatioEstimator::default()),
            state: Mutex::new(WindowState::default()),
        }
    }

    pub fn with_policy(mut self, policy: ContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Swap in a different token estimator (e.g. a real tokenizer).
    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    // ── Mutation ──

    /// Append an entry with priority 0.
    pub fn append(&self, role: Role, content: impl Into<String>) -> u64 {
        let priority = if role == Role::System { SYSTEM_PRIORITY } else { 0 };
        self.append_with_priority(role, content, priority)
    }

    /// Append an entry, then prune back under capacity.
    ///
    /// Returns the entry id. The entry itself may already have been pruned
    /// by the time this returns if it alone does not fit.
    pub fn append_with_priority(&self, role: Role, content: impl Into<String>, priority: i32) -> u64 {
        let content = content.into();
        let tokens = self.estimator.estimate(&content);
        let mut state = self.state.lock();
        let id = state.push(role, content, tokens, priority);
        let pruned = state.prune(self.capacity);
        if pruned > 0 {
            debug!(pruned, current = state.current_tokens, capacity = self.capacity, "Pruned context entries");
        }
        id
    }

    /// Mirror a tool execution into the window and the execution history.
    ///
    /// Only the one-line summary enters the window: `+1` priority on
    /// success, `-1` on failure.
    pub fn record_tool_execution(&self, execution: ToolExecution) {
        let summary = execution.summary();
        let tokens = self.estimator.estimate(&summary);
        let priority = if execution.success {
            TOOL_SUCCESS_PRIORITY
        } else {
            TOOL_FAILURE_PRIORITY
        };

        let mut state = self.state.lock();
        state.tokens_consumed += execution.tokens;
        state.executions.push(execution);
        state.push(Role::Tool, summary, tokens, priority);
        state.prune(self.capacity);
    }

    /// Replace stale non-system entries with a short summary, then prune.
    ///
    /// Returns how many entries were compressed.
    pub fn compress(&self) -> usize {
        let mut state = self.state.lock();
        if state.entries.len() < self.policy.compress_min_entries {
            return 0;
        }

        let now = Utc::now();
        let mut compressed = 0;
        let mut freed = 0;
        for entry in state.entries.iter_mut() {
            if entry.is_system() || entry.compressed {
                continue;
            }
            let stale = (now - entry.created_at)
                .to_std()
                .is_ok_and(|age| age >= self.policy.stale_after);
            if !stale {
                continue;
            }

            let summary = summarize(&entry.content, self.policy.summary_chars);
            if summary.len() >= entry.content.len() {
                continue;
            }
            let tokens = self.estimator.estimate(&summary);
            freed += entry.tokens.saturating_sub(tokens);
            entry.content = summary;
            entry.tokens = tokens;
            entry.compressed = true;
            compressed += 1;
        }

        state.current_tokens = state.entries.iter().map(|e| e.tokens).sum();
        state.prune(self.capacity);
        if compressed > 0 {
            debug!(compressed, freed, "Compressed stale context entries");
        }
        compressed
    }

    /// Drop everything except system entries, including the execution
    /// history of the session.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.retain(ContextEntry::is_system);
        state.current_tokens = state.entries.iter().map(|e| e.tokens).sum();
        state.executions.clear();
        state.tokens_consumed = 0;
    }

    // ── Queries ──

    /// `max(0, capacity - current_tokens)`.
    pub fn remaining_budget(&self) -> usize {
        self.capacity.saturating_sub(self.state.lock().current_tokens)
    }

    pub fn current_tokens(&self) -> usize {
        self.state.lock().current_tokens
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Snapshot of the entries, oldest first.
    pub fn entries(&self) -> Vec<ContextEntry> {
        self.state.lock().entries.clone()
    }

    /// Snapshot of every recorded execution, oldest first.
    pub fn executions(&self) -> Vec<ToolExecution> {
        self.state.lock().executions.clone()
    }

    pub fn execution_count(&self) -> usize {
        self.state.lock().executions.len()
    }

    /// Running total of estimated tokens produced by recorded executions.
    pub fn tokens_consumed(&self) -> usize {
        self.state.lock().tokens_consumed
    }

    /// Role-tagged text, one entry per line, for handing to the model.
    pub fn render(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        for entry in &state.entries {
            out.push_str(&format!("[{}] {}\n", entry.role, entry.content));
        }
        out
    }
}

/// First sentence of `content`, cut to `max_chars` characters.
fn summarize(content: &str, max_chars: usize) -> String {
    let first = content
        .split_inclusive(['.', '!', '?', '\n'])
        .next()
        .unwrap_or(content)
        .trim();
    if first.chars().count() <= max_chars {
        first.to_string()
    } else {
        let prefix: String = first.chars().take(max_chars).collect();
        format!("{prefix}...")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
