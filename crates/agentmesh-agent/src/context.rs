//! Prompt assembly and context-window management.
//!
//! The prompt sent to an engine each round is `always_included ++
//! chat_history`. When it would exceed the engine's token budget, messages
//! are dropped starting at the midpoint of `chat_history` outward — the
//! always-included prefix and the single most recent message are never
//! touched, so the model always sees both how the conversation began and
//! what was just said.

use agentmesh_core::Message;

/// Counts tokens for budgeting. Implementations typically wrap an `Engine`'s
/// `message_token_len`, kept generic here so this module stays decoupled
/// from any particular engine's wire format.
pub trait TokenCounter {
    fn count(&self, message: &Message) -> usize;
}

/// Naive chars-per-token estimator, used when no engine-specific counter is
/// available (e.g. in tests or before an engine is wired up).
pub struct CharCounter;

const CHARS_PER_TOKEN: f64 = 4.0;

impl CharCounter {
    pub fn estimate(text: &str) -> usize {
        (text.len() as f64 / CHARS_PER_TOKEN).ceil() as usize
    }
}

impl TokenCounter for CharCounter {
    fn count(&self, message: &Message) -> usize {
        CharCounter::estimate(&message.content) + 10
    }
}

/// Builds and truncates the prompt an Agent sends to its engine each round.
pub struct ContextManager {
    max_tokens: usize,
}

impl ContextManager {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn calculate_total(&self, always_included: &[Message], history: &[Message], counter: &dyn TokenCounter) -> usize {
        always_included.iter().chain(history.iter()).map(|m| counter.count(m)).sum()
    }

    /// Truncates `history` from the middle until the full prompt
    /// (`always_included ++ history`) fits within `max_tokens`, or until
    /// only the first and last message of `history` remain. Never removes
    /// from `always_included` and never removes the last element of
    /// `history`.
    pub fn truncate_middle(&self, always_included: &[Message], history: &mut Vec<Message>, counter: &dyn TokenCounter) {
        if history.len() <= 2 {
            return;
        }
        while history.len() > 2 && self.calculate_total(always_included, history, counter) > self.max_tokens {
            let mid = history.len() / 2;
            history.remove(mid);
        }
        tracing::debug!(
            remaining = history.len(),
            tokens = self.calculate_total(always_included, history, counter),
            "truncated chat history from the middle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> Message {
        Message::user(content)
    }

    #[test]
    fn char_counter_estimates_tokens() {
        assert_eq!(CharCounter::estimate("hello"), 2);
        assert_eq!(CharCounter::estimate("hello world"), 3);
    }

    #[test]
    fn truncate_middle_preserves_prefix_and_tail() {
        let ctx = ContextManager::new(5);
        let always_included = vec![Message::system("sys")];
        let mut history: Vec<Message> = (0..20).map(|i| msg(&format!("message number {}", i))).collect();
        let first = history.first().unwrap().content.clone();
        let last = history.last().unwrap().content.clone();

        ctx.truncate_middle(&always_included, &mut history, &CharCounter);

        assert_eq!(history.first().unwrap().content, first);
        assert_eq!(history.last().unwrap().content, last);
        assert!(history.len() < 20);
    }

    #[test]
    fn truncate_middle_never_touches_always_included() {
        let ctx = ContextManager::new(1);
        let always_included = vec![Message::system("pinned system prompt")];
        let mut history: Vec<Message> = (0..10).map(|i| msg(&format!("m{}", i))).collect();
        ctx.truncate_middle(&always_included, &mut history, &CharCounter);
        assert_eq!(always_included[0].content, "pinned system prompt");
        assert!(history.len() <= 2);
    }

    #[test]
    fn truncate_middle_noop_when_under_budget() {
        let ctx = ContextManager::new(10_000);
        let always_included = vec![Message::system("sys")];
        let mut history = vec![msg("a"), msg("b"), msg("c")];
        ctx.truncate_middle(&always_included, &mut history, &CharCounter);
        assert_eq!(history.len(), 3);
    }
}
