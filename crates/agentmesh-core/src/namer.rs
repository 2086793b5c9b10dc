//! Process-unique, human-readable name generation for agents.

use std::sync::atomic::{AtomicUsize, Ordering};

const ADJECTIVES: &[&str] = &[
    "crimson", "amber", "azure", "violet", "copper", "ivory", "obsidian", "cobalt", "emerald",
    "scarlet", "silver", "golden", "slate", "jade", "coral", "indigo",
];

const NOUNS: &[&str] = &[
    "falcon", "otter", "badger", "heron", "lynx", "raven", "marten", "osprey", "wren", "viper",
    "mantis", "harrier", "kestrel", "tapir", "civet", "serval",
];

/// Issues short, memorable names (e.g. `crimson-falcon`) that are unique for
/// the lifetime of the `Namer` instance. On exhaustion of the base word list
/// a numeric suffix is appended rather than failing.
pub struct Namer {
    counter: AtomicUsize,
}

impl Default for Namer {
    fn default() -> Self {
        Self::new()
    }
}

impl Namer {
    pub fn new() -> Self {
        Self { counter: AtomicUsize::new(0) }
    }

    /// Returns the next unique name.
    pub fn get_name(&self) -> String {
        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        let base_space = ADJECTIVES.len() * NOUNS.len();
        let adjective = ADJECTIVES[idx % ADJECTIVES.len()];
        let noun = NOUNS[(idx / ADJECTIVES.len()) % NOUNS.len()];
        if idx < base_space {
            format!("{}-{}", adjective, noun)
        } else {
            format!("{}-{}-{}", adjective, noun, idx / base_space)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_across_many_calls() {
        let namer = Namer::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            assert!(seen.insert(namer.get_name()));
        }
    }

    #[test]
    fn names_are_human_readable() {
        let namer = Namer::new();
        let name = namer.get_name();
        assert!(name.contains('-'));
        assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '-'));
    }
}
