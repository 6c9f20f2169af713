//! Run supersession.
//!
//! A consumer (an editor pane, a "Check" button) owns a named slot. Starting
//! a new run in a slot supersedes whatever run was there; results that come
//! back for a superseded token are stale and must be dropped, never merged.

use dashmap::DashMap;

use crate::id::RunToken;

/// Registry of the current run per slot.
///
/// Backed by `DashMap` so concurrent tasks can begin and check runs without
/// an outer lock.
#[derive(Debug)]
pub struct RunRegistry {
    current: DashMap<String, RunToken>,
}

impl RunRegistry {
    pub fn new() -> Self {
        RunRegistry {
            current: DashMap::new(),
        }
    }

    /// Starts a new run in `slot`, superseding the previous one.
    pub fn begin(&self, slot: &str) -> RunToken {
        let token = RunToken::new();
        if let Some(previous) = self.current.insert(slot.to_string(), token) {
            tracing::debug!("run {} in slot {:?} superseded by {}", previous, slot, token);
        }
        token
    }

    /// Whether `token` is still the newest run of `slot`.
    pub fn is_current(&self, slot: &str, token: RunToken) -> bool {
        self.current
            .get(slot)
            .map(|entry| *entry.value() == token)
            .unwrap_or(false)
    }

    /// Clears `slot` if `token` is still its current run. Returns whether it
    /// was.
    pub fn finish(&self, slot: &str, token: RunToken) -> bool {
        self.current
            .remove_if(slot, |_, current| *current == token)
            .is_some()
    }

    pub fn active_count(&self) -> usize {
        self.current.len()
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_run_supersedes_older() {
        let registry = RunRegistry::new();
        let first = registry.begin("editor");
        let second = registry.begin("editor");
        assert!(!registry.is_current("editor", first));
        assert!(registry.is_current("editor", second));
    }

    #[test]
    fn slots_are_independent() {
        let registry = RunRegistry::new();
        let run = registry.begin("editor");
        let check = registry.begin("check");
        assert!(registry.is_current("editor", run));
        assert!(registry.is_current("check", check));
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn stale_finish_does_not_clear_newer_run() {
        let registry = RunRegistry::new();
        let first = registry.begin("editor");
        let second = registry.begin("editor");
        assert!(!registry.finish("editor", first));
        assert!(registry.is_current("editor", second));
        assert!(registry.finish("editor", second));
        assert_eq!(registry.active_count(), 0);
    }
}
