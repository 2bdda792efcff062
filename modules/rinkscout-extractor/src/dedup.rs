//! In-run duplicate suppression.
//!
//! The durable status store remembers players across runs; this set
//! remembers what the current run has already queued so a player
//! rostered on two visited teams is only fetched once.

use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with ids that are already persisted (e.g. from the CSV).
    pub fn with_initial(ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            seen: Mutex::new(ids.into_iter().collect()),
        }
    }

    pub fn seen(&self, id: &str) -> bool {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).contains(id)
    }

    /// Returns true when the id was not seen before.
    pub fn mark_seen(&self, id: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_mark_wins() {
        let dedup = Deduplicator::new();
        assert!(dedup.mark_seen("42"));
        assert!(!dedup.mark_seen("42"));
        assert!(dedup.seen("42"));
        assert!(!dedup.seen("43"));
    }

    #[test]
    fn seeded_ids_count_as_seen() {
        let dedup = Deduplicator::with_initial(vec!["1".to_string(), "2".to_string()]);
        assert!(dedup.seen("1"));
        assert!(!dedup.mark_seen("2"));
        assert!(dedup.mark_seen("3"));
    }
}
