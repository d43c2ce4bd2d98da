use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Delay between the last edit of a document and its recompute.
pub const RECALC_DEBOUNCE: Duration = Duration::from_millis(500);

/// Trailing-edge debounce with one deadline per key.
///
/// An edit only postpones the recompute of its own document, so a burst of
/// edits across several documents still recomputes each of them.
#[derive(Debug)]
pub struct Debouncer<K> {
    delay: Duration,
    pending: FxHashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> Debouncer<K> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: FxHashMap::default(),
        }
    }

    /// Records an event for `key`, restarting that key's deadline.
    pub fn touch(&mut self, key: K, now: Instant) {
        self.pending.insert(key, now + self.delay);
    }

    /// Drops a pending deadline without firing it.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Removes and returns every key whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &due {
            self.pending.remove(key);
        }
        due
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl<K: Eq + Hash + Clone> Default for Debouncer<K> {
    fn default() -> Self {
        Self::new(RECALC_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(500);

    #[test]
    fn test_fires_after_delay() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.touch("a", start);

        assert!(debouncer.take_due(start + Duration::from_millis(499)).is_empty());
        assert_eq!(debouncer.take_due(start + DELAY), vec!["a"]);
        assert!(!debouncer.is_pending(&"a"));
    }

    #[test]
    fn test_touch_restarts_only_that_key() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.touch("a", start);
        debouncer.touch("b", start + Duration::from_millis(300));
        debouncer.touch("a", start + Duration::from_millis(400));

        assert!(debouncer.take_due(start + Duration::from_millis(600)).is_empty());
        assert_eq!(debouncer.take_due(start + Duration::from_millis(800)), vec!["b"]);
        assert_eq!(debouncer.take_due(start + Duration::from_millis(900)), vec!["a"]);
    }

    #[test]
    fn test_edits_to_different_documents_both_fire() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.touch("a", start);
        debouncer.touch("b", start + Duration::from_millis(10));

        let mut due = debouncer.take_due(start + Duration::from_secs(1));
        due.sort();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(debouncer.pending_count(), 0);
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(DELAY);
        debouncer.touch("a", start);
        assert!(debouncer.cancel(&"a"));
        assert!(!debouncer.cancel(&"a"));
        assert!(debouncer.take_due(start + DELAY).is_empty());
    }
}
