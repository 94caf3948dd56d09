//! Candidate Queue: prioritized, expiring prospect utterances
//!
//! Invariants after every mutation:
//! - sorted by priority, descending (stable for ties)
//! - no expired item
//! - no item more than one context generation behind
//! - at most `max_size` items

use tokio::time::Instant;
use tracing::debug;

use crate::types::CandidateUtterance;

#[derive(Debug)]
pub struct CandidateQueue {
    items: Vec<CandidateUtterance>,
    context_version: u64,
    max_size: usize,
}

impl CandidateQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::with_capacity(max_size),
            context_version: 0,
            max_size: max_size.max(1),
        }
    }

    /// Insert a candidate prepared for the current context
    pub fn push(&mut self, item: CandidateUtterance) {
        self.push_at(item, Instant::now());
    }

    pub fn push_at(&mut self, item: CandidateUtterance, now: Instant) {
        let version = self.context_version;
        self.push_for_version_at(item, version, now);
    }

    /// Insert a candidate prepared for `version`
    ///
    /// Returns false (and drops the item) if that version is already more
    /// than one generation behind.
    pub fn push_for_version_at(
        &mut self,
        mut item: CandidateUtterance,
        version: u64,
        now: Instant,
    ) -> bool {
        let version = version.min(self.context_version);
        if self.is_stale(version) {
            debug!(version, current = self.context_version, "dropping stale candidate");
            return false;
        }
        item.context_version = version;
        item.created_at = Some(now);
        self.items.push(item);
        // Vec::sort_by is stable: equal priorities keep arrival order
        self.items.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        self.sweep_expired_at(now);
        if self.items.len() > self.max_size {
            let dropped = self.items.len() - self.max_size;
            self.items.truncate(self.max_size);
            debug!(dropped, "queue full, dropped lowest priority");
        }
        true
    }

    /// Remove and return the best live candidate
    pub fn pop_highest_priority(&mut self) -> Option<CandidateUtterance> {
        self.pop_highest_priority_at(Instant::now())
    }

    pub fn pop_highest_priority_at(&mut self, now: Instant) -> Option<CandidateUtterance> {
        self.sweep_expired_at(now);
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn peek(&self) -> Option<&CandidateUtterance> {
        self.items.first()
    }

    /// Drop expired items; returns how many were removed
    pub fn sweep_expired(&mut self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&mut self, now: Instant) -> usize {
        let before = self.items.len();
        self.items.retain(|c| !c.is_expired_at(now));
        before - self.items.len()
    }

    /// New user speech: advance the context and drop what it made stale
    ///
    /// Items exactly one generation behind survive; the rep may only have
    /// paused mid-thought.
    pub fn on_new_user_speech(&mut self) -> u64 {
        self.context_version += 1;
        let current = self.context_version;
        let before = self.items.len();
        self.items.retain(|c| current - c.context_version.min(current) <= 1);
        let removed = before - self.items.len();
        if removed > 0 {
            debug!(removed, version = current, "stale candidates invalidated");
        }
        current
    }

    fn is_stale(&self, version: u64) -> bool {
        self.context_version.saturating_sub(version) > 1
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn context_version(&self) -> u64 {
        self.context_version
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Items in priority order
    pub fn items(&self) -> &[CandidateUtterance] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn texts(q: &CandidateQueue) -> Vec<&str> {
        q.items().iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn test_push_keeps_descending_order() {
        let now = Instant::now();
        let mut q = CandidateQueue::new(5);
        q.push_at(CandidateUtterance::new("low", 0.2), now);
        q.push_at(CandidateUtterance::new("high", 0.9), now);
        q.push_at(CandidateUtterance::new("mid", 0.5), now);
        assert_eq!(texts(&q), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let now = Instant::now();
        let mut q = CandidateQueue::new(5);
        q.push_at(CandidateUtterance::new("first", 0.5), now);
        q.push_at(CandidateUtterance::new("second", 0.5), now);
        assert_eq!(texts(&q), vec!["first", "second"]);
    }

    #[test]
    fn test_push_sweeps_expired() {
        let start = Instant::now();
        let mut q = CandidateQueue::new(5);
        q.push_at(CandidateUtterance::new("old", 0.9).with_expiry_ms(100), start);
        q.push_at(
            CandidateUtterance::new("fresh", 0.1),
            start + Duration::from_millis(500),
        );
        assert_eq!(texts(&q), vec!["fresh"]);
    }

    #[test]
    fn test_truncates_lowest_priority() {
        let now = Instant::now();
        let mut q = CandidateQueue::new(2);
        q.push_at(CandidateUtterance::new("a", 0.3), now);
        q.push_at(CandidateUtterance::new("b", 0.8), now);
        q.push_at(CandidateUtterance::new("c", 0.5), now);
        assert_eq!(texts(&q), vec!["b", "c"]);
    }

    #[test]
    fn test_new_user_speech_keeps_one_behind() {
        let now = Instant::now();
        let mut q = CandidateQueue::new(5);
        q.push_at(CandidateUtterance::new("v0", 0.5), now);
        q.on_new_user_speech();
        q.push_at(CandidateUtterance::new("v1", 0.5), now);
        assert_eq!(q.size(), 2);

        q.on_new_user_speech();
        assert_eq!(texts(&q), vec!["v1"]);
        assert_eq!(q.context_version(), 2);
    }

    #[test]
    fn test_push_for_stale_version_rejected() {
        let now = Instant::now();
        let mut q = CandidateQueue::new(5);
        q.on_new_user_speech();
        q.on_new_user_speech();
        assert!(!q.push_for_version_at(CandidateUtterance::new("late", 0.9), 0, now));
        assert!(q.push_for_version_at(CandidateUtterance::new("ok", 0.9), 1, now));
        assert_eq!(q.peek().map(|c| c.context_version), Some(1));
    }

    #[test]
    fn test_pop_skips_expired() {
        let start = Instant::now();
        let mut q = CandidateQueue::new(5);
        q.push_at(CandidateUtterance::new("short", 0.9).with_expiry_ms(50), start);
        q.push_at(CandidateUtterance::new("long", 0.4).with_expiry_ms(5000), start);
        let popped = q.pop_highest_priority_at(start + Duration::from_millis(100));
        assert_eq!(popped.map(|c| c.text), Some("long".to_string()));
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_empty() {
        let mut q = CandidateQueue::new(5);
        assert!(q.pop_highest_priority().is_none());
        assert!(q.peek().is_none());
    }
}
