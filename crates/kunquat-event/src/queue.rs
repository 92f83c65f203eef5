//! Per-block event queues.
//!
//! Scheduled events come from pattern columns and are ordered by
//! `(Tstamp, column)`; pending events come from user input or bind
//! expansion and are consumed in arrival order. A trigger row pulls every
//! scheduled event due at or before the current cursor position.

use kunquat_core::Tstamp;
use std::collections::VecDeque;

use crate::event::Event;

#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    pub at: Tstamp,
    pub column: i32,
    pub event: Event,
}

/// Column-ordered queue of pattern-authored triggers for the pattern
/// instance currently playing. Populated once per pattern entry, drained
/// as the cursor advances past each row.
#[derive(Debug, Default)]
pub struct ScheduledQueue {
    entries: Vec<ScheduledEvent>,
    next: usize,
}

impl ScheduledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a fresh pattern's triggers, sorted by `(Tstamp, column)`.
    pub fn load(&mut self, mut entries: Vec<ScheduledEvent>) {
        entries.sort_by(|a, b| a.at.cmp(&b.at).then(a.column.cmp(&b.column)));
        self.entries = entries;
        self.next = 0;
    }

    /// Next trigger time still pending in this pattern, if any.
    pub fn next_at(&self) -> Option<Tstamp> {
        self.entries.get(self.next).map(|e| e.at)
    }

    /// Drain and return every entry at exactly `at`, in column order.
    pub fn drain_at(&mut self, at: Tstamp) -> Vec<ScheduledEvent> {
        let mut out = Vec::new();
        while let Some(entry) = self.entries.get(self.next) {
            if entry.at != at {
                break;
            }
            out.push(self.entries[self.next].clone());
            self.next += 1;
        }
        out
    }

    pub fn is_exhausted(&self) -> bool {
        self.next >= self.entries.len()
    }
}

/// FIFO queue of events awaiting dispatch: user-fired events and bind
/// expansions. Unlike [`ScheduledQueue`] these carry no musical timestamp —
/// they run at the cursor's current position, one per event-loop step.
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: VecDeque<Event>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.entries.push_back(event);
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kunquat_stream::Value;

    fn ev(name: &str) -> Event {
        Event::new(0, name, Value::Bool(true))
    }

    #[test]
    fn scheduled_queue_orders_by_tstamp_then_column() {
        let mut q = ScheduledQueue::new();
        q.load(vec![
            ScheduledEvent { at: Tstamp::new(1, 0), column: 2, event: ev("b") },
            ScheduledEvent { at: Tstamp::new(0, 0), column: 5, event: ev("a") },
            ScheduledEvent { at: Tstamp::new(0, 0), column: 1, event: ev("c") },
        ]);
        assert_eq!(q.next_at(), Some(Tstamp::new(0, 0)));
        let first = q.drain_at(Tstamp::new(0, 0));
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].column, 1);
        assert_eq!(first[1].column, 5);
        assert_eq!(q.next_at(), Some(Tstamp::new(1, 0)));
    }

    #[test]
    fn scheduled_queue_exhausts_after_last_row() {
        let mut q = ScheduledQueue::new();
        q.load(vec![ScheduledEvent { at: Tstamp::ZERO, column: 0, event: ev("a") }]);
        q.drain_at(Tstamp::ZERO);
        assert!(q.is_exhausted());
    }

    #[test]
    fn pending_queue_is_fifo() {
        let mut q = PendingQueue::new();
        q.push(ev("a"));
        q.push(ev("b"));
        assert_eq!(q.pop().unwrap().name, "a");
        assert_eq!(q.pop().unwrap().name, "b");
        assert!(q.pop().is_none());
    }
}
