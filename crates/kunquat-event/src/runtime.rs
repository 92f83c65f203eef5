//! Event runtime: drains scheduled and pending events through a per-name
//! dispatch table, expanding bind rules as it goes, under a hard per-block
//! expansion budget.
//!
//! When the budget runs out mid-block, the remaining pending events are
//! left queued for the next block and the caller is told to short-render
//! (emit 0 frames) until the host drains notifications via
//! [`EventRuntime::take_notifications`], mirroring the wire-level
//! `receive_events` contract.

use kunquat_stream::{Env, Evaluator};

use crate::bind::BindTable;
use crate::event::Event;
use crate::names::{categorize, EventCategory};
use crate::queue::PendingQueue;

/// A dispatched event the host-side handler should act on (note-on,
/// tempo change, ...). The runtime itself does not know how to mutate
/// player/voice state — it hands each event to the `handler` closure and
/// only owns the queueing/budget/bind-expansion machinery.
pub trait EventHandler {
    /// Act on `event`, returning any reply the host should see via
    /// `receive_events` (e.g. a query's `A*` answer).
    fn handle(&mut self, event: &Event) -> Option<Event>;
}

pub struct EventRuntime {
    pending: PendingQueue,
    binds: BindTable,
    evaluator: Evaluator,
    budget_per_block: usize,
    notifications: Vec<Event>,
}

impl EventRuntime {
    pub fn new(binds: BindTable, budget_per_block: usize, seed: u64) -> Self {
        Self {
            pending: PendingQueue::new(),
            binds,
            evaluator: Evaluator::new(seed),
            budget_per_block,
            notifications: Vec::new(),
        }
    }

    pub fn fire(&mut self, event: Event) {
        self.pending.push(event);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drain up to the per-block budget of pending events, dispatching
    /// each through `env`/`handler` and feeding the result back through
    /// bind expansion. Returns `true` if the queue was fully drained
    /// (normal case) or `false` if the budget ran out first, in which case
    /// the caller must short-render this block.
    pub fn run_block(&mut self, env: &dyn Env, handler: &mut dyn EventHandler) -> bool {
        let mut spent = 0usize;
        while let Some(event) = self.pending.pop() {
            if spent >= self.budget_per_block {
                self.pending.push(event);
                return false;
            }
            spent += 1;

            if !matches!(categorize(&event.name), EventCategory::Unknown) {
                if let Some(reply) = handler.handle(&event) {
                    self.notifications.push(reply);
                }
            } else {
                log::warn!("ignoring unknown event {:?}", event.name);
            }

            for expanded in self.binds.expand(&event, env, &mut self.evaluator) {
                self.pending.push(expanded);
            }
        }
        true
    }

    /// Pull accumulated notifications as a `receive_events` JSON array of
    /// `[channel, [name, argument]]` triples, and clear the buffer.
    pub fn take_notifications(&mut self) -> String {
        let parts: Vec<String> = self.notifications.iter().map(Event::to_reply_wire).collect();
        self.notifications.clear();
        format!("[{}]", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{BindRule, Substitution};
    use kunquat_stream::{EmptyEnv, Value};

    struct CountingHandler {
        handled: usize,
    }
    impl EventHandler for CountingHandler {
        fn handle(&mut self, _event: &Event) -> Option<Event> {
            self.handled += 1;
            None
        }
    }

    #[test]
    fn drains_queue_when_under_budget() {
        let mut runtime = EventRuntime::new(BindTable::new(vec![]), 100, 1);
        runtime.fire(Event::new(0, "n+", Value::Int(1)));
        runtime.fire(Event::new(0, "n-", Value::Int(1)));
        let mut handler = CountingHandler { handled: 0 };
        let drained = runtime.run_block(&EmptyEnv, &mut handler);
        assert!(drained);
        assert_eq!(handler.handled, 2);
    }

    #[test]
    fn stops_at_budget_and_keeps_remainder_queued() {
        let mut runtime = EventRuntime::new(BindTable::new(vec![]), 1, 1);
        runtime.fire(Event::new(0, "n+", Value::Int(1)));
        runtime.fire(Event::new(0, "n-", Value::Int(1)));
        let mut handler = CountingHandler { handled: 0 };
        let drained = runtime.run_block(&EmptyEnv, &mut handler);
        assert!(!drained);
        assert_eq!(handler.handled, 1);
        assert_eq!(runtime.pending_len(), 1);
    }

    #[test]
    fn bind_expansion_feeds_back_into_same_block() {
        let binds = BindTable::new(vec![BindRule {
            event_name: "n-".to_string(),
            condition_expr: "1".to_string(),
            substitutions: vec![Substitution {
                channel_offset: 0,
                event_name: "n+".to_string(),
                argument_expr: "$".to_string(),
            }],
        }]);
        let mut runtime = EventRuntime::new(binds, 100, 1);
        runtime.fire(Event::new(0, "n-", Value::Int(1)));
        let mut handler = CountingHandler { handled: 0 };
        runtime.run_block(&EmptyEnv, &mut handler);
        assert_eq!(handler.handled, 2);
    }

    #[test]
    fn unknown_event_is_skipped_not_handled() {
        let mut runtime = EventRuntime::new(BindTable::new(vec![]), 100, 1);
        runtime.fire(Event::new(0, "zz", Value::Int(1)));
        let mut handler = CountingHandler { handled: 0 };
        runtime.run_block(&EmptyEnv, &mut handler);
        assert_eq!(handler.handled, 0);
    }
}
