//! Bind-rule expansion.
//!
//! A rule `(event_name, condition_expr, substitutions)` fires whenever an
//! event named `event_name` is dispatched: if `condition_expr` evaluates
//! truthy against the current env, every substitution is appended to the
//! pending queue with `$` bound to the triggering event's argument.
//! Expansions never recurse within a single step — they go back through
//! the main queue — so a cycle of rules can only ever produce work that
//! the caller's per-block budget is free to cut off.

use kunquat_stream::{Env, Evaluator, Value};

use crate::event::Event;

#[derive(Debug, Clone)]
pub struct Substitution {
    pub channel_offset: i32,
    pub event_name: String,
    pub argument_expr: String,
}

#[derive(Debug, Clone)]
pub struct BindRule {
    pub event_name: String,
    pub condition_expr: String,
    pub substitutions: Vec<Substitution>,
}

/// Rules grouped by the event name that triggers them, preserving
/// declaration order within each group (rule order is significant: they
/// all run, but a later rule's substitutions may reference state the
/// earlier ones changed this same step).
#[derive(Debug, Default)]
pub struct BindTable {
    rules: Vec<BindRule>,
}

impl BindTable {
    pub fn new(rules: Vec<BindRule>) -> Self {
        Self { rules }
    }

    /// Evaluate every rule bound to `event.name` and collect the events its
    /// substitutions produce. Errors in a single rule's condition or
    /// argument expression are reported but do not abort evaluation of the
    /// remaining rules, matching the runtime's "unknown/bad event is
    /// logged and skipped" posture elsewhere.
    pub fn expand(&self, event: &Event, env: &dyn Env, evaluator: &mut Evaluator) -> Vec<Event> {
        let mut out = Vec::new();
        for rule in self.rules.iter().filter(|r| r.event_name == event.name) {
            match evaluator.eval(&rule.condition_expr, env, Some(&event.argument)) {
                Ok(value) => {
                    if !value.as_bool().unwrap_or(false) {
                        continue;
                    }
                }
                Err(err) => {
                    log::warn!("bind condition for {:?} failed: {err}", rule.event_name);
                    continue;
                }
            }
            for sub in &rule.substitutions {
                match evaluator.eval(&sub.argument_expr, env, Some(&event.argument)) {
                    Ok(argument) => out.push(Event::new(
                        event.channel + sub.channel_offset,
                        sub.event_name.clone(),
                        argument,
                    )),
                    Err(err) => {
                        log::warn!("bind substitution {:?} failed: {err}", sub.event_name);
                    }
                }
            }
        }
        out
    }
}

trait ValueBoolExt {
    fn as_bool(&self) -> Option<bool>;
}

impl ValueBoolExt for Value {
    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kunquat_stream::EmptyEnv;

    #[test]
    fn condition_true_expands_substitutions() {
        let table = BindTable::new(vec![BindRule {
            event_name: "#".to_string(),
            condition_expr: "1".to_string(),
            substitutions: vec![Substitution {
                channel_offset: 0,
                event_name: "n+".to_string(),
                argument_expr: "$".to_string(),
            }],
        }]);
        let mut evaluator = Evaluator::new(1);
        let trigger = Event::new(0, "#", Value::Int(440));
        let produced = table.expand(&trigger, &EmptyEnv, &mut evaluator);
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].name, "n+");
        assert_eq!(produced[0].argument, Value::Int(440));
    }

    #[test]
    fn condition_false_produces_nothing() {
        let table = BindTable::new(vec![BindRule {
            event_name: "#".to_string(),
            condition_expr: "0".to_string(),
            substitutions: vec![Substitution {
                channel_offset: 0,
                event_name: "n+".to_string(),
                argument_expr: "$".to_string(),
            }],
        }]);
        let mut evaluator = Evaluator::new(1);
        let trigger = Event::new(0, "#", Value::Int(1));
        assert!(table.expand(&trigger, &EmptyEnv, &mut evaluator).is_empty());
    }

    #[test]
    fn channel_offset_is_applied() {
        let table = BindTable::new(vec![BindRule {
            event_name: "#".to_string(),
            condition_expr: "1".to_string(),
            substitutions: vec![Substitution {
                channel_offset: 2,
                event_name: "n+".to_string(),
                argument_expr: "1".to_string(),
            }],
        }]);
        let mut evaluator = Evaluator::new(1);
        let trigger = Event::new(3, "#", Value::Int(0));
        let produced = table.expand(&trigger, &EmptyEnv, &mut evaluator);
        assert_eq!(produced[0].channel, 5);
    }

    #[test]
    fn non_matching_event_name_is_ignored() {
        let table = BindTable::new(vec![BindRule {
            event_name: "#".to_string(),
            condition_expr: "1".to_string(),
            substitutions: vec![],
        }]);
        let mut evaluator = Evaluator::new(1);
        let trigger = Event::new(0, "other", Value::Int(0));
        assert!(table.expand(&trigger, &EmptyEnv, &mut evaluator).is_empty());
    }
}
