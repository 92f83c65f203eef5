//! Static composition data: patterns, their trigger columns, and the
//! per-track order lists that sequence pattern instances into songs.

use kunquat_core::Tstamp;
use std::collections::HashMap;

/// An unevaluated trigger as stored in a pattern column: `(event_name,
/// argument_expr)`. The argument is kept as source text — the event
/// runtime's evaluator resolves it at fire time, so a trigger column can
/// reference channel/pattern-instance-local state unknown until playback.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub event_name: String,
    pub argument_expr: String,
}

impl Trigger {
    pub fn new(event_name: impl Into<String>, argument_expr: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            argument_expr: argument_expr.into(),
        }
    }
}

pub type Column = Vec<(Tstamp, Trigger)>;

#[derive(Debug, Clone)]
pub struct Pattern {
    pub length: Tstamp,
    pub columns: Vec<Column>,
}

impl Pattern {
    pub fn new(length: Tstamp, columns: Vec<Column>) -> Self {
        Self { length, columns }
    }

    pub fn is_zero_length(&self) -> bool {
        self.length.is_zero()
    }

    /// The nearest trigger row strictly after `after`, across all columns.
    pub fn next_row_after(&self, after: Tstamp) -> Option<Tstamp> {
        self.columns
            .iter()
            .flat_map(|col| col.iter())
            .map(|(t, _)| *t)
            .filter(|t| *t > after)
            .min()
    }

    /// Every `(column, trigger)` due at exactly `row`, in column order.
    pub fn triggers_at(&self, row: Tstamp) -> Vec<(usize, &Trigger)> {
        self.columns
            .iter()
            .enumerate()
            .flat_map(|(col_idx, col)| {
                col.iter()
                    .filter(move |(t, _)| *t == row)
                    .map(move |(_, trig)| (col_idx, trig))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub usize);

#[derive(Debug, Clone, Copy)]
pub struct PatternInstanceRef {
    pub pattern: PatternId,
}

/// One song: an ordered list of pattern instances.
pub type OrderList = Vec<PatternInstanceRef>;

#[derive(Debug, Clone, Default)]
pub struct Track {
    pub systems: Vec<OrderList>,
}

#[derive(Debug, Default)]
pub struct Composition {
    patterns: HashMap<PatternId, Pattern>,
    pub tracks: Vec<Track>,
    pub infinite: bool,
}

impl Composition {
    pub fn new(tracks: Vec<Track>, infinite: bool) -> Self {
        Self {
            patterns: HashMap::new(),
            tracks,
            infinite,
        }
    }

    pub fn insert_pattern(&mut self, id: PatternId, pattern: Pattern) {
        self.patterns.insert(id, pattern);
    }

    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(&id)
    }

    pub fn order_list(&self, track: usize, system: usize) -> Option<&OrderList> {
        self.tracks.get(track)?.systems.get(system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_row_after_finds_min_across_columns() {
        let pattern = Pattern::new(
            Tstamp::new(4, 0),
            vec![
                vec![(Tstamp::new(2, 0), Trigger::new("n+", "1"))],
                vec![(Tstamp::new(1, 0), Trigger::new("n+", "2"))],
            ],
        );
        assert_eq!(pattern.next_row_after(Tstamp::ZERO), Some(Tstamp::new(1, 0)));
        assert_eq!(pattern.next_row_after(Tstamp::new(1, 0)), Some(Tstamp::new(2, 0)));
        assert_eq!(pattern.next_row_after(Tstamp::new(2, 0)), None);
    }

    #[test]
    fn triggers_at_returns_column_order() {
        let pattern = Pattern::new(
            Tstamp::new(1, 0),
            vec![
                vec![(Tstamp::ZERO, Trigger::new("a", ""))],
                vec![(Tstamp::ZERO, Trigger::new("b", ""))],
            ],
        );
        let triggers = pattern.triggers_at(Tstamp::ZERO);
        assert_eq!(triggers.len(), 2);
        assert_eq!(triggers[0].0, 0);
        assert_eq!(triggers[1].0, 1);
    }

    #[test]
    fn zero_length_pattern_is_detected() {
        let pattern = Pattern::new(Tstamp::ZERO, vec![]);
        assert!(pattern.is_zero_length());
    }
}
