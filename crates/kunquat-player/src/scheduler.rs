//! The per-block scheduling step of §4.7: how far the cursor can advance
//! before the next trigger row, pattern boundary, or tempo-slide
//! granularity boundary, and what happens to the cursor and tempo when it
//! gets there.

use kunquat_core::Tstamp;
use kunquat_event::Event;
use kunquat_stream::{Env, Evaluator, Value};

use crate::cursor::Cursor;
use crate::error::{PlayerError, PlayerResult};
use crate::pattern::{Composition, PatternId, Trigger};
use crate::tempo::{TempoState, SLIDE_CHUNK_FRAMES};

/// Control events the scheduler intercepts itself rather than forwarding
/// to the event/bind runtime, since they mutate cursor/tempo state that
/// only the scheduler owns.
mod control {
    pub const JUMP: &str = "mj";
    pub const SET_TEMPO: &str = "m.t";
    pub const SLIDE_TARGET: &str = "m/t";
    pub const SLIDE_LENGTH: &str = "m/=t";
    pub const PATTERN_DELAY: &str = "mpd";
}

/// Result of one [`Scheduler::step`] call: how many frames the caller may
/// render before calling back in, and the non-control triggers due at the
/// row the cursor just reached (empty if the step ended on a pattern or
/// slide-chunk boundary with nothing to fire).
#[derive(Debug, Default)]
pub struct SchedulerStep {
    pub frames: u64,
    pub fired: Vec<Event>,
    pub reached_end: bool,
}

pub struct Scheduler {
    composition: Composition,
    cursor: Cursor,
    tempo: TempoState,
    rate: f64,
    delay_remaining: Tstamp,
    stopped: bool,
}

impl Scheduler {
    pub fn new(composition: Composition, rate: f64, start_bpm: f64) -> PlayerResult<Self> {
        let cursor = Cursor::start(0, 0);
        let mut scheduler = Self {
            composition,
            cursor,
            tempo: TempoState::new(start_bpm),
            rate,
            delay_remaining: Tstamp::ZERO,
            stopped: false,
        };
        scheduler.validate_cursor()?;
        Ok(scheduler)
    }

    fn validate_cursor(&self) -> PlayerResult<()> {
        let track = self.cursor.track;
        let system = self.cursor.system;
        let order = self
            .composition
            .order_list(track, system)
            .ok_or(PlayerError::NoSuchSystem(track, system))?;
        if order.is_empty() {
            return Err(PlayerError::EmptyOrderList(track, system));
        }
        Ok(())
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo.bpm()
    }

    pub fn has_stopped(&self) -> bool {
        self.stopped
    }

    fn current_pattern_id(&self) -> Option<PatternId> {
        let order = self.composition.order_list(self.cursor.track, self.cursor.system)?;
        order.get(self.cursor.order_index).map(|r| r.pattern)
    }

    /// Advance by at most `max_frames`, stopping at the first trigger row,
    /// pattern boundary, or tempo-slide chunk edge, and dispatching
    /// whatever is due there. Returns `frames == 0` only when a zero-length
    /// pattern was skipped or the cursor just stopped — never as a
    /// deadlock, since every branch below makes forward progress.
    pub fn step(
        &mut self,
        max_frames: u64,
        env: &dyn Env,
        evaluator: &mut Evaluator,
    ) -> PlayerResult<SchedulerStep> {
        if self.stopped {
            return Ok(SchedulerStep {
                reached_end: true,
                ..Default::default()
            });
        }

        let Some(pattern_id) = self.current_pattern_id() else {
            self.stopped = true;
            return Ok(SchedulerStep {
                reached_end: true,
                ..Default::default()
            });
        };
        let pattern = self
            .composition
            .pattern(pattern_id)
            .ok_or(PlayerError::DanglingPatternRef(pattern_id.0))?;

        if pattern.is_zero_length() {
            self.advance_to_next_pattern();
            return Ok(SchedulerStep {
                frames: 0,
                fired: Vec::new(),
                reached_end: self.stopped,
            });
        }

        if !self.delay_remaining.is_zero() {
            return self.step_delay(max_frames);
        }

        let next_row = pattern.next_row_after(self.cursor.row);
        // A trigger sitting exactly on the pattern-length row is still a
        // real trigger row and must be dispatched before the cursor moves
        // on to the next pattern instance; only the absence of any row at
        // or before `pattern.length` collapses to the plain end-of-pattern
        // boundary below.
        let (boundary_row, boundary_is_trigger) = match next_row {
            Some(r) if r <= pattern.length => (r, true),
            _ => (pattern.length, false),
        };
        let boundary_beats = boundary_row - self.cursor.row;

        let mut frame_cap = boundary_beats.to_frames(self.tempo.bpm(), self.rate).max(0.0);
        if self.tempo.is_sliding() {
            frame_cap = frame_cap.min(SLIDE_CHUNK_FRAMES as f64);
        }
        if let Some(slide_end) = self.tempo.frames_until_slide_end() {
            frame_cap = frame_cap.min(slide_end.max(1.0));
        }
        let frames = frame_cap.min(max_frames as f64).floor().max(0.0) as u64;
        let frames = frames.max(1).min(max_frames);

        self.tempo.step(frames as f64);
        let advanced = Tstamp::from_frames(frames as f64, self.tempo.bpm(), self.rate);
        self.cursor.row = self.cursor.row + advanced;

        let mut fired = Vec::new();
        let mut reached_end = false;
        if self.cursor.row >= boundary_row {
            self.cursor.row = boundary_row;
            if boundary_is_trigger {
                fired = self.dispatch_row(pattern_id, boundary_row, env, evaluator)?;
            }
            if boundary_row >= pattern.length {
                self.advance_to_next_pattern();
                reached_end = self.stopped;
            }
        }

        Ok(SchedulerStep {
            frames,
            fired,
            reached_end,
        })
    }

    fn step_delay(&mut self, max_frames: u64) -> PlayerResult<SchedulerStep> {
        let frame_cap = self.delay_remaining.to_frames(self.tempo.bpm(), self.rate);
        let frames = frame_cap.min(max_frames as f64).floor().max(1.0) as u64;
        let frames = frames.min(max_frames);
        let advanced = Tstamp::from_frames(frames as f64, self.tempo.bpm(), self.rate);
        if advanced >= self.delay_remaining {
            self.delay_remaining = Tstamp::ZERO;
        } else {
            self.delay_remaining = self.delay_remaining - advanced;
        }
        Ok(SchedulerStep {
            frames,
            fired: Vec::new(),
            reached_end: false,
        })
    }

    fn dispatch_row(
        &mut self,
        pattern_id: PatternId,
        row: Tstamp,
        env: &dyn Env,
        evaluator: &mut Evaluator,
    ) -> PlayerResult<Vec<Event>> {
        let pattern = self
            .composition
            .pattern(pattern_id)
            .ok_or(PlayerError::DanglingPatternRef(pattern_id.0))?;
        let due: Vec<(usize, Trigger)> = pattern
            .triggers_at(row)
            .into_iter()
            .map(|(col, trig)| (col, trig.clone()))
            .collect();

        let mut forwarded = Vec::new();
        for (column, trigger) in due {
            let argument = evaluator
                .eval(&trigger.argument_expr, env, None)
                .unwrap_or(Value::Bool(false));
            if self.handle_control_event(&trigger.event_name, &argument) {
                continue;
            }
            forwarded.push(Event::new(column as i32, trigger.event_name, argument));
        }
        Ok(forwarded)
    }

    /// Returns `true` if `name` was a scheduler-owned control event and
    /// should not be forwarded to the general event runtime.
    fn handle_control_event(&mut self, name: &str, argument: &Value) -> bool {
        match name {
            control::SET_TEMPO => {
                if let Some(bpm) = argument_f64(argument) {
                    self.tempo.set_tempo(bpm);
                }
                true
            }
            control::SLIDE_TARGET => {
                if let Some(bpm) = argument_f64(argument) {
                    self.tempo.set_slide_target(bpm, self.rate);
                }
                true
            }
            control::SLIDE_LENGTH => {
                if let Value::Tstamp(t) = argument {
                    self.tempo.set_slide_length(*t);
                }
                true
            }
            control::PATTERN_DELAY => {
                if let Value::Tstamp(t) = argument {
                    self.delay_remaining = *t;
                } else if let Some(beats) = argument_f64(argument) {
                    self.delay_remaining = Tstamp::new(beats as i64, 0);
                }
                true
            }
            control::JUMP => {
                if let Some(index) = argument_f64(argument) {
                    self.jump(index as usize);
                }
                true
            }
            _ => false,
        }
    }

    /// Reposition the cursor to `order_index` within the current system,
    /// row 0. An index past the end is clamped, matching the posture that
    /// `receive_events` warns rather than panics on malformed input.
    fn jump(&mut self, order_index: usize) {
        let len = self
            .composition
            .order_list(self.cursor.track, self.cursor.system)
            .map(|o| o.len())
            .unwrap_or(0);
        if len == 0 {
            return;
        }
        self.cursor.order_index = order_index.min(len - 1);
        self.cursor.row = Tstamp::ZERO;
    }

    fn advance_to_next_pattern(&mut self) {
        let len = self
            .composition
            .order_list(self.cursor.track, self.cursor.system)
            .map(|o| o.len())
            .unwrap_or(0);
        self.cursor.row = Tstamp::ZERO;
        if self.cursor.order_index + 1 < len {
            self.cursor.order_index += 1;
        } else if self.composition.infinite {
            self.cursor.order_index = 0;
        } else {
            self.stopped = true;
        }
    }

    /// Seek to `(track, nanoseconds)` by iterating pattern instances from
    /// the start of the track's first system, accumulating frame counts
    /// at each pattern's tempo until the target position is reached.
    /// Tempo changes encountered along the way are honored, but bind
    /// expansions and other side effects of the patterns skipped over are
    /// not replayed — only their tempo/delay control events are.
    pub fn set_position(&mut self, track: usize, nanoseconds: u64) -> PlayerResult<()> {
        let system = 0;
        self.composition
            .order_list(track, system)
            .ok_or(PlayerError::NoSuchTrack(track))?;

        self.cursor = Cursor::start(track, system);
        self.tempo = TempoState::new(self.tempo.bpm());
        self.delay_remaining = Tstamp::ZERO;
        self.stopped = false;

        let target_seconds = nanoseconds as f64 / 1_000_000_000.0;
        let mut elapsed_seconds = 0.0;

        loop {
            if self.stopped {
                break;
            }
            let Some(pattern_id) = self.current_pattern_id() else {
                break;
            };
            let pattern = self
                .composition
                .pattern(pattern_id)
                .ok_or(PlayerError::DanglingPatternRef(pattern_id.0))?;
            let remaining_beats = pattern.length - self.cursor.row;
            let remaining_frames = remaining_beats.to_frames(self.tempo.bpm(), self.rate);
            let remaining_seconds = remaining_frames / self.rate;

            if elapsed_seconds + remaining_seconds >= target_seconds || pattern.is_zero_length() {
                let want_seconds = (target_seconds - elapsed_seconds).max(0.0);
                let want_frames = want_seconds * self.rate;
                let advanced = Tstamp::from_frames(want_frames, self.tempo.bpm(), self.rate);
                self.cursor.row = (self.cursor.row + advanced).min(pattern.length);
                break;
            }

            elapsed_seconds += remaining_seconds;
            self.advance_to_next_pattern();
        }
        Ok(())
    }
}

fn argument_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}
