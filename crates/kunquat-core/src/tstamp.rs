//! Musical time: a rational `(beats, rem)` pair.
//!
//! `BEAT` is highly composite (2^7 * 3^2 * 5 * 7 * 11 * 13 * 17 * 19 * 23,
//! see the original `KQT_TSTAMP_BEAT`), so a wide range of musical
//! subdivisions divide it exactly and the sub-beat remainder never needs
//! rounding for common tuplets.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, Sub};

/// Sub-beat units per beat.
pub const BEAT: i64 = 882_161_280;

/// A point or duration in musical time, `beats + rem/BEAT` beats.
///
/// Invariant: `0 <= rem < BEAT`. `beats` may be negative (time before the
/// start of the composition, e.g. during seek arithmetic); `rem` is always
/// non-negative, so ordering is plain lexicographic on `(beats, rem)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tstamp {
    beats: i64,
    rem: i32,
}

impl Tstamp {
    pub const ZERO: Self = Self { beats: 0, rem: 0 };

    /// Construct a normalized `Tstamp`. `rem` must already lie in
    /// `[0, BEAT)`; out-of-range input is an argument error in the original
    /// and is debug-asserted here rather than silently wrapped.
    pub fn new(beats: i64, rem: i32) -> Self {
        debug_assert!((0..BEAT as i32).contains(&rem), "rem out of range: {rem}");
        Self { beats, rem }
    }

    /// Fallible constructor for untrusted input (e.g. from the stream
    /// reader), returning `None` instead of asserting.
    pub fn try_new(beats: i64, rem: i32) -> Option<Self> {
        if (0..BEAT as i32).contains(&rem) {
            Some(Self { beats, rem })
        } else {
            None
        }
    }

    pub fn beats(self) -> i64 {
        self.beats
    }

    pub fn rem(self) -> i32 {
        self.rem
    }

    pub fn is_zero(self) -> bool {
        self.beats == 0 && self.rem == 0
    }

    /// Convert to a frame count at the given tempo (BPM) and sample rate.
    /// `frames = (beats + rem/BEAT) * (rate * 60 / tempo)`.
    pub fn to_frames(self, tempo: f64, rate: f64) -> f64 {
        debug_assert!(tempo > 0.0 && rate > 0.0);
        let total_beats = self.beats as f64 + self.rem as f64 / BEAT as f64;
        total_beats * (rate * 60.0 / tempo)
    }

    /// Inverse of [`Tstamp::to_frames`], rounding the sub-beat remainder to
    /// the nearest unit so repeated round-trips stay stable.
    pub fn from_frames(frames: f64, tempo: f64, rate: f64) -> Self {
        debug_assert!(tempo > 0.0 && rate > 0.0);
        let total_beats = frames * tempo / (rate * 60.0);
        let beats_floor = total_beats.floor();
        let frac = total_beats - beats_floor;
        let mut beats = beats_floor as i64;
        let mut rem = (frac * BEAT as f64).round() as i64;
        if rem >= BEAT {
            rem -= BEAT;
            beats += 1;
        }
        Self::new(beats, rem as i32)
    }
}

impl Default for Tstamp {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Tstamp {
    type Output = Tstamp;

    fn add(self, rhs: Tstamp) -> Tstamp {
        let mut rem = self.rem as i64 + rhs.rem as i64;
        let mut beats = self.beats + rhs.beats;
        if rem >= BEAT {
            rem -= BEAT;
            beats += 1;
        }
        Tstamp::new(beats, rem as i32)
    }
}

impl Sub for Tstamp {
    type Output = Tstamp;

    fn sub(self, rhs: Tstamp) -> Tstamp {
        let mut rem = self.rem as i64 - rhs.rem as i64;
        let mut beats = self.beats - rhs.beats;
        if rem < 0 {
            rem += BEAT;
            beats -= 1;
        }
        Tstamp::new(beats, rem as i32)
    }
}

impl std::fmt::Display for Tstamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.beats, self.rem)
    }
}

/// Ordering helper kept for call sites that prefer `cmp` over the derived
/// `Ord`, matching the original `Tstamp_cmp` call shape.
pub fn cmp(a: Tstamp, b: Tstamp) -> Ordering {
    a.cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn add_is_commutative() {
        let a = Tstamp::new(3, 100);
        let b = Tstamp::new(5, BEAT as i32 - 50);
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn sub_self_is_zero() {
        let a = Tstamp::new(7, 12345);
        assert_eq!(a - a, Tstamp::ZERO);
    }

    #[test]
    fn sub_add_roundtrip() {
        let a = Tstamp::new(3, 100);
        let b = Tstamp::new(5, BEAT as i32 - 50);
        assert_eq!((a + b) - b, a);
    }

    #[test]
    fn rem_boundary_carries() {
        let a = Tstamp::new(0, BEAT as i32 - 1);
        let one = Tstamp::new(0, 1);
        let sum = a + one;
        assert_eq!(sum, Tstamp::new(1, 0));
    }

    #[test]
    fn borrow_across_zero() {
        let a = Tstamp::new(1, 0);
        let one = Tstamp::new(0, 1);
        assert_eq!(a - one, Tstamp::new(0, BEAT as i32 - 1));
    }

    #[test]
    fn integer_beats_round_trip_exact_frames() {
        // rate * 60 divisible by tempo => integer number of frames.
        let rate = 44100.0;
        let tempo = 120.0;
        let t = Tstamp::new(4, 0);
        let frames = t.to_frames(tempo, rate);
        assert_eq!(frames.fract(), 0.0);
        let back = Tstamp::from_frames(frames, tempo, rate);
        assert_eq!(back, t);
    }

    #[test]
    fn frame_roundtrip_within_one_frame() {
        let rate = 48000.0;
        let tempo = 137.0;
        let original_frames = 123_456.0;
        let t = Tstamp::from_frames(original_frames, tempo, rate);
        let frames = t.to_frames(tempo, rate);
        assert_relative_eq!(frames, original_frames, epsilon = 1.0);
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Tstamp::new(1, 0) > Tstamp::new(0, BEAT as i32 - 1));
        assert!(Tstamp::new(2, 5) > Tstamp::new(2, 4));
    }

    #[test]
    fn try_new_rejects_out_of_range_rem() {
        assert!(Tstamp::try_new(0, -1).is_none());
        assert!(Tstamp::try_new(0, BEAT as i32).is_none());
        assert!(Tstamp::try_new(0, BEAT as i32 - 1).is_some());
    }
}
