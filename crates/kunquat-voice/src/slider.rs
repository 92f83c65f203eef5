//! Small per-voice mutator primitives: linear sliders, sine LFOs, a
//! breakpoint envelope, and the arpeggio tone-offset ring.

use std::f64::consts::TAU;

/// A value that steps linearly toward a target, one step per frame.
/// Used for pitch/force/lowpass/panning sliders (§4.5 steps 1-3, 6).
#[derive(Debug, Clone, Copy, Default)]
pub struct Slider {
    pub current: f64,
    target: f64,
    step: f64,
    frames_left: u32,
}

impl Slider {
    pub fn new(value: f64) -> Self {
        Self {
            current: value,
            target: value,
            step: 0.0,
            frames_left: 0,
        }
    }

    /// Begin sliding toward `target` over `frames` frames. `frames == 0`
    /// jumps immediately.
    pub fn slide_to(&mut self, target: f64, frames: u32) {
        self.target = target;
        if frames == 0 {
            self.current = target;
            self.step = 0.0;
            self.frames_left = 0;
        } else {
            self.step = (target - self.current) / frames as f64;
            self.frames_left = frames;
        }
    }

    pub fn is_active(&self) -> bool {
        self.frames_left > 0
    }

    /// Step one frame, returning the new current value.
    pub fn step(&mut self) -> f64 {
        if self.frames_left > 0 {
            self.current += self.step;
            self.frames_left -= 1;
            if self.frames_left == 0 {
                self.current = self.target;
            }
        }
        self.current
    }
}

/// A sine LFO producing a multiplier around 1.0, used for vibrato,
/// tremolo, and autowah.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lfo {
    pub depth: f64,
    pub rate_hz: f64,
    phase: f64,
    pub enabled: bool,
}

impl Lfo {
    pub fn new(rate_hz: f64, depth: f64) -> Self {
        Self {
            depth,
            rate_hz,
            phase: 0.0,
            enabled: rate_hz > 0.0 && depth > 0.0,
        }
    }

    /// Advance one frame, returning a multiplier: `1 + depth * sin(phase)`.
    pub fn step_multiplier(&mut self, rate: f64) -> f64 {
        if !self.enabled {
            return 1.0;
        }
        let value = 1.0 + self.depth * self.phase.sin();
        self.phase += TAU * self.rate_hz / rate;
        if self.phase >= TAU {
            self.phase -= TAU;
        }
        value
    }
}

/// A linear breakpoint envelope sampled by elapsed time in seconds, with
/// optional scale-from-note-pitch and a sustain index that freezes
/// progression while the source note holds.
#[derive(Debug, Clone)]
pub struct Envelope {
    points: Vec<(f64, f64)>,
    pub scale_from_pitch: bool,
    pub sustain_index: Option<usize>,
}

impl Envelope {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self {
            points,
            scale_from_pitch: false,
            sustain_index: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value at time `t` (already scaled by pitch if `scale_from_pitch`),
    /// and whether `t` has passed the final breakpoint.
    pub fn sample(&self, t: f64) -> (f64, bool) {
        if self.points.is_empty() {
            return (1.0, true);
        }
        if t <= self.points[0].0 {
            return (self.points[0].1, false);
        }
        for w in self.points.windows(2) {
            let (t0, v0) = w[0];
            let (t1, v1) = w[1];
            if t <= t1 {
                let frac = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                return (v0 + (v1 - v0) * frac, false);
            }
        }
        (self.points.last().unwrap().1, true)
    }

    /// Time of the sustain breakpoint, if any, used to freeze envelope
    /// progression while a note is held.
    pub fn sustain_time(&self) -> Option<f64> {
        self.sustain_index.and_then(|i| self.points.get(i)).map(|p| p.0)
    }
}

/// A ring of tone offsets (in cents relative to `reference`) stepped once
/// every `length` frames, for the arpeggio mutator.
#[derive(Debug, Clone, Default)]
pub struct Arpeggio {
    pub tones: Vec<f64>,
    pub reference: f64,
    pub length_frames: u32,
    index: usize,
    frames_since_step: u32,
}

impl Arpeggio {
    pub fn new(tones: Vec<f64>, reference: f64, length_frames: u32) -> Self {
        Self {
            tones,
            reference,
            length_frames,
            index: 0,
            frames_since_step: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.tones.is_empty() && self.length_frames > 0
    }

    /// Current `exp2((tone - reference) / 1200)` multiplier, advancing the
    /// ring index once every `length_frames` calls.
    pub fn step_multiplier(&mut self) -> f64 {
        if !self.is_active() {
            return 1.0;
        }
        let tone = self.tones[self.index];
        self.frames_since_step += 1;
        if self.frames_since_step >= self.length_frames {
            self.frames_since_step = 0;
            self.index = (self.index + 1) % self.tones.len();
        }
        2f64.powf((tone - self.reference) / 1200.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slider_reaches_target_exactly() {
        let mut s = Slider::new(0.0);
        s.slide_to(10.0, 5);
        for _ in 0..5 {
            s.step();
        }
        assert_eq!(s.current, 10.0);
        assert!(!s.is_active());
    }

    #[test]
    fn slider_zero_frames_jumps() {
        let mut s = Slider::new(0.0);
        s.slide_to(3.0, 0);
        assert_eq!(s.current, 3.0);
    }

    #[test]
    fn lfo_disabled_returns_unity() {
        let mut lfo = Lfo::default();
        assert_eq!(lfo.step_multiplier(44100.0), 1.0);
    }

    #[test]
    fn envelope_linear_interpolation() {
        let env = Envelope::new(vec![(0.0, 0.0), (1.0, 1.0)]);
        let (v, done) = env.sample(0.5);
        assert_eq!(v, 0.5);
        assert!(!done);
        let (_, done_end) = env.sample(2.0);
        assert!(done_end);
    }

    #[test]
    fn arpeggio_steps_after_length_frames() {
        let mut arp = Arpeggio::new(vec![0.0, 1200.0], 0.0, 2);
        assert_eq!(arp.step_multiplier(), 1.0);
        assert_eq!(arp.step_multiplier(), 1.0);
        assert_eq!(arp.step_multiplier(), 2.0);
    }
}
