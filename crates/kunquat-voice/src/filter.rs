//! Resonant lowpass with crossfaded cutoff changes.
//!
//! Grounded on `rf_dsp::biquad::{BiquadCoeffs, BiquadTDF2}`: RBJ cookbook
//! lowpass coefficients and a transposed direct form II state (`z1`, `z2`).
//! §4.5 step 3 additionally requires crossfading between two such states
//! whenever the cutoff jumps by more than 1.45% or the resonance changes,
//! so clicks from recomputing coefficients mid-stream are inaudible.

use std::f64::consts::PI;

/// Crossfade window length in samples at a reference rate, per §4.5.
const CROSSFADE_SAMPLES_AT_REF_RATE: f64 = 200.0;
/// Cutoff change beyond which a crossfade is triggered.
const CUTOFF_CHANGE_THRESHOLD: f64 = 0.0145;

#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    pub fn lowpass(freq: f64, q: f64, rate: f64) -> Self {
        let omega = 2.0 * PI * freq / rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// An identity (bypass) filter, used when the requested cutoff is at
    /// or above Nyquist.
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
}

impl BiquadState {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn process_sample(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}

/// Two independently-running biquad states, crossfaded over a fixed window
/// whenever the effective cutoff or resonance changes enough to require it.
/// Each state keeps its own z1/z2 history so neither clicks when the other
/// takes over.
#[derive(Debug, Clone)]
pub struct CrossfadingFilter {
    a: BiquadState,
    b: BiquadState,
    a_is_active: bool,
    crossfade_pos: f64,
    crossfade_len: f64,
    last_cutoff: f64,
    last_resonance: f64,
}

impl CrossfadingFilter {
    pub fn new(_rate: f64) -> Self {
        Self {
            a: BiquadState::default(),
            b: BiquadState::default(),
            a_is_active: true,
            crossfade_pos: 1.0,
            crossfade_len: CROSSFADE_SAMPLES_AT_REF_RATE,
            last_cutoff: 0.0,
            last_resonance: 0.0,
        }
    }

    /// Called once per sub-block (or whenever the cutoff is recomputed) to
    /// decide whether a new crossfade must begin.
    pub fn update(&mut self, cutoff: f64, resonance: f64, rate: f64, nyquist: f64) {
        let relative_change = if self.last_cutoff > 0.0 {
            ((cutoff - self.last_cutoff) / self.last_cutoff).abs()
        } else {
            1.0
        };
        let resonance_changed = (resonance - self.last_resonance).abs() > f64::EPSILON;
        if relative_change <= CUTOFF_CHANGE_THRESHOLD && !resonance_changed {
            return;
        }

        let coeffs = if cutoff >= nyquist {
            BiquadCoeffs::bypass()
        } else {
            BiquadCoeffs::lowpass(cutoff, resonance.max(0.01), rate)
        };

        let inactive = if self.a_is_active { &mut self.b } else { &mut self.a };
        inactive.reset();
        inactive.set_coeffs(coeffs);
        self.crossfade_pos = 0.0;
        self.crossfade_len = CROSSFADE_SAMPLES_AT_REF_RATE;
        self.last_cutoff = cutoff;
        self.last_resonance = resonance;
    }

    /// Process one sample, crossfading linearly from the outgoing state to
    /// the incoming one over `crossfade_len` samples.
    pub fn process_sample(&mut self, input: f64) -> f64 {
        if self.crossfade_pos >= self.crossfade_len {
            let active = if self.a_is_active { &mut self.a } else { &mut self.b };
            return active.process_sample(input);
        }

        let frac = (self.crossfade_pos / self.crossfade_len).clamp(0.0, 1.0);
        let (outgoing, incoming) = if self.a_is_active {
            (&mut self.a, &mut self.b)
        } else {
            (&mut self.b, &mut self.a)
        };
        let out_sample = outgoing.process_sample(input);
        let in_sample = incoming.process_sample(input);
        self.crossfade_pos += 1.0;
        if self.crossfade_pos >= self.crossfade_len {
            self.a_is_active = !self.a_is_active;
        }
        out_sample * (1.0 - frac) + in_sample * frac
    }

    pub fn reset(&mut self) {
        self.a.reset();
        self.b.reset();
        self.crossfade_pos = self.crossfade_len;
        self.last_cutoff = 0.0;
        self.last_resonance = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_has_zero_history() {
        let filter = BiquadState::default();
        assert_eq!(filter.z1, 0.0);
        assert_eq!(filter.z2, 0.0);
    }

    #[test]
    fn crossfade_converges_to_steady_state() {
        let mut filter = CrossfadingFilter::new(44100.0);
        filter.update(1000.0, 0.707, 44100.0, 22050.0);
        let mut last = 0.0;
        for _ in 0..1000 {
            last = filter.process_sample(1.0);
        }
        assert!(last.is_finite());
    }

    #[test]
    fn small_cutoff_change_does_not_retrigger_crossfade() {
        let mut filter = CrossfadingFilter::new(44100.0);
        filter.update(1000.0, 0.707, 44100.0, 22050.0);
        for _ in 0..300 {
            filter.process_sample(0.0);
        }
        let pos_before = filter.crossfade_pos;
        filter.update(1000.1, 0.707, 44100.0, 22050.0);
        assert_eq!(filter.crossfade_pos, pos_before);
    }

    #[test]
    fn cutoff_above_nyquist_bypasses() {
        let coeffs = BiquadCoeffs::lowpass(100.0, 0.707, 44100.0);
        assert_ne!(coeffs.b0, 1.0);
        let bypass = BiquadCoeffs::bypass();
        assert_eq!(bypass.b0, 1.0);
        assert_eq!(bypass.b1, 0.0);
    }
}
