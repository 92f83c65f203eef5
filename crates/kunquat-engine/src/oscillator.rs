//! Turns a built [`PadsynthBank`] into a per-voice [`Oscillator`]: pick the
//! bank sample nearest the voice's current pitch and read through it at the
//! phase increment that pitch implies, linearly interpolating between
//! frames.

use std::sync::Arc;

use kunquat_padsynth::PadsynthBank;
use kunquat_voice::Oscillator;

pub struct PadsynthOscillator {
    bank: Arc<PadsynthBank>,
    phase: f64,
}

impl PadsynthOscillator {
    pub fn new(bank: Arc<PadsynthBank>) -> Self {
        Self { bank, phase: 0.0 }
    }
}

impl Oscillator for PadsynthOscillator {
    fn next_sample(&mut self, pitch_hz: f64, rate: f64, _note_on: bool) -> f32 {
        let cents = 1200.0 * (pitch_hz / 440.0).log2();
        let sample = self.bank.nearest(cents);
        let cycle_len = sample.frames.len() - 1;

        let pos = self.phase * cycle_len as f64;
        let i0 = pos.floor() as usize % cycle_len;
        let i1 = (i0 + 1) % cycle_len;
        let frac = pos - pos.floor();
        let value = sample.frames[i0] as f64 * (1.0 - frac) + sample.frames[i1] as f64 * frac;

        self.phase += pitch_hz / rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        value as f32
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kunquat_padsynth::{build_bank, Harmonic, PadsynthParams};

    fn test_bank() -> Arc<PadsynthBank> {
        let params = PadsynthParams {
            audio_rate: 44100,
            sample_length: 4096,
            sample_count: 1,
            min_pitch: 0.0,
            max_pitch: 0.0,
            centre_pitch: 0.0,
            harmonics: vec![Harmonic::new(1.0, 1.0)],
            bandwidth_base: 40.0,
            bandwidth_scale: 1.0,
            phase_spread_bandwidth_base: 0.0,
            phase_spread_bandwidth_scale: 0.0,
            phase_var_at_harmonic: 0.0,
            phase_var_off_harmonic: 0.0,
            resonance_envelope: None,
            round_to_period: false,
            use_phase_data: false,
        };
        Arc::new(build_bank(&params).unwrap())
    }

    #[test]
    fn produces_bounded_samples() {
        let mut osc = PadsynthOscillator::new(test_bank());
        for _ in 0..256 {
            let s = osc.next_sample(440.0, 44100.0, true);
            assert!(s.abs() <= 1.01);
        }
    }

    #[test]
    fn reset_rewinds_phase() {
        let mut osc = PadsynthOscillator::new(test_bank());
        for _ in 0..50 {
            osc.next_sample(440.0, 44100.0, true);
        }
        osc.reset();
        assert_eq!(osc.phase, 0.0);
    }
}
