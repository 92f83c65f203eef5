//! Spectral shaping and inverse-FFT per target pitch, grounded on
//! `make_padsynth_sample` in the original PADsynth processor.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{ComplexToReal, RealFftPlanner};

use crate::params::{Harmonic, PadsynthParams};
use crate::random::{context_rng, next_unit};

const PROFILE_CUTOFF_SQ: f64 = 27.2972;
/// `sqrt(27.2972)`: the profile is exactly zero past this many bandwidths.
const PROFILE_BOUND_FACTOR: f64 = 5.2247;
const TAU: f64 = 2.0 * PI;

fn cents_to_hz(cents: f64) -> f64 {
    440.0 * 2f64.powf(cents / 1200.0)
}

fn hz_to_cents(hz: f64) -> f64 {
    (hz / 440.0).log2() * 1200.0
}

/// A cyclic buffer of `sample_length + 1` frames: index `sample_length`
/// duplicates index 0, so callers doing linear interpolation never need a
/// modulo on the hot read path.
#[derive(Debug, Clone)]
pub struct PadsynthSample {
    pub centre_pitch_cents: f64,
    pub frames: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct PadsynthBank {
    pub sample_length: usize,
    pub samples: Vec<PadsynthSample>,
}

impl PadsynthBank {
    /// The sample whose centre pitch is closest to `cents`.
    pub fn nearest(&self, cents: f64) -> &PadsynthSample {
        self.samples
            .iter()
            .min_by(|a, b| {
                (a.centre_pitch_cents - cents)
                    .abs()
                    .partial_cmp(&(b.centre_pitch_cents - cents).abs())
                    .unwrap()
            })
            .expect("bank has at least one sample")
    }
}

fn profile(freq_i: f64, bandwidth_i: f64) -> f64 {
    let x = freq_i / bandwidth_i;
    let x2 = x * x;
    if x2 > PROFILE_CUTOFF_SQ {
        0.0
    } else {
        (-x2).exp() / bandwidth_i
    }
}

fn profile_bound(bandwidth_i: f64) -> f64 {
    PROFILE_BOUND_FACTOR * bandwidth_i
}

fn phase_spread_norm(freq_i: f64, bandwidth_i: f64) -> f64 {
    let x = freq_i / bandwidth_i;
    1.0 - (-x * x).exp()
}

fn round_to_period(cents: f64, sample_length: usize, audio_rate: f64) -> f64 {
    let entry_hz = cents_to_hz(cents);
    let cycle_length = audio_rate / entry_hz;
    let cycle_count = sample_length as f64 / cycle_length;
    let rounded_cycle_count = cycle_count.round().max(1.0);
    let rounded_cycle_length = sample_length as f64 / rounded_cycle_count;
    let rounded_entry_hz = audio_rate / rounded_cycle_length;
    hz_to_cents(rounded_entry_hz)
}

/// Evenly spaced target pitches between `min_pitch` and `max_pitch`
/// (inclusive), optionally snapped so each sample holds a whole number of
/// fundamental cycles.
fn target_pitches(params: &PadsynthParams) -> Vec<f64> {
    let count = params.effective_sample_count();
    let raw: Vec<f64> = if count == 1 {
        vec![(params.min_pitch + params.max_pitch) * 0.5]
    } else {
        (0..count)
            .map(|i| {
                let t = i as f64 / (count - 1) as f64;
                params.min_pitch + (params.max_pitch - params.min_pitch) * t
            })
            .collect()
    };
    if params.round_to_period {
        let audio_rate = params.audio_rate as f64;
        raw.into_iter()
            .map(|cents| round_to_period(cents, params.sample_length, audio_rate))
            .collect()
    } else {
        raw
    }
}

/// Shape one pitch's harmonic spectrum and inverse-FFT it to a time-domain
/// cycle. `index` only feeds the deterministic PRNG context string, so
/// parallel ordering across pitches never affects the output.
fn build_one(
    params: &PadsynthParams,
    ifft: &Arc<dyn ComplexToReal<f64>>,
    centre_pitch_cents: f64,
    index: usize,
) -> PadsynthSample {
    let sample_length = params.sample_length;
    let buf_length = sample_length / 2;
    let mut freq_amp = vec![0.0f64; buf_length];
    let mut freq_phase = vec![0.0f64; buf_length];

    let audio_rate = params.audio_rate as f64;
    let nyquist = audio_rate / 2.0;
    let freq = cents_to_hz(centre_pitch_cents);

    let amp_rng_seed = context_rng(&format!("PADsynth{index}"));
    let mut phase_rng = context_rng(&format!("PADphase{index}"));
    let mut amp_rng = amp_rng_seed;

    for harmonic in &params.harmonics {
        shape_harmonic(
            params,
            harmonic,
            freq,
            nyquist,
            audio_rate,
            sample_length,
            buf_length,
            &mut freq_amp,
            &mut freq_phase,
            &mut amp_rng,
            &mut phase_rng,
        );
    }

    if let Some(env) = &params.resonance_envelope {
        for (i, amp) in freq_amp.iter_mut().enumerate() {
            let x = i as f64 * 24000.0 / (buf_length - 1).max(1) as f64;
            *amp *= env.value_at(x);
        }
    }

    if !params.use_phase_data {
        let mut phase_rng = context_rng(&format!("PADsynth{index}"));
        for phase in freq_phase.iter_mut() {
            *phase = next_unit(&mut phase_rng) * TAU;
        }
    }

    let mut spectrum = vec![Complex64::new(0.0, 0.0); sample_length / 2 + 1];
    for i in 1..buf_length {
        spectrum[i] = Complex64::new(
            freq_amp[i] * freq_phase[i].cos(),
            freq_amp[i] * freq_phase[i].sin(),
        );
    }

    let mut time_domain = vec![0.0f64; sample_length];
    let mut spectrum_buf = spectrum.clone();
    ifft.process(&mut spectrum_buf, &mut time_domain)
        .expect("ifft length matches planner configuration");

    let max_abs = time_domain.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let scale = if max_abs > 0.0 { 1.0 / max_abs } else { 1.0 };

    let mut frames = vec![0.0f32; sample_length + 1];
    for (dst, src) in frames.iter_mut().zip(time_domain.iter()) {
        *dst = (src * scale) as f32;
    }
    frames[sample_length] = frames[0];

    PadsynthSample {
        centre_pitch_cents,
        frames,
    }
}

#[allow(clippy::too_many_arguments)]
fn shape_harmonic(
    params: &PadsynthParams,
    harmonic: &Harmonic,
    freq: f64,
    nyquist: f64,
    audio_rate: f64,
    sample_length: usize,
    buf_length: usize,
    freq_amp: &mut [f64],
    freq_phase: &mut [f64],
    amp_rng: &mut rand_chacha::ChaCha8Rng,
    phase_rng: &mut rand_chacha::ChaCha8Rng,
) {
    if freq * harmonic.freq_mul >= nyquist {
        return;
    }

    let bandwidth_hz =
        (2f64.powf(params.bandwidth_base / 1200.0) - 1.0) * freq * harmonic.freq_mul.powf(params.bandwidth_scale);
    let bandwidth_i = bandwidth_hz / (2.0 * audio_rate);
    let freq_i = freq * harmonic.freq_mul / audio_rate;

    let bound = profile_bound(bandwidth_i);
    let buf_start = ((sample_length as f64) * (freq_i - bound)).ceil() as i64;
    let buf_stop = ((sample_length as f64) * (freq_i + bound)).ceil() as i64;
    if buf_start >= buf_length as i64 || buf_stop <= 0 {
        return;
    }
    let buf_start = buf_start.max(0) as usize;
    let buf_stop = (buf_stop as usize).min(buf_length);

    if params.use_phase_data {
        let ps_bandwidth_hz = (2f64.powf(params.phase_spread_bandwidth_base / 1200.0) - 1.0)
            * freq
            * harmonic.freq_mul.powf(params.phase_spread_bandwidth_scale);
        let ps_bandwidth_i = ps_bandwidth_hz / (2.0 * audio_rate);

        for i in buf_start..buf_stop {
            let orig_amp = freq_amp[i];
            let orig_phase = freq_phase[i];
            let orig_real = orig_amp * orig_phase.cos();
            let orig_imag = orig_amp * orig_phase.sin();

            let harmonic_profile = profile((i as f64 / sample_length as f64) - freq_i, bandwidth_i);
            let add_amp = harmonic_profile * harmonic.amplitude;
            let add_real = add_amp * harmonic.phase.cos();
            let add_imag = add_amp * harmonic.phase.sin();

            let new_real = orig_real + add_real;
            let new_imag = orig_imag + add_imag;
            let new_amp = (new_real * new_real + new_imag * new_imag).sqrt();
            let mut new_phase = new_imag.atan2(new_real);
            if new_phase < 0.0 {
                new_phase += TAU;
            }

            let spread_norm = phase_spread_norm((i as f64 / sample_length as f64) - freq_i, ps_bandwidth_i);
            let spread = params.phase_var_at_harmonic
                + (params.phase_var_off_harmonic - params.phase_var_at_harmonic) * spread_norm;
            new_phase += next_unit(phase_rng) * TAU * spread;
            if new_phase >= TAU {
                new_phase %= TAU;
            }

            freq_amp[i] = new_amp;
            freq_phase[i] = new_phase;
        }
        let _ = amp_rng;
    } else {
        for i in buf_start..buf_stop {
            let harmonic_profile = profile((i as f64 / sample_length as f64) - freq_i, bandwidth_i);
            freq_amp[i] += harmonic_profile * harmonic.amplitude;
        }
    }
}

/// Build a full pitch-indexed sample bank. Per §5, this is the one place
/// in the engine allowed to farm work across threads: every pitch's
/// sample buffer is independent, so pitches build in parallel and the
/// pool is implicitly joined by `collect` before this function returns.
pub fn build_bank(params: &PadsynthParams) -> Result<PadsynthBank, String> {
    params.validate()?;
    let pitches = target_pitches(params);

    let mut planner = RealFftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(params.sample_length);

    let samples: Vec<PadsynthSample> = pitches
        .into_par_iter()
        .enumerate()
        .map(|(index, pitch)| build_one(params, &ifft, pitch, index))
        .collect();

    Ok(PadsynthBank {
        sample_length: params.sample_length,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Harmonic;

    fn base_params() -> PadsynthParams {
        PadsynthParams {
            audio_rate: 44100,
            sample_length: 4096,
            sample_count: 1,
            min_pitch: 0.0,
            max_pitch: 0.0,
            centre_pitch: 0.0,
            harmonics: vec![Harmonic::new(1.0, 1.0), Harmonic::new(2.0, 0.5)],
            bandwidth_base: 40.0,
            bandwidth_scale: 1.0,
            phase_spread_bandwidth_base: 0.0,
            phase_spread_bandwidth_scale: 0.0,
            phase_var_at_harmonic: 0.0,
            phase_var_off_harmonic: 0.0,
            resonance_envelope: None,
            round_to_period: false,
            use_phase_data: false,
        }
    }

    #[test]
    fn build_is_deterministic_across_runs() {
        let params = base_params();
        let bank_a = build_bank(&params).unwrap();
        let bank_b = build_bank(&params).unwrap();
        assert_eq!(bank_a.samples[0].frames, bank_b.samples[0].frames);
    }

    #[test]
    fn sample_is_normalized_to_unit_peak() {
        let params = base_params();
        let bank = build_bank(&params).unwrap();
        let max_abs = bank.samples[0].frames.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!((max_abs - 1.0).abs() < 1e-4);
    }

    #[test]
    fn final_frame_duplicates_first() {
        let params = base_params();
        let bank = build_bank(&params).unwrap();
        let sample = &bank.samples[0];
        assert_eq!(sample.frames[sample.frames.len() - 1], sample.frames[0]);
    }

    #[test]
    fn rejects_non_power_of_two_length() {
        let mut params = base_params();
        params.sample_length = 4000;
        assert!(build_bank(&params).is_err());
    }

    #[test]
    fn multi_sample_bank_spans_pitch_range() {
        let mut params = base_params();
        params.sample_count = 4;
        params.min_pitch = 0.0;
        params.max_pitch = 2400.0;
        let bank = build_bank(&params).unwrap();
        assert_eq!(bank.samples.len(), 4);
        let nearest = bank.nearest(1200.0);
        assert!((nearest.centre_pitch_cents - 1200.0).abs() < 1.0);
    }
}
