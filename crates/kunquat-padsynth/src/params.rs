//! Build parameters for a PADsynth sample bank, mirroring
//! `Padsynth_params`/`Padsynth_harmonic` from the original processor.

pub const MIN_SAMPLE_LENGTH: usize = 1 << 12;
pub const MAX_SAMPLE_LENGTH: usize = 1 << 22;
pub const MAX_SAMPLE_COUNT: usize = 128;

#[derive(Debug, Clone, Copy)]
pub struct Harmonic {
    pub freq_mul: f64,
    pub amplitude: f64,
    /// Only read when [`PadsynthParams::use_phase_data`] is set.
    pub phase: f64,
}

impl Harmonic {
    pub fn new(freq_mul: f64, amplitude: f64) -> Self {
        Self {
            freq_mul,
            amplitude,
            phase: 0.0,
        }
    }
}

/// A breakpoint envelope over `[0, 24000]` Hz, sampled linearly, used to
/// shape the overall spectral envelope after harmonics are summed.
#[derive(Debug, Clone)]
pub struct ResonanceEnvelope {
    points: Vec<(f64, f64)>,
}

impl ResonanceEnvelope {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    pub fn value_at(&self, x: f64) -> f64 {
        if self.points.is_empty() {
            return 1.0;
        }
        if x <= self.points[0].0 {
            return self.points[0].1;
        }
        for w in self.points.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x <= x1 {
                let frac = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
                return y0 + (y1 - y0) * frac;
            }
        }
        self.points.last().unwrap().1
    }
}

#[derive(Debug, Clone)]
pub struct PadsynthParams {
    pub audio_rate: u32,
    /// Power-of-two sample length.
    pub sample_length: usize,
    /// Number of pitch-indexed samples to build, ≤ [`MAX_SAMPLE_COUNT`].
    pub sample_count: usize,
    pub min_pitch: f64,
    pub max_pitch: f64,
    pub centre_pitch: f64,
    pub harmonics: Vec<Harmonic>,
    /// Bandwidth of the fundamental, in cents.
    pub bandwidth_base: f64,
    pub bandwidth_scale: f64,
    pub phase_spread_bandwidth_base: f64,
    pub phase_spread_bandwidth_scale: f64,
    pub phase_var_at_harmonic: f64,
    pub phase_var_off_harmonic: f64,
    pub resonance_envelope: Option<ResonanceEnvelope>,
    pub round_to_period: bool,
    pub use_phase_data: bool,
}

impl PadsynthParams {
    pub fn validate(&self) -> Result<(), String> {
        if !self.sample_length.is_power_of_two() {
            return Err(format!("sample_length {} is not a power of two", self.sample_length));
        }
        if !(MIN_SAMPLE_LENGTH..=MAX_SAMPLE_LENGTH).contains(&self.sample_length) {
            return Err(format!(
                "sample_length {} out of range [{}, {}]",
                self.sample_length, MIN_SAMPLE_LENGTH, MAX_SAMPLE_LENGTH
            ));
        }
        if self.sample_count == 0 || self.sample_count > MAX_SAMPLE_COUNT {
            return Err(format!("sample_count {} out of range", self.sample_count));
        }
        if self.min_pitch > self.max_pitch {
            return Err("min_pitch must not exceed max_pitch".to_string());
        }
        Ok(())
    }

    /// Effective sample count: pitch ranges narrower than a cent collapse
    /// to a single sample, matching the original's "use only one sample
    /// with very small pitch ranges" rule.
    pub fn effective_sample_count(&self) -> usize {
        if (self.min_pitch - self.max_pitch).abs() < 1.0 {
            1
        } else {
            self.sample_count
        }
    }
}
