//! Tempo and tempo-slide state.
//!
//! A slide moves the tempo from its value at slide-start to a target BPM
//! over a configured duration, stepping *exponentially* in log2(bpm) per
//! frame so the perceived rate of change is constant rather than skewed
//! toward the low or high end of the range (matching the log-domain ramp
//! `rf_core::tempo::TempoRamp::Exponential` uses for the same purpose).

use kunquat_core::Tstamp;

/// Frames per step used while a slide is in progress: bulk-converting a
/// whole render block under a continuously-changing tempo would drift, so
/// slide frames are walked in chunks small enough that the log2 ramp
/// inside one chunk is well approximated by its midpoint tempo.
pub const SLIDE_CHUNK_FRAMES: u32 = 64;

#[derive(Debug, Clone, Copy)]
struct Slide {
    start_log2: f64,
    target_log2: f64,
    total_frames: f64,
    elapsed_frames: f64,
}

#[derive(Debug, Clone)]
pub struct TempoState {
    bpm: f64,
    pending_slide_length: Tstamp,
    slide: Option<Slide>,
}

impl TempoState {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            pending_slide_length: Tstamp::ZERO,
            slide: None,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// `m.t`: set the tempo instantly, canceling any slide in progress.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.bpm = bpm;
        self.slide = None;
    }

    /// `m/=t`: configure the duration of the *next* slide; does not affect
    /// one already in progress.
    pub fn set_slide_length(&mut self, length: Tstamp) {
        self.pending_slide_length = length;
    }

    /// `m/t`: begin sliding toward `target_bpm` using the last configured
    /// slide length. A zero length makes this equivalent to `set_tempo`.
    pub fn set_slide_target(&mut self, target_bpm: f64, rate: f64) {
        if self.pending_slide_length.is_zero() {
            self.set_tempo(target_bpm);
            return;
        }
        let total_frames = self.pending_slide_length.to_frames(self.bpm, rate);
        if total_frames <= 0.0 {
            self.set_tempo(target_bpm);
            return;
        }
        self.slide = Some(Slide {
            start_log2: self.bpm.log2(),
            target_log2: target_bpm.log2(),
            total_frames,
            elapsed_frames: 0.0,
        });
    }

    pub fn is_sliding(&self) -> bool {
        self.slide.is_some()
    }

    /// Frames remaining until the slide reaches its target, if any.
    pub fn frames_until_slide_end(&self) -> Option<f64> {
        self.slide.map(|s| (s.total_frames - s.elapsed_frames).max(0.0))
    }

    /// Advance the slide by `frames` (a sub-chunk no larger than
    /// [`SLIDE_CHUNK_FRAMES`]), updating `bpm` to the interpolated value at
    /// the new position.
    pub fn step(&mut self, frames: f64) {
        let Some(slide) = &mut self.slide else { return };
        slide.elapsed_frames = (slide.elapsed_frames + frames).min(slide.total_frames);
        let frac = slide.elapsed_frames / slide.total_frames;
        self.bpm = 2f64.powf(slide.start_log2 + (slide.target_log2 - slide.start_log2) * frac);
        if frac >= 1.0 {
            self.slide = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn instant_tempo_set_cancels_slide() {
        let mut tempo = TempoState::new(120.0);
        tempo.set_slide_length(Tstamp::new(1, 0));
        tempo.set_slide_target(140.0, 44100.0);
        assert!(tempo.is_sliding());
        tempo.set_tempo(100.0);
        assert!(!tempo.is_sliding());
        assert_eq!(tempo.bpm(), 100.0);
    }

    #[test]
    fn zero_length_slide_is_instant() {
        let mut tempo = TempoState::new(120.0);
        tempo.set_slide_target(140.0, 44100.0);
        assert!(!tempo.is_sliding());
        assert_eq!(tempo.bpm(), 140.0);
    }

    #[test]
    fn slide_reaches_target_bpm_exactly_at_end() {
        let mut tempo = TempoState::new(100.0);
        tempo.set_slide_length(Tstamp::new(1, 0));
        tempo.set_slide_target(200.0, 44100.0);
        let total = tempo.frames_until_slide_end().unwrap();
        tempo.step(total);
        assert_relative_eq!(tempo.bpm(), 200.0, epsilon = 1e-6);
        assert!(!tempo.is_sliding());
    }

    #[test]
    fn slide_midpoint_is_geometric_mean_in_log_domain() {
        let mut tempo = TempoState::new(100.0);
        tempo.set_slide_length(Tstamp::new(1, 0));
        tempo.set_slide_target(400.0, 44100.0);
        let total = tempo.frames_until_slide_end().unwrap();
        tempo.step(total / 2.0);
        assert_relative_eq!(tempo.bpm(), 200.0, epsilon = 1e-3);
    }
}
