//! A single polyphonic voice: identity, the full mutator set of §4.5, and
//! the sub-block render pipeline that chains them in the specified order.

use crate::filter::CrossfadingFilter;
use crate::slider::{Arpeggio, Envelope, Lfo, Slider};

/// `500/sec`: attack reaches unity `rate/RAMP_ATTACK_TIME` frames in.
pub const RAMP_ATTACK_TIME: f64 = 500.0;
/// `200/sec`: release reaches unity `rate/RAMP_RELEASE_TIME` frames in.
pub const RAMP_RELEASE_TIME: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Allocated,
    Active,
    Releasing,
    Silent,
}

/// Generates the raw (unfiltered, unpanned) per-frame signal for a voice
/// given its instantaneous pitch; implemented by whatever processor owns
/// the voice pool (oscillator, sample player, PADsynth lookup, ...).
///
/// `note_on` carries the voice's current on/off state so a waveform whose
/// shape depends on release (the debug instrument's sign flip) can react
/// on the exact frame release happens, without resetting phase.
pub trait Oscillator: Send {
    fn next_sample(&mut self, pitch_hz: f64, rate: f64, note_on: bool) -> f32;
    fn reset(&mut self);
}

pub struct Voice {
    pub audio_unit_id: u32,
    pub group_id: u32,
    pub priority: i32,
    pub birth_seq: u64,
    pub state: VoiceState,

    pub pitch: f64,
    pub pitch_slider: Slider,
    pub vibrato: Lfo,
    pub arpeggio: Arpeggio,

    pub force: f64,
    pub global_force: f64,
    pub force_slider: Slider,
    pub tremolo: Lfo,
    pub force_envelope: Option<Envelope>,
    pub force_release_envelope: Option<Envelope>,
    force_env_pos: f64,
    force_release_env_pos: f64,

    pub lowpass: f64,
    pub lowpass_slider: Slider,
    pub autowah: Lfo,
    pub resonance: f64,
    filter: CrossfadingFilter,

    pub panning: f64,
    pub panning_slider: Slider,
    pub pan_envelope: Option<Envelope>,
    pan_env_pos: f64,

    pub note_on: bool,
    pub ramp_attack: f64,
    pub ramp_release: f64,
    pub sustain: bool,

    pub oscillator: Box<dyn Oscillator>,
}

impl Voice {
    pub fn new(rate: f64, oscillator: Box<dyn Oscillator>) -> Self {
        Self {
            audio_unit_id: 0,
            group_id: 0,
            priority: 0,
            birth_seq: 0,
            state: VoiceState::Silent,
            pitch: 440.0,
            pitch_slider: Slider::new(440.0),
            vibrato: Lfo::default(),
            arpeggio: Arpeggio::default(),
            force: 1.0,
            global_force: 1.0,
            force_slider: Slider::new(1.0),
            tremolo: Lfo::default(),
            force_envelope: None,
            force_release_envelope: None,
            force_env_pos: 0.0,
            force_release_env_pos: 0.0,
            lowpass: 22_050.0,
            lowpass_slider: Slider::new(22_050.0),
            autowah: Lfo::default(),
            resonance: 0.707,
            filter: CrossfadingFilter::new(rate),
            panning: 0.0,
            panning_slider: Slider::new(0.0),
            pan_envelope: None,
            pan_env_pos: 0.0,
            note_on: false,
            ramp_attack: 0.0,
            ramp_release: 0.0,
            sustain: false,
            oscillator,
        }
    }

    /// Allocate this slot for a fresh note: reset the per-note envelope
    /// and ramp state but keep the pool-assigned identity fields for the
    /// caller to overwrite.
    pub fn trigger(&mut self, birth_seq: u64) {
        self.state = VoiceState::Active;
        self.note_on = true;
        self.birth_seq = birth_seq;
        self.ramp_attack = 0.0;
        self.ramp_release = 0.0;
        self.force_env_pos = 0.0;
        self.force_release_env_pos = 0.0;
        self.pan_env_pos = 0.0;
        self.filter.reset();
        self.oscillator.reset();
    }

    pub fn release(&mut self) {
        if self.note_on {
            self.note_on = false;
            self.state = VoiceState::Releasing;
        }
    }

    pub fn is_active(&self) -> bool {
        self.state != VoiceState::Silent
    }

    /// Run the six-stage pipeline of §4.5 over `[offset, stop)`, writing
    /// into `out_l`/`out_r` (summed, not overwritten, so the caller can mix
    /// several voices into the same buffer). Returns the frame at which
    /// the voice actually stopped producing sound, which may be less than
    /// `stop` if a release envelope or ramp finished mid-block; the caller
    /// should mark the voice `Silent` when the returned stop is less than
    /// the requested one.
    #[allow(clippy::too_many_arguments)]
    pub fn render_subblock(
        &mut self,
        offset: usize,
        stop: usize,
        rate: f64,
        out_l: &mut [f32],
        out_r: &mut [f32],
    ) -> usize {
        let mut actual_stop = stop;

        for i in offset..stop {
            // 1. Pitch pipeline.
            let mut pitch = self.pitch_slider.step();
            pitch *= self.vibrato.step_multiplier(rate);
            pitch *= self.arpeggio.step_multiplier();

            // 2. Force pipeline.
            let mut force = self.force_slider.step() * self.global_force;
            force *= self.tremolo.step_multiplier(rate);
            if let Some(env) = &self.force_envelope {
                let t = if env.scale_from_pitch {
                    self.force_env_pos * (pitch / 440.0)
                } else {
                    self.force_env_pos
                };
                let frozen_at_sustain = self.sustain && env.sustain_time().map(|s| t >= s).unwrap_or(false);
                let (value, _) = env.sample(t);
                force *= value;
                if !frozen_at_sustain {
                    self.force_env_pos += 1.0 / rate;
                }
            }
            if !self.note_on {
                if let Some(release_env) = &self.force_release_envelope {
                    let (value, finished) = release_env.sample(self.force_release_env_pos);
                    force *= value;
                    self.force_release_env_pos += 1.0 / rate;
                    if finished {
                        actual_stop = i + 1;
                        break;
                    }
                }
            }

            // 3. Filter pipeline.
            let nyquist = rate / 2.0;
            let lowpass = self.lowpass_slider.step() * self.autowah.step_multiplier(rate);
            self.filter.update(lowpass, self.resonance, rate, nyquist);

            // 4. Attack ramp.
            self.ramp_attack = (self.ramp_attack + RAMP_ATTACK_TIME / rate).min(1.0);
            force *= self.ramp_attack;

            // 5. Release ramp (only drives the voice silent when there is
            // no release envelope already doing that job above).
            if !self.note_on && self.force_release_envelope.is_none() {
                self.ramp_release = (self.ramp_release + RAMP_RELEASE_TIME / rate).min(1.0);
                let gain = (1.0 - self.ramp_release).max(0.0);
                force *= gain;
                if self.ramp_release >= 1.0 {
                    actual_stop = i + 1;
                }
            }

            let raw = self.oscillator.next_sample(pitch, rate, self.note_on) as f64;
            let filtered = self.filter.process_sample(raw * force);

            // 6. Panning.
            let mut pan = self.panning_slider.step();
            if let Some(env) = &self.pan_envelope {
                let (contribution, _) = env.sample(pitch);
                pan = (pan + contribution).clamp(-1.0, 1.0);
            }
            out_l[i] += (filtered * (1.0 - pan)) as f32;
            out_r[i] += (filtered * (1.0 + pan)) as f32;

            if actual_stop <= i + 1 && actual_stop < stop {
                break;
            }
        }

        if actual_stop < stop {
            self.state = VoiceState::Silent;
            self.note_on = false;
        }
        actual_stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentOscillator;
    impl Oscillator for SilentOscillator {
        fn next_sample(&mut self, _pitch_hz: f64, _rate: f64, _note_on: bool) -> f32 {
            1.0
        }
        fn reset(&mut self) {}
    }

    fn make_voice() -> Voice {
        Voice::new(44100.0, Box::new(SilentOscillator))
    }

    #[test]
    fn attack_ramp_reaches_unity() {
        let mut voice = make_voice();
        voice.trigger(1);
        let frames = (44100.0 / RAMP_ATTACK_TIME).ceil() as usize + 2;
        let mut l = vec![0.0f32; frames];
        let mut r = vec![0.0f32; frames];
        voice.render_subblock(0, frames, 44100.0, &mut l, &mut r);
        assert!((voice.ramp_attack - 1.0).abs() < 1e-9);
    }

    #[test]
    fn release_ramp_silences_voice_without_release_envelope() {
        let mut voice = make_voice();
        voice.trigger(1);
        voice.ramp_attack = 1.0;
        voice.release();
        let frames = (44100.0 / RAMP_RELEASE_TIME).ceil() as usize + 10;
        let mut l = vec![0.0f32; frames];
        let mut r = vec![0.0f32; frames];
        let stop = voice.render_subblock(0, frames, 44100.0, &mut l, &mut r);
        assert!(stop < frames);
        assert_eq!(voice.state, VoiceState::Silent);
    }

    #[test]
    fn active_voice_stays_active_mid_block() {
        let mut voice = make_voice();
        voice.trigger(1);
        let mut l = vec![0.0f32; 16];
        let mut r = vec![0.0f32; 16];
        let stop = voice.render_subblock(0, 16, 44100.0, &mut l, &mut r);
        assert_eq!(stop, 16);
        assert_eq!(voice.state, VoiceState::Active);
    }

    #[test]
    fn panning_shifts_energy_between_channels() {
        let mut voice = make_voice();
        voice.trigger(1);
        voice.panning_slider = Slider::new(0.8);
        voice.ramp_attack = 1.0;
        let mut l = vec![0.0f32; 8];
        let mut r = vec![0.0f32; 8];
        voice.render_subblock(0, 8, 44100.0, &mut l, &mut r);
        assert!(r[4].abs() > l[4].abs());
    }
}
