//! The one [`VoiceProcessor`] node type the engine wires into the device
//! graph: a [`VoicePool`] plus the [`TuningTable`] voices look pitch up
//! through, rendering every active voice's contribution each block. The
//! pool itself is oscillator-agnostic (each [`kunquat_voice::Voice`] owns a
//! boxed [`Oscillator`]); only the constructor picks which kind of
//! oscillator fills the pool, so the same node type backs both the
//! PADsynth-driven production engine and the debug-instrument test rig.

use std::any::Any;
use std::sync::Arc;

use kunquat_graph::VoiceProcessor;
use kunquat_padsynth::PadsynthBank;
use kunquat_tuning::{TuningTable, MIDDLE_OCTAVE};
use kunquat_voice::{Oscillator, PoolError, Slider, VoicePool};

use crate::oscillator::PadsynthOscillator;

pub struct PadsynthVoiceNode {
    pool: VoicePool,
    tuning: TuningTable,
    rate: f64,
}

impl PadsynthVoiceNode {
    pub fn new(capacity: usize, rate: f64, tuning: TuningTable, bank: Arc<PadsynthBank>) -> Self {
        Self::with_oscillator_factory(capacity, rate, tuning, move || {
            Box::new(PadsynthOscillator::new(bank.clone())) as Box<dyn Oscillator>
        })
    }

    /// Build the node with an arbitrary oscillator kind, one freshly made
    /// per voice slot. Used by tests to wire up a [`kunquat_voice::DebugOscillator`]
    /// instead of the production PADsynth lookup.
    pub fn with_oscillator_factory(
        capacity: usize,
        rate: f64,
        tuning: TuningTable,
        make_oscillator: impl Fn() -> Box<dyn Oscillator>,
    ) -> Self {
        let voices = (0..capacity)
            .map(|_| kunquat_voice::Voice::new(rate, make_oscillator()))
            .collect();
        Self {
            pool: VoicePool::new(voices),
            tuning,
            rate,
        }
    }

    /// Trigger a new voice at `note` (scale degree, octave `MIDDLE_OCTAVE`),
    /// returning the voice slot allocated.
    pub fn note_on(&mut self, group_id: u32, note: usize) -> Result<usize, PoolError> {
        let idx = self.pool.allocate()?;
        self.pool.trigger(idx);
        let hz = self.tuning.pitch(note, None, MIDDLE_OCTAVE).ok();
        let voice = self.pool.iter_mut().nth(idx).expect("index from this pool");
        voice.group_id = group_id;
        if let Some(hz) = hz {
            voice.pitch_slider = Slider::new(hz);
        }
        Ok(idx)
    }

    pub fn note_on_hz(&mut self, group_id: u32, hz: f64) -> Result<usize, PoolError> {
        let idx = self.pool.allocate()?;
        self.pool.trigger(idx);
        let voice = self.pool.iter_mut().nth(idx).expect("index from this pool");
        voice.group_id = group_id;
        voice.pitch_slider = Slider::new(hz);
        Ok(idx)
    }

    pub fn release_group(&mut self, group_id: u32) {
        self.pool.release_group(group_id);
    }

    pub fn set_group_force(&mut self, group_id: u32, force: f64) {
        for voice in self.pool.iter_mut() {
            if voice.group_id == group_id && voice.is_active() {
                voice.force = force;
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.pool.active_count()
    }

    pub fn tuning_mut(&mut self) -> &mut TuningTable {
        &mut self.tuning
    }
}

impl VoiceProcessor for PadsynthVoiceNode {
    fn process_voices(&mut self, offset: usize, stop: usize, outputs: &mut [&mut [f32]]) -> usize {
        if outputs.len() < 2 {
            return 0;
        }
        let (heads, tails) = outputs.split_at_mut(1);
        let out_l: &mut [f32] = &mut heads[0][..];
        let out_r: &mut [f32] = &mut tails[0][..];

        let rate = self.rate;
        let mut reclaimed = 0;
        for voice in self.pool.iter_mut() {
            if !voice.is_active() {
                continue;
            }
            let actual_stop = voice.render_subblock(offset, stop, rate, out_l, out_r);
            if actual_stop < stop {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    fn reset(&mut self) {
        for voice in self.pool.iter_mut() {
            voice.oscillator.reset();
        }
    }

    fn set_sample_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
