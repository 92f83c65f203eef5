//! Note/ratio tuning table ("Scale" in the original), grounded on
//! `original_source/src/lib/Scale.c`.
//!
//! A tuning table is a fixed-capacity ordered list of notes, each a ratio
//! relative to a reference pitch, plus a small table of ratio modifiers
//! used for microtonal inflections. Retuning moves the reference note to a
//! different index while keeping one note's absolute pitch fixed, which is
//! the operation composers use to play the same scale starting from a
//! different note without audibly shifting the notes already sounding.

use kunquat_core::{ErrorKind, KindedError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of notes a table can hold.
pub const MAX_NOTES: usize = 128;
/// Upper bound on the number of ratio modifiers.
pub const MAX_NOTE_MODS: usize = 16;
/// Number of precomputed octave multipliers; index `MIDDLE_OCTAVE` is 1.0.
pub const OCTAVES: usize = 16;
/// The octave index whose factor is exactly 1.0.
pub const MIDDLE_OCTAVE: usize = OCTAVES / 2;

#[derive(Debug, Error, Clone)]
pub enum TuningError {
    #[error("tuning table holds at most {MAX_NOTES} notes")]
    TooManyNotes,
    #[error("tuning table holds at most {MAX_NOTE_MODS} note modifiers")]
    TooManyNoteMods,
    #[error("note index {0} does not exist in this table")]
    NoSuchNote(usize),
    #[error("note modifier index {0} does not exist in this table")]
    NoSuchNoteMod(usize),
    #[error("octave index {0} is out of range [0, {OCTAVES})")]
    OctaveOutOfRange(usize),
    #[error("reference note index {0} is out of range")]
    BadRefNote(usize),
}

impl KindedError for TuningError {
    fn kind(&self) -> ErrorKind {
        match self {
            TuningError::TooManyNotes | TuningError::TooManyNoteMods => ErrorKind::Resource,
            _ => ErrorKind::Argument,
        }
    }
}

pub type TuningResult<T> = Result<T, TuningError>;

/// One entry of the scale: a ratio to the reference pitch, named in cents
/// for display, plus the ratio currently in effect after the last retune.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub original_ratio: f64,
    pub current_ratio: f64,
    pub cents: f64,
}

impl Note {
    pub fn new(original_ratio: f64, cents: f64) -> Self {
        Self {
            original_ratio,
            current_ratio: original_ratio,
            cents,
        }
    }
}

/// A ratio multiplier applied on top of a note's current ratio, used for
/// e.g. comma adjustments that do not warrant their own scale degree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteMod {
    pub ratio: f64,
    pub cents: f64,
}

/// Either a plain ratio or a cents value; [`TuningTable::new`] accepts
/// either for the octave ratio and all note ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RatioSpec {
    Ratio(f64),
    Cents(f64),
}

impl RatioSpec {
    fn to_ratio(self) -> f64 {
        match self {
            RatioSpec::Ratio(r) => r,
            RatioSpec::Cents(c) => 2f64.powf(c / 1200.0),
        }
    }

    fn to_cents(self) -> f64 {
        match self {
            RatioSpec::Ratio(r) => 1200.0 * r.log2(),
            RatioSpec::Cents(c) => c,
        }
    }
}

/// A note/ratio map with retuning support.
///
/// Invariant: `current_ratio` of every note is derivable from
/// `original_ratio`, the currently active reference note, and
/// `octave_ratio`. Retuning to the original reference is idempotent.
#[derive(Debug, Clone)]
pub struct TuningTable {
    notes: Vec<Note>,
    note_mods: Vec<NoteMod>,
    ref_note: usize,
    ref_note_retuned: usize,
    ref_pitch_hz: f64,
    octave_ratio: f64,
    oct_factors: [f64; OCTAVES],
}

impl TuningTable {
    /// Build a table. `notes` and `note_mods` are given as `RatioSpec`s;
    /// `ref_note` must index an existing note.
    pub fn new(
        ref_note: usize,
        ref_pitch_hz: f64,
        octave_ratio: RatioSpec,
        notes: &[RatioSpec],
        note_mods: &[RatioSpec],
    ) -> TuningResult<Self> {
        if notes.len() > MAX_NOTES {
            return Err(TuningError::TooManyNotes);
        }
        if note_mods.len() > MAX_NOTE_MODS {
            return Err(TuningError::TooManyNoteMods);
        }
        if ref_note >= notes.len() {
            return Err(TuningError::BadRefNote(ref_note));
        }

        let octave_ratio = octave_ratio.to_ratio();
        let notes: Vec<Note> = notes
            .iter()
            .map(|spec| Note::new(spec.to_ratio(), spec.to_cents()))
            .collect();
        let note_mods: Vec<NoteMod> = note_mods
            .iter()
            .map(|spec| NoteMod {
                ratio: spec.to_ratio(),
                cents: spec.to_cents(),
            })
            .collect();

        let mut table = Self {
            notes,
            note_mods,
            ref_note,
            ref_note_retuned: ref_note,
            ref_pitch_hz,
            octave_ratio,
            oct_factors: [1.0; OCTAVES],
        };
        table.init_oct_factors();
        Ok(table)
    }

    fn init_oct_factors(&mut self) {
        self.oct_factors[MIDDLE_OCTAVE] = 1.0;
        for i in (0..MIDDLE_OCTAVE).rev() {
            self.oct_factors[i] = self.oct_factors[i + 1] / self.octave_ratio;
        }
        for i in (MIDDLE_OCTAVE + 1)..OCTAVES {
            self.oct_factors[i] = self.oct_factors[i - 1] * self.octave_ratio;
        }
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }

    pub fn ref_note(&self) -> usize {
        self.ref_note_retuned
    }

    fn note(&self, index: usize) -> TuningResult<&Note> {
        self.notes.get(index).ok_or(TuningError::NoSuchNote(index))
    }

    /// `ref_pitch × current_ratio[note] × (mod_ratio[mod] if present) × oct_factors[octave]`.
    pub fn pitch(&self, note: usize, note_mod: Option<usize>, octave: usize) -> TuningResult<f64> {
        let oct_factor = *self
            .oct_factors
            .get(octave)
            .ok_or(TuningError::OctaveOutOfRange(octave))?;
        let mut ratio = self.note(note)?.current_ratio;
        if let Some(m) = note_mod {
            let modifier = self
                .note_mods
                .get(m)
                .ok_or(TuningError::NoSuchNoteMod(m))?;
            ratio *= modifier.ratio;
        }
        Ok(self.ref_pitch_hz * ratio * oct_factor)
    }

    /// Recompute `current_ratio` so the note at `fixed_point` keeps its
    /// absolute pitch while `new_ref` becomes the active reference.
    /// `new_ref < 0` restores every `current_ratio` to its original value.
    ///
    /// Ported from `Scale_retune` verbatim in structure: the wrap-direction
    /// comparisons correct for the fact that the note *index* that keeps a
    /// fixed octave-relationship to the reference can cross the array wrap
    /// point in the opposite direction from the reference note itself, in
    /// which case the octave ratio has to be added back in or divided out.
    pub fn retune(&mut self, new_ref: i64, fixed_point: Option<usize>) {
        let note_count = self.notes.len();
        if note_count == 0 {
            return;
        }

        if new_ref < 0 {
            self.ref_note_retuned = self.ref_note;
            for note in &mut self.notes {
                note.current_ratio = note.original_ratio;
            }
            return;
        }
        let new_ref = new_ref as usize;

        if new_ref == self.ref_note_retuned || new_ref >= note_count {
            return;
        }
        let fixed_point = match fixed_point {
            Some(fp) if fp < note_count => fp,
            _ => self.ref_note_retuned,
        };

        let fixed_new_order = (fixed_point + note_count - new_ref) % note_count;
        let fixed_counterpart = (self.ref_note_retuned + fixed_new_order) % note_count;

        let mut fixed_to_new_ref_ratio =
            self.notes[fixed_counterpart].current_ratio / self.notes[self.ref_note_retuned].current_ratio;
        if fixed_counterpart > self.ref_note_retuned && fixed_point < new_ref {
            fixed_to_new_ref_ratio /= self.octave_ratio;
        } else if fixed_counterpart < self.ref_note_retuned && fixed_point > new_ref {
            fixed_to_new_ref_ratio *= self.octave_ratio;
        }

        let mut new_ratios = vec![0.0f64; note_count];
        new_ratios[new_ref] = self.notes[fixed_point].current_ratio / fixed_to_new_ref_ratio;

        for i in 1..note_count {
            let cur_from_old_ref = (self.ref_note_retuned + i) % note_count;
            let cur_from_new_ref = (new_ref + i) % note_count;
            if cur_from_new_ref == fixed_point {
                new_ratios[fixed_point] = self.notes[fixed_point].current_ratio;
                continue;
            }
            let mut to_ref_ratio = self.notes[cur_from_old_ref].current_ratio
                / self.notes[self.ref_note_retuned].current_ratio;
            if cur_from_new_ref > new_ref && cur_from_old_ref < self.ref_note_retuned {
                to_ref_ratio *= self.octave_ratio;
            } else if cur_from_new_ref < new_ref && cur_from_old_ref > self.ref_note_retuned {
                to_ref_ratio /= self.octave_ratio;
            }
            new_ratios[cur_from_new_ref] = to_ref_ratio * new_ratios[new_ref];
        }

        self.ref_note_retuned = new_ref;
        for (note, ratio) in self.notes.iter_mut().zip(new_ratios) {
            note.current_ratio = ratio;
        }
    }

    /// Insert a note at `index`, shifting later notes up by one and
    /// dropping the last note if the table is already full.
    pub fn insert_note(&mut self, index: usize, ratio: RatioSpec) -> TuningResult<()> {
        if index > self.notes.len() {
            return Err(TuningError::NoSuchNote(index));
        }
        if self.notes.len() >= MAX_NOTES {
            return Err(TuningError::TooManyNotes);
        }
        self.notes
            .insert(index, Note::new(ratio.to_ratio(), ratio.to_cents()));
        if self.ref_note_retuned >= index {
            self.ref_note_retuned += 1;
        }
        if self.ref_note >= index {
            self.ref_note += 1;
        }
        Ok(())
    }

    /// Remove the note at `index`, shifting later notes down by one.
    pub fn delete_note(&mut self, index: usize) -> TuningResult<()> {
        if index >= self.notes.len() {
            return Err(TuningError::NoSuchNote(index));
        }
        self.notes.remove(index);
        if self.ref_note_retuned > index {
            self.ref_note_retuned -= 1;
        } else if self.ref_note_retuned == index {
            self.ref_note_retuned = 0;
        }
        if self.ref_note > index {
            self.ref_note -= 1;
        } else if self.ref_note == index {
            self.ref_note = 0;
        }
        Ok(())
    }

    /// Move the note at `index` to `new_index`, shifting the notes between
    /// the two positions to make room.
    pub fn shift_note(&mut self, index: usize, new_index: usize) -> TuningResult<()> {
        if index >= self.notes.len() || new_index >= self.notes.len() {
            return Err(TuningError::NoSuchNote(index.max(new_index)));
        }
        let note = self.notes.remove(index);
        self.notes.insert(new_index, note);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn equal_tempered(note_count: usize) -> TuningTable {
        let notes: Vec<RatioSpec> = (0..note_count)
            .map(|i| RatioSpec::Cents(i as f64 * 100.0))
            .collect();
        TuningTable::new(0, 440.0, RatioSpec::Ratio(2.0), &notes, &[]).unwrap()
    }

    #[test]
    fn oct_factors_are_centered_on_one() {
        let table = equal_tempered(12);
        assert_relative_eq!(table.oct_factors[MIDDLE_OCTAVE], 1.0);
        assert_relative_eq!(table.oct_factors[MIDDLE_OCTAVE + 1], 2.0);
        assert_relative_eq!(table.oct_factors[MIDDLE_OCTAVE - 1], 0.5);
    }

    #[test]
    fn pitch_lookup_uses_ref_and_octave() {
        let table = equal_tempered(12);
        let a4 = table.pitch(0, None, MIDDLE_OCTAVE).unwrap();
        assert_relative_eq!(a4, 440.0);
        let a5 = table.pitch(0, None, MIDDLE_OCTAVE + 1).unwrap();
        assert_relative_eq!(a5, 880.0);
    }

    #[test]
    fn retune_keeps_fixed_point_absolute_pitch() {
        let mut table = equal_tempered(12);
        let fixed = 7; // a note other than the reference
        let before = table.pitch(fixed, None, MIDDLE_OCTAVE).unwrap();
        table.retune(3, Some(fixed));
        let after = table.pitch(fixed, None, MIDDLE_OCTAVE).unwrap();
        assert_relative_eq!(before, after, epsilon = 1e-9);
        assert_eq!(table.ref_note(), 3);
    }

    #[test]
    fn retune_negative_restores_original() {
        let mut table = equal_tempered(12);
        table.retune(5, Some(2));
        table.retune(-1, None);
        assert_eq!(table.ref_note(), 0);
        for note in &table.notes {
            assert_relative_eq!(note.current_ratio, note.original_ratio);
        }
    }

    #[test]
    fn retune_then_reset_is_identity_on_pitches() {
        let mut table = equal_tempered(12);
        let before: Vec<f64> = (0..12)
            .map(|n| table.pitch(n, None, MIDDLE_OCTAVE).unwrap())
            .collect();
        table.retune(4, Some(1));
        table.retune(-1, None);
        let after: Vec<f64> = (0..12)
            .map(|n| table.pitch(n, None, MIDDLE_OCTAVE).unwrap())
            .collect();
        for (b, a) in before.iter().zip(after.iter()) {
            assert_relative_eq!(b, a, epsilon = 1e-9);
        }
    }

    #[test]
    fn retune_to_current_ref_is_a_no_op() {
        let mut table = equal_tempered(12);
        let before: Vec<f64> = table.notes.iter().map(|n| n.current_ratio).collect();
        table.retune(0, Some(3));
        let after: Vec<f64> = table.notes.iter().map(|n| n.current_ratio).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn note_mod_multiplies_ratio() {
        let notes = vec![RatioSpec::Ratio(1.0), RatioSpec::Ratio(1.5)];
        let mods = vec![RatioSpec::Cents(10.0)];
        let table = TuningTable::new(0, 440.0, RatioSpec::Ratio(2.0), &notes, &mods).unwrap();
        let plain = table.pitch(1, None, MIDDLE_OCTAVE).unwrap();
        let modded = table.pitch(1, Some(0), MIDDLE_OCTAVE).unwrap();
        assert!(modded > plain);
    }

    #[test]
    fn insert_and_delete_note_shift_reference() {
        let mut table = equal_tempered(4);
        table.insert_note(0, RatioSpec::Ratio(1.0)).unwrap();
        assert_eq!(table.ref_note(), 1);
        table.delete_note(0).unwrap();
        assert_eq!(table.ref_note(), 0);
        assert_eq!(table.note_count(), 4);
    }

    #[test]
    fn too_many_notes_is_rejected() {
        let notes: Vec<RatioSpec> = (0..MAX_NOTES + 1).map(|_| RatioSpec::Ratio(1.0)).collect();
        let err = TuningTable::new(0, 440.0, RatioSpec::Ratio(2.0), &notes, &[]);
        assert!(matches!(err, Err(TuningError::TooManyNotes)));
    }
}
