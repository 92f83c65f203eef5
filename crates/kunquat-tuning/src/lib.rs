//! Note/ratio tuning tables: construction, pitch lookup, and retuning.

mod table;

pub use table::{
    Note, NoteMod, RatioSpec, TuningError, TuningResult, TuningTable, MAX_NOTES, MAX_NOTE_MODS,
    MIDDLE_OCTAVE, OCTAVES,
};
