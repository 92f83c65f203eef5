mod build;
mod params;
mod random;

pub use build::{build_bank, PadsynthBank, PadsynthSample};
pub use params::{
    Harmonic, PadsynthParams, ResonanceEnvelope, MAX_SAMPLE_COUNT, MAX_SAMPLE_LENGTH, MIN_SAMPLE_LENGTH,
};
