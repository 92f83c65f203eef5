mod debug;
mod filter;
mod pool;
mod slider;
mod voice;

pub use debug::DebugOscillator;
pub use filter::{BiquadCoeffs, BiquadState, CrossfadingFilter};
pub use pool::{PoolError, VoicePool};
pub use slider::{Arpeggio, Envelope, Lfo, Slider};
pub use voice::{Oscillator, Voice, VoiceState, RAMP_ATTACK_TIME, RAMP_RELEASE_TIME};
