//! Renderer entrypoint: the one crate a host links against. Ties the
//! device graph, voice pool, scheduler, and event runtime into the
//! block-rate `play` / `fire_event` / `receive_events` contract, with a
//! PADsynth-backed oscillator as the only voice DSP a composition drives.

mod config;
mod dispatch;
mod engine;
mod error;
mod oscillator;
mod voice_node;

pub use config::EngineConfig;
pub use dispatch::VoiceDispatch;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use oscillator::PadsynthOscillator;
pub use voice_node::PadsynthVoiceNode;
