mod cursor;
mod error;
mod pattern;
mod scheduler;
mod tempo;

pub use cursor::Cursor;
pub use error::{PlayerError, PlayerResult};
pub use pattern::{Column, Composition, Pattern, PatternId, PatternInstanceRef, Track, Trigger};
pub use scheduler::{Scheduler, SchedulerStep};
pub use tempo::{TempoState, SLIDE_CHUNK_FRAMES};
