//! The song cursor: `(track, system, order_index, row)`.

use kunquat_core::Tstamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub track: usize,
    pub system: usize,
    pub order_index: usize,
    pub row: Tstamp,
}

impl Cursor {
    pub fn start(track: usize, system: usize) -> Self {
        Self {
            track,
            system,
            order_index: 0,
            row: Tstamp::ZERO,
        }
    }
}
