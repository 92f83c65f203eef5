use kunquat_core::{ErrorKind, KindedError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("no such track {0}")]
    NoSuchTrack(usize),
    #[error("no such system {1} in track {0}")]
    NoSuchSystem(usize, usize),
    #[error("order list for track {0} system {1} is empty")]
    EmptyOrderList(usize, usize),
    #[error("pattern {0:?} referenced by the order list does not exist")]
    DanglingPatternRef(usize),
}

impl KindedError for PlayerError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Argument
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;
