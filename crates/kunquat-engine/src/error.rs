use kunquat_core::{ErrorKind, KindedError};
use kunquat_event::EventWireError;
use kunquat_graph::GraphError;
use kunquat_player::PlayerError;
use kunquat_voice::PoolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("event ring is full, drop the event or retry after draining a block")]
    EventRingFull,
    #[error(transparent)]
    Wire(#[from] EventWireError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl KindedError for EngineError {
    fn kind(&self) -> ErrorKind {
        match self {
            EngineError::EventRingFull => ErrorKind::Resource,
            EngineError::Wire(e) => e.kind(),
            EngineError::Graph(e) => e.kind(),
            EngineError::Player(e) => e.kind(),
            EngineError::Pool(_) => ErrorKind::Resource,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
