use kunquat_core::{ErrorKind, KindedError};
use thiserror::Error;

use crate::node::{NodeId, PortDirection, PortIndex};

#[derive(Debug, Error, Clone)]
pub enum GraphError {
    #[error("node {0:?} does not exist")]
    NoSuchNode(NodeId),
    #[error("node {node:?} has no {direction:?} port {port}")]
    NoSuchPort {
        node: NodeId,
        direction: PortDirection,
        port: PortIndex,
    },
    #[error("connection would create a cycle at node {0:?}")]
    CycleDetected(NodeId),
    #[error("graph holds at most {0} nodes")]
    TooManyNodes(usize),
}

impl KindedError for GraphError {
    fn kind(&self) -> ErrorKind {
        match self {
            GraphError::TooManyNodes(_) => ErrorKind::Resource,
            _ => ErrorKind::Argument,
        }
    }
}

pub type GraphResult<T> = Result<T, GraphError>;
