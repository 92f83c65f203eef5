//! The acyclic device graph: typed nodes (audio units and processors),
//! numbered ports, load-time validation, and the block renderer.

mod error;
mod graph;
mod node;

pub use error::{GraphError, GraphResult};
pub use graph::{Connection, DeviceGraph, MAX_NODES};
pub use node::{
    MixedProcessor, Node, NodeBody, NodeId, PortDirection, PortIndex, PortManifest, SignalType,
    VoiceProcessor,
};
