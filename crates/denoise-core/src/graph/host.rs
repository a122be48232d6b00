//! Host audio graph contract
//!
//! The graph has a fixed input (microphone) and a fixed mixer (sound card)
//! with one effect slot between them. Topology edits are staged on the
//! control side and take effect on the render side as one unit at
//! [`AudioGraph::commit`].

use std::fmt;

use crate::effect::EffectNode;
use crate::types::StreamFormat;

use super::error::GraphResult;

/// Identity of a node attached to a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Connection endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Upstream input node
    Input,
    /// Attached effect node
    Node(NodeId),
    /// Main mixer feeding the output device
    Mixer,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Input => write!(f, "input"),
            Endpoint::Node(id) => write!(f, "{}", id),
            Endpoint::Mixer => write!(f, "mixer"),
        }
    }
}

/// Directed audio connection carrying `format`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
    pub format: StreamFormat,
}

/// Host audio graph operations used by the graph manager
pub trait AudioGraph: Send {
    /// Output format of the input node
    fn input_format(&self) -> StreamFormat;

    /// Input format of the mixer
    fn output_format(&self) -> StreamFormat;

    /// Largest buffer the graph renders in one call
    fn max_frames(&self) -> usize;

    /// Take ownership of a node; it renders once connected and committed
    fn attach_node(&mut self, node: EffectNode) -> NodeId;

    /// Remove a node and any connection touching it
    fn detach_node(&mut self, id: NodeId) -> GraphResult<()>;

    /// Connect `from` into `to`, replacing any existing input of `to`
    fn connect(&mut self, from: Endpoint, to: Endpoint, format: StreamFormat) -> GraphResult<()>;

    /// Remove the connection feeding `to`, if any
    fn disconnect_input(&mut self, to: Endpoint);

    /// Staged connections
    fn connections(&self) -> Vec<Connection>;

    /// Staged attached nodes
    fn attached_nodes(&self) -> Vec<NodeId>;

    /// Publish staged changes to the render side as one unit
    fn commit(&mut self) -> GraphResult<()>;
}
