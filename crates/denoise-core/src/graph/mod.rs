//! Effect hosting - component registry, live audio graph and slot manager
//!
//! - [`registry`]: descriptors, discovery and asynchronous instantiation
//! - [`host`]: the audio graph contract
//! - [`live`]: lock-free graph implementation split into control/render halves
//! - [`manager`]: attach/detach lifecycle with generation-based staleness

pub mod command;
pub mod error;
pub mod gc;
pub mod host;
pub mod live;
pub mod manager;
pub mod registry;

pub use command::{Route, GRAPH_COMMAND_CAPACITY};
pub use error::{GraphError, GraphResult};
pub use gc::gc_handle;
pub use host::{AudioGraph, Connection, Endpoint, NodeId};
pub use live::{GraphAtomics, GraphRenderer, GraphStatus, LiveGraph};
pub use manager::{
    ActiveEffect, AttachOutcome, CompletedInstantiation, GraphEvent, GraphManager,
    PendingInstantiation,
};
pub use registry::{
    BundledRegistry, ComponentDescriptor, ComponentFactory, ComponentHandle, ComponentRegistry,
    FourCC, Instantiation, InstantiationOptions,
};
