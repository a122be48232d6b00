//! Lock-free command queue from the graph's control half to its render half
//!
//! Every [`AudioGraph::commit`](super::host::AudioGraph::commit) becomes one
//! [`GraphCommand`]. The render half pops commands at the start of a buffer,
//! so a node swap is never observed half-applied.
//!
//! # Real-Time Safety
//!
//! - `rtrb` is wait-free and allocation-free after creation
//! - nodes travel wrapped in `basedrop::Owned`, so replacing the slot on the
//!   render thread only enqueues the old node for the collector thread

use basedrop::Owned;

use crate::effect::EffectNode;

use super::host::NodeId;

/// Which signal path the render half follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Nothing reaches the mixer
    Silence,
    /// Input goes straight to the mixer
    Passthrough,
    /// Input → effect slot → mixer
    Effect(NodeId),
}

impl Route {
    pub(crate) fn encode(self) -> u64 {
        match self {
            Route::Silence => 0,
            Route::Passthrough => 1,
            Route::Effect(id) => 2 + id.0,
        }
    }

    pub(crate) fn decode(code: u64) -> Self {
        match code {
            0 => Route::Silence,
            1 => Route::Passthrough,
            c => Route::Effect(NodeId(c - 2)),
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Silence => write!(f, "silence"),
            Route::Passthrough => write!(f, "passthrough"),
            Route::Effect(id) => write!(f, "effect {}", id),
        }
    }
}

/// Change to the render half's effect slot
pub enum SlotChange {
    /// Leave the installed node in place
    Keep,
    /// Install a node, retiring any previous one
    Replace(NodeId, Owned<EffectNode>),
    /// Retire the installed node
    Clear,
}

/// Commands sent from the control half to the render half
pub enum GraphCommand {
    /// Apply one committed batch of topology changes
    Apply { slot: SlotChange, route: Route },
}

/// Capacity of the graph command queue
///
/// Commits are user-driven (enable, disable, reinstantiate), so a small
/// queue is plenty; a full queue means the render side is not running.
pub const GRAPH_COMMAND_CAPACITY: usize = 16;

/// Create a new command channel (producer/consumer pair)
pub fn command_channel() -> (rtrb::Producer<GraphCommand>, rtrb::Consumer<GraphCommand>) {
    rtrb::RingBuffer::new(GRAPH_COMMAND_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_creation() {
        let (mut tx, mut rx) = command_channel();
        tx.push(GraphCommand::Apply {
            slot: SlotChange::Clear,
            route: Route::Passthrough,
        })
        .map_err(|_| "push failed")
        .unwrap();

        let GraphCommand::Apply { slot, route } = rx.pop().unwrap();
        assert!(matches!(slot, SlotChange::Clear));
        assert_eq!(route, Route::Passthrough);
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_route_codes() {
        for route in [Route::Silence, Route::Passthrough, Route::Effect(NodeId(7))] {
            assert_eq!(Route::decode(route.encode()), route);
        }
    }

    #[test]
    fn test_command_size() {
        // Node payload is a pointer; the queue entries stay small
        let size = std::mem::size_of::<GraphCommand>();
        assert!(size <= 40, "GraphCommand is {} bytes, expected <= 40", size);
    }
}
