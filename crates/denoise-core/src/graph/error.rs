//! Error types for discovery, instantiation and graph wiring

use thiserror::Error;

use crate::effect::EffectError;

use super::host::NodeId;
use super::registry::ComponentDescriptor;

/// Errors that can occur while managing the effect slot
#[derive(Debug, Error)]
pub enum GraphError {
    /// No registered component matches the descriptor
    #[error("No component matches {descriptor}")]
    ComponentNotFound { descriptor: ComponentDescriptor },

    /// More than one registered component matches the descriptor
    #[error("{count} components match {descriptor} - packaging defect")]
    AmbiguousComponent {
        descriptor: ComponentDescriptor,
        count: usize,
    },

    /// Component could not be constructed
    #[error("Failed to instantiate '{component}': {reason}")]
    InstantiationFailed { component: String, reason: String },

    /// Node id not attached to the graph
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// The effect slot already holds another node
    #[error("Effect slot already occupied by {occupant}")]
    SlotOccupied { occupant: NodeId },

    /// Connection rejected by the graph
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// Render side has not drained earlier commits yet
    #[error("Graph command queue full - changes remain staged")]
    CommandQueueFull,

    /// Effect node configuration error
    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::AmbiguousComponent {
            descriptor: ComponentDescriptor::DENOISE,
            count: 2,
        };
        assert!(err.to_string().contains("aufx/rnnz/XIPH"));
        assert!(err.to_string().contains('2'));

        let err: GraphError = EffectError::FormatMismatch {
            input: 1,
            output: 2,
        }
        .into();
        assert!(matches!(err, GraphError::Effect(_)));
    }
}
