//! Error types for effect nodes and their parameters

use thiserror::Error;

use super::engine::EngineFault;
use super::params::ParamAddress;

/// Errors that can occur while configuring or driving an effect node
#[derive(Debug, Error)]
pub enum EffectError {
    /// Input and output buses disagree on channel count
    #[error("Format mismatch: input has {input} channels, output has {output}")]
    FormatMismatch { input: usize, output: usize },

    /// Unknown parameter address or identifier
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The engine or the node's buffers could not be set up
    #[error("Failed to allocate resources for '{effect}': {reason}")]
    ResourceAllocationFailed { effect: String, reason: String },

    /// The engine reported a failure while rendering a buffer
    ///
    /// Never returned from the render path; used when the control side
    /// reports counted faults.
    #[error("Engine '{engine}' failed to process a buffer: {fault}")]
    EngineProcessingFailed { engine: String, fault: EngineFault },

    /// Attempt to change configuration that is fixed while resources are allocated
    #[error("Cannot change {what} while resources are allocated")]
    ResourcesLocked { what: &'static str },

    /// Parameter table larger than a snapshot can carry
    #[error("Too many parameters: {count} (max {max})")]
    TooManyParameters { count: usize, max: usize },
}

impl EffectError {
    pub(crate) fn unknown_address(address: ParamAddress) -> Self {
        Self::InvalidParameter(format!("no parameter at address {}", address))
    }
}

/// Result type for effect operations
pub type EffectResult<T> = Result<T, EffectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EffectError::FormatMismatch {
            input: 1,
            output: 2,
        };
        assert!(err.to_string().contains("1 channels"));
        assert!(err.to_string().contains("2"));

        let err = EffectError::unknown_address(7);
        assert!(err.to_string().contains("address 7"));

        let err = EffectError::EngineProcessingFailed {
            engine: "VoiceGate".to_string(),
            fault: EngineFault::NonFiniteInput,
        };
        assert!(err.to_string().contains("VoiceGate"));
    }
}
