//! Capability contract for the interior denoising engine
//!
//! The node never looks inside the engine. It allocates it on the control
//! thread, hands it one buffer at a time on the render thread, and tears it
//! down again. Failures come back as values so the render path can silence
//! the buffer and keep going.

use crate::types::AudioBuffer;

use super::error::EffectResult;
use super::params::ParameterSnapshot;

/// Configuration passed to [`DenoiseEngine::allocate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest buffer `process` will ever be handed
    pub max_frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
}

const INTERNAL_TAG: u64 = 1 << 32;

/// Why an engine could not produce output for a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFault {
    /// `process` called before `allocate` (or after `deallocate`)
    NotAllocated,
    /// Input contained NaN or infinity
    NonFiniteInput,
    /// Engine produced NaN or infinity
    NonFiniteOutput,
    /// Buffer shape differs from what the engine was allocated for
    MalformedBuffer,
    /// Engine-specific failure code
    Internal(u32),
}

impl EngineFault {
    /// Compact code for storing the last fault in an atomic (0 = none)
    ///
    /// Internal codes sit above bit 32 so every `u32` payload survives.
    pub fn code(self) -> u64 {
        match self {
            EngineFault::NotAllocated => 1,
            EngineFault::NonFiniteInput => 2,
            EngineFault::NonFiniteOutput => 3,
            EngineFault::MalformedBuffer => 4,
            EngineFault::Internal(code) => INTERNAL_TAG | u64::from(code),
        }
    }

    /// Inverse of [`EngineFault::code`]
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(EngineFault::NotAllocated),
            2 => Some(EngineFault::NonFiniteInput),
            3 => Some(EngineFault::NonFiniteOutput),
            4 => Some(EngineFault::MalformedBuffer),
            c if c & INTERNAL_TAG != 0 => Some(EngineFault::Internal(c as u32)),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineFault::NotAllocated => write!(f, "engine not allocated"),
            EngineFault::NonFiniteInput => write!(f, "non-finite input samples"),
            EngineFault::NonFiniteOutput => write!(f, "non-finite output samples"),
            EngineFault::MalformedBuffer => write!(f, "malformed buffer"),
            EngineFault::Internal(code) => write!(f, "internal error {}", code),
        }
    }
}

/// Result of processing one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Ok,
    Failed(EngineFault),
}

/// Denoising DSP engine driven by a render bridge
///
/// `allocate`/`deallocate` run on the control thread. `process` runs on the
/// render thread and must not allocate, lock, or block.
pub trait DenoiseEngine: Send {
    /// Engine name for logs and error messages
    fn name(&self) -> &str;

    /// Prepare internal state for the given configuration
    fn allocate(&mut self, config: EngineConfig) -> EffectResult<()>;

    /// Process `frames` frames from `input` into `output`
    ///
    /// Both buffers carry the allocated channel count and at least `frames`
    /// frames of capacity.
    fn process(
        &mut self,
        input: &AudioBuffer,
        output: &mut AudioBuffer,
        frames: usize,
        params: &ParameterSnapshot,
    ) -> ProcessStatus;

    /// Release internal state (safe to call when never allocated)
    fn deallocate(&mut self);

    /// Processing latency in samples
    fn latency_samples(&self) -> u32 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_codes_roundtrip() {
        for fault in [
            EngineFault::NotAllocated,
            EngineFault::NonFiniteInput,
            EngineFault::NonFiniteOutput,
            EngineFault::MalformedBuffer,
            EngineFault::Internal(0),
            EngineFault::Internal(7),
            EngineFault::Internal(300),
            EngineFault::Internal(u32::MAX),
        ] {
            assert_eq!(EngineFault::from_code(fault.code()), Some(fault));
        }
        assert_eq!(EngineFault::from_code(0), None);
    }
}
