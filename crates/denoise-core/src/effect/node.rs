//! Host-visible effect node and its resource lifecycle
//!
//! ```text
//! Unconfigured ──allocate──▶ ResourcesAllocated ──deallocate──▶ ResourcesDeallocated
//!                                   ▲                                    │
//!                                   └──────────────allocate──────────────┘
//! ```
//!
//! Bus formats and the frame limit can only change while no resources are
//! allocated. The render entry point only exists while they are.

use std::sync::Arc;

use crate::graph::registry::ComponentDescriptor;
use crate::types::{StreamFormat, DEFAULT_MAX_FRAMES, MAX_CHANNELS, MAX_FRAMES};

use super::bridge::{RenderBlock, RenderBridge, RenderStats};
use super::engine::{DenoiseEngine, EngineConfig};
use super::error::{EffectError, EffectResult};
use super::native::VoiceGate;
use super::params::ParameterStore;

/// Display name of the bundled denoiser
pub const DENOISE_EFFECT_NAME: &str = "Voice Denoise";

/// Lifecycle state of an [`EffectNode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unconfigured,
    ResourcesAllocated,
    /// Equivalent to `Unconfigured`; resources may be allocated again
    ResourcesDeallocated,
}

/// A loadable effect unit: bus formats, parameters and a render bridge
pub struct EffectNode {
    name: String,
    descriptor: ComponentDescriptor,
    input_format: StreamFormat,
    output_format: StreamFormat,
    max_frames: usize,
    state: NodeState,
    params: Arc<ParameterStore>,
    bridge: RenderBridge,
}

impl EffectNode {
    /// Create a node around an engine and its parameter store
    pub fn new(
        name: impl Into<String>,
        descriptor: ComponentDescriptor,
        engine: Box<dyn DenoiseEngine>,
        params: Arc<ParameterStore>,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor,
            input_format: StreamFormat::default(),
            output_format: StreamFormat::default(),
            max_frames: DEFAULT_MAX_FRAMES,
            state: NodeState::Unconfigured,
            bridge: RenderBridge::new(engine, params.clone()),
            params,
        }
    }

    /// The bundled denoiser: a [`VoiceGate`] with the denoise parameter set
    pub fn denoiser() -> EffectResult<Self> {
        let params = Arc::new(ParameterStore::denoise()?);
        Ok(Self::new(
            DENOISE_EFFECT_NAME,
            ComponentDescriptor::DENOISE,
            Box::new(VoiceGate::new()),
            params,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> ComponentDescriptor {
        self.descriptor
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_allocated(&self) -> bool {
        self.state == NodeState::ResourcesAllocated
    }

    pub fn input_format(&self) -> StreamFormat {
        self.input_format
    }

    pub fn output_format(&self) -> StreamFormat {
        self.output_format
    }

    pub fn maximum_frames(&self) -> usize {
        self.max_frames
    }

    /// Shared parameter store (control-side handle)
    pub fn parameters(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    /// Render counters published by this node's bridge
    pub fn stats(&self) -> &Arc<RenderStats> {
        self.bridge.stats()
    }

    pub fn engine_name(&self) -> &str {
        self.bridge.engine_name()
    }

    pub fn latency_samples(&self) -> u32 {
        self.bridge.latency_samples()
    }

    /// Samples of output after input stops (none for a gate)
    pub fn tail_samples(&self) -> u32 {
        0
    }

    pub fn can_process_in_place(&self) -> bool {
        true
    }

    /// Set the input bus format
    pub fn set_input_format(&mut self, format: StreamFormat) -> EffectResult<()> {
        if self.is_allocated() {
            return Err(EffectError::ResourcesLocked {
                what: "input format",
            });
        }
        self.input_format = format;
        Ok(())
    }

    /// Set the output bus format
    pub fn set_output_format(&mut self, format: StreamFormat) -> EffectResult<()> {
        if self.is_allocated() {
            return Err(EffectError::ResourcesLocked {
                what: "output format",
            });
        }
        self.output_format = format;
        Ok(())
    }

    /// Set the largest buffer the host will render
    ///
    /// Ignored (returns `false`) while allocated or outside `1..=MAX_FRAMES`.
    pub fn set_maximum_frames(&mut self, frames: usize) -> bool {
        if self.is_allocated() || frames == 0 || frames > MAX_FRAMES {
            log::debug!(
                "{}: ignoring maximum frames {} (state {:?})",
                self.name,
                frames,
                self.state
            );
            return false;
        }
        self.max_frames = frames;
        true
    }

    /// Allocate engine and render resources
    ///
    /// No-op when already allocated. On error the node stays unallocated.
    pub fn allocate_resources(&mut self) -> EffectResult<()> {
        if self.is_allocated() {
            return Ok(());
        }

        let input = self.input_format.channels;
        let output = self.output_format.channels;
        if input != output {
            return Err(EffectError::FormatMismatch { input, output });
        }
        if input == 0 || input > MAX_CHANNELS {
            return Err(EffectError::ResourceAllocationFailed {
                effect: self.name.clone(),
                reason: format!("unsupported channel count {} (1..={})", input, MAX_CHANNELS),
            });
        }

        self.bridge.allocate(EngineConfig {
            max_frames: self.max_frames,
            channels: input,
            sample_rate: self.input_format.sample_rate,
        })?;
        self.state = NodeState::ResourcesAllocated;

        log::info!(
            "{}: resources allocated ({}, max {} frames)",
            self.name,
            self.input_format,
            self.max_frames
        );
        Ok(())
    }

    /// Release engine and render resources (safe when never allocated)
    pub fn deallocate_resources(&mut self) {
        if self.is_allocated() {
            self.bridge.deallocate();
            self.state = NodeState::ResourcesDeallocated;
            log::debug!("{}: resources deallocated", self.name);
        }
    }

    /// Render entry point, available only while allocated
    pub fn render_block(&mut self) -> Option<RenderBlock<'_>> {
        if self.is_allocated() {
            Some(RenderBlock::new(&mut self.bridge))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for EffectNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectNode")
            .field("name", &self.name)
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("input_format", &self.input_format)
            .field("output_format", &self.output_format)
            .field("max_frames", &self.max_frames)
            .finish()
    }
}
