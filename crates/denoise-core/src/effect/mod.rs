//! Effect system - parameters, engine contract, render bridge and nodes
//!
//! Layering, leaf first:
//! - [`params`]: canonical parameter values shared with the control surface
//! - [`engine`]: capability trait for the DSP engine
//! - [`bridge`]: per-buffer render path
//! - [`node`]: lifecycle state machine the graph attaches

pub mod bridge;
pub mod engine;
pub mod error;
pub mod native;
pub mod node;
pub mod params;

pub use bridge::{RenderBlock, RenderBridge, RenderStats, RenderStatus};
pub use engine::{DenoiseEngine, EngineConfig, EngineFault, ProcessStatus};
pub use error::{EffectError, EffectResult};
pub use native::VoiceGate;
pub use node::{EffectNode, NodeState, DENOISE_EFFECT_NAME};
pub use params::{
    denoise_parameters, ParamAddress, ParamInfo, ParamUnit, ParameterSnapshot, ParameterStore,
    ParameterSurface, Preset, GATE_ATTACK, MAX_PARAMETERS, SPEECH_THRESHOLD,
};
