//! Cross-platform audio backend
//!
//! Captures from an input device, runs the live graph and plays the result
//! on an output device.
//!
//! - **Capture thread**: pushes interleaved samples into a lock-free ring
//! - **Output thread**: owns the [`GraphRenderer`](crate::graph::GraphRenderer)
//!   and renders in chunks of the graph's frame limit
//! - **Control thread**: keeps the [`LiveGraph`](crate::graph::LiveGraph) half
//!   and reads stream counters through relaxed atomics
//!
//! ```ignore
//! use denoise_core::audio::{start_audio_system, AudioConfig};
//!
//! let result = start_audio_system(&AudioConfig::default())?;
//! let graph = result.graph;        // hand to a GraphManager
//! let _handle = result.handle;     // keep alive while streaming
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
pub use cpal_backend::{
    start_audio_system, AudioHandle, AudioSystemResult, OutputCallbackState, StreamStats,
};
pub use device::{
    find_device_by_id, get_available_devices, get_cpal_default_device, get_devices,
    resolve_device, AudioDevice, Direction,
};
pub use error::{AudioError, AudioResult};
