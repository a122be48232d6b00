//! Denoise Core - real-time parameter bridge and effect-node lifecycle
//!
//! Hosts a noise-suppression effect inside a live audio graph. The control
//! side tunes parameters and swaps effect nodes while the render callback
//! keeps streaming without locks or allocations.

pub mod audio;
pub mod config;
pub mod effect;
pub mod graph;
pub mod types;

pub use types::*;
