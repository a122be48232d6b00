//! Native Rust engines
//!
//! Engines implemented directly in Rust, shipped with the host so the
//! effect slot always has something to run.

mod gate;

pub use gate::VoiceGate;
