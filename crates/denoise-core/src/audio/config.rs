//! Audio backend configuration
//!
//! Device selection, sample rate and buffer size for the capture and
//! playback streams.

use serde::{Deserialize, Serialize};

use crate::types::{MAX_FRAMES, SAMPLE_RATE};

/// Default buffer size when no preference is specified (frames)
/// 480 frames = 10ms at 48kHz, one denoise model hop
pub const DEFAULT_BUFFER_SIZE: u32 = 480;

/// Smallest buffer size accepted from configuration (frames)
pub const MIN_BUFFER_SIZE: u32 = 64;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Use [`DEFAULT_BUFFER_SIZE`]
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames, clamped to supported bounds
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(MIN_BUFFER_SIZE, MAX_FRAMES as u32),
        }
    }

    /// Latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (ALSA, CoreAudio, …)
/// so devices from different hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier; `None` searches every host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture device (None = system default microphone)
    pub input_device: Option<DeviceId>,

    /// Playback device (None = system default output)
    pub output_device: Option<DeviceId>,

    /// Preferred sample rate
    pub sample_rate: u32,

    /// Preferred buffer size
    pub buffer_size: BufferSize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            sample_rate: SAMPLE_RATE,
            buffer_size: BufferSize::default(),
        }
    }
}

impl AudioConfig {
    pub fn with_input_device(mut self, device: DeviceId) -> Self {
        self.input_device = Some(device);
        self
    }

    pub fn with_output_device(mut self, device: DeviceId) -> Self {
        self.output_device = Some(device);
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: BufferSize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_bounds() {
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(8).frames(), MIN_BUFFER_SIZE);
        assert_eq!(BufferSize::Fixed(1 << 20).frames(), MAX_FRAMES as u32);
        assert!((BufferSize::Default.latency_ms(48000) - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: AudioConfig = serde_yaml::from_str("buffer_size: !Fixed 256\n").unwrap();
        assert_eq!(config.buffer_size, BufferSize::Fixed(256));
        assert_eq!(config.sample_rate, SAMPLE_RATE);
        assert!(config.input_device.is_none());
    }

    #[test]
    fn test_device_label() {
        assert_eq!(DeviceId::with_host("USB Mic", "ALSA").display_label(), "[ALSA] USB Mic");
        assert_eq!(DeviceId::new("Built-in").display_label(), "Built-in");
    }
}
