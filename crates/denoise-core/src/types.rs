//! Common types for the denoise host
//!
//! Stream formats, render timestamps and the planar audio buffer that
//! crosses between the audio callbacks and the effect slot.

/// Default sample rate (48kHz - the rate the denoise model was trained at)
pub const SAMPLE_RATE: u32 = 48000;

/// Frames per analysis hop of the denoise model (10ms at 48kHz)
pub const DENOISE_FRAME_SIZE: usize = 480;

/// Maximum channel count a node may be configured with
pub const MAX_CHANNELS: usize = 8;

/// Upper bound for `maximum_frames_to_render`
/// Covers all common device configurations (64 … 4096) with headroom
pub const MAX_FRAMES: usize = 8192;

/// Default maximum frames per render call
pub const DEFAULT_MAX_FRAMES: usize = 1024;

/// Audio sample type
pub type Sample = f32;

/// Channel count and sample rate of a connection or bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

impl StreamFormat {
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(sample_rate: u32) -> Self {
        Self::new(1, sample_rate)
    }

    pub fn stereo(sample_rate: u32) -> Self {
        Self::new(2, sample_rate)
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::stereo(SAMPLE_RATE)
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ch @ {}Hz", self.channels, self.sample_rate)
    }
}

/// Position of a render call on the host's sample clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderTimestamp {
    /// Frames rendered on this stream before the current buffer
    pub sample_time: u64,
}

impl RenderTimestamp {
    pub fn new(sample_time: u64) -> Self {
        Self { sample_time }
    }

    /// Timestamp of the buffer that follows one of `frames` frames
    #[inline]
    pub fn advanced(self, frames: usize) -> Self {
        Self {
            sample_time: self.sample_time + frames as u64,
        }
    }
}

/// Planar multi-channel buffer with a fixed frame capacity
///
/// All storage is allocated up front. `set_frames` only moves the working
/// length, so resizing inside an audio callback never allocates.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    channels: Vec<Vec<Sample>>,
    frames: usize,
    capacity: usize,
}

impl AudioBuffer {
    /// Create a silent buffer with `channels` channels and room for `capacity` frames
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            channels: (0..channels).map(|_| vec![0.0; capacity]).collect(),
            frames: capacity,
            capacity,
        }
    }

    /// Build a buffer from channel slices (all must have the same length)
    pub fn from_channels(channels: &[&[Sample]]) -> Self {
        let frames = channels.first().map(|c| c.len()).unwrap_or(0);
        assert!(
            channels.iter().all(|c| c.len() == frames),
            "Channel lengths must match"
        );
        Self {
            channels: channels.iter().map(|c| c.to_vec()).collect(),
            frames,
            capacity: frames,
        }
    }

    /// Number of channels
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Current working length in frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Maximum frames this buffer can hold without reallocating
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set the working length (real-time safe, clamped to capacity)
    #[inline]
    pub fn set_frames(&mut self, frames: usize) {
        self.frames = frames.min(self.capacity);
    }

    /// Samples of one channel within the working length
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index][..self.frames]
    }

    /// Mutable samples of one channel within the working length
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        let frames = self.frames;
        &mut self.channels[index][..frames]
    }

    /// Zero the first `frames` frames of every channel
    pub fn silence(&mut self, frames: usize) {
        let frames = frames.min(self.capacity);
        for channel in &mut self.channels {
            channel[..frames].fill(0.0);
        }
    }

    /// Check whether the working region is all zeros
    pub fn is_silent(&self) -> bool {
        (0..self.channel_count()).all(|c| self.channel(c).iter().all(|&s| s == 0.0))
    }

    /// Copy `frames` frames channel-for-channel from `other`
    ///
    /// Channels missing from `other` are zeroed.
    pub fn copy_from(&mut self, other: &AudioBuffer, frames: usize) {
        let frames = frames.min(self.capacity).min(other.capacity);
        for (index, channel) in self.channels.iter_mut().enumerate() {
            match other.channels.get(index) {
                Some(source) => channel[..frames].copy_from_slice(&source[..frames]),
                None => channel[..frames].fill(0.0),
            }
        }
    }

    /// Mix `frames` frames of `source` into this buffer's channel layout
    ///
    /// A mono source is spread to every channel; otherwise channels map
    /// one-to-one and surplus destination channels are zeroed.
    pub fn spread_from(&mut self, source: &AudioBuffer, frames: usize) {
        if source.channel_count() == 1 {
            let frames = frames.min(self.capacity).min(source.capacity);
            let mono = &source.channels[0][..frames];
            for channel in &mut self.channels {
                channel[..frames].copy_from_slice(mono);
            }
        } else {
            self.copy_from(source, frames);
        }
    }

    /// Scale the first `frames` frames of every channel
    pub fn scale(&mut self, frames: usize, factor: Sample) {
        let frames = frames.min(self.capacity);
        for channel in &mut self.channels {
            for sample in &mut channel[..frames] {
                *sample *= factor;
            }
        }
    }

    /// Deinterleave `frames` frames from `[c0, c1, …, c0, c1, …]`
    ///
    /// Frames the source does not cover are zeroed.
    pub fn read_interleaved(&mut self, interleaved: &[Sample], source_channels: usize, frames: usize) {
        let frames = frames.min(self.capacity);
        if source_channels == 0 {
            self.silence(frames);
            return;
        }
        let available = (interleaved.len() / source_channels).min(frames);
        for (c, channel) in self.channels.iter_mut().enumerate() {
            if c < source_channels {
                for (i, sample) in channel[..available].iter_mut().enumerate() {
                    *sample = interleaved[i * source_channels + c];
                }
            } else {
                channel[..available].fill(0.0);
            }
            channel[available..frames].fill(0.0);
        }
    }

    /// Interleave the first `frames` frames into `output`
    ///
    /// Device channels beyond this buffer's channel count receive silence.
    pub fn write_interleaved(&self, output: &mut [Sample], output_channels: usize, frames: usize) {
        if output_channels == 0 {
            return;
        }
        let frames = frames.min(self.capacity).min(output.len() / output_channels);
        for (i, frame) in output.chunks_mut(output_channels).take(frames).enumerate() {
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = self.channels.get(c).map(|ch| ch[i]).unwrap_or(0.0);
            }
        }
    }

    /// Peak absolute value across the working region
    pub fn peak(&self) -> Sample {
        (0..self.channel_count())
            .flat_map(|c| self.channel(c).iter())
            .fold(0.0, |peak: Sample, s| peak.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_frames_clamps_to_capacity() {
        let mut buffer = AudioBuffer::new(2, 64);
        buffer.set_frames(32);
        assert_eq!(buffer.frames(), 32);
        assert_eq!(buffer.channel(0).len(), 32);

        buffer.set_frames(1000);
        assert_eq!(buffer.frames(), 64);
    }

    #[test]
    fn test_interleave_roundtrip_layout() {
        let mut buffer = AudioBuffer::new(2, 3);
        buffer.read_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3);
        assert_eq!(buffer.channel(0), &[1.0, 3.0, 5.0]);
        assert_eq!(buffer.channel(1), &[2.0, 4.0, 6.0]);

        let mut out = [0.0; 9];
        buffer.write_interleaved(&mut out, 3, 3);
        assert_eq!(out, [1.0, 2.0, 0.0, 3.0, 4.0, 0.0, 5.0, 6.0, 0.0]);
    }

    #[test]
    fn test_short_interleaved_input_is_zero_padded() {
        let mut buffer = AudioBuffer::new(1, 4);
        buffer.channel_mut(0).fill(9.0);
        buffer.read_interleaved(&[1.0, 2.0], 1, 4);
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_spread_mono_to_stereo() {
        let mono = AudioBuffer::from_channels(&[&[0.5, -0.5]]);
        let mut stereo = AudioBuffer::new(2, 2);
        stereo.spread_from(&mono, 2);
        assert_eq!(stereo.channel(0), &[0.5, -0.5]);
        assert_eq!(stereo.channel(1), &[0.5, -0.5]);
    }

    #[test]
    fn test_silence_and_peak() {
        let mut buffer = AudioBuffer::from_channels(&[&[0.25, -0.75], &[0.1, 0.0]]);
        assert_eq!(buffer.peak(), 0.75);
        assert!(!buffer.is_silent());
        buffer.silence(2);
        assert!(buffer.is_silent());
    }
}
